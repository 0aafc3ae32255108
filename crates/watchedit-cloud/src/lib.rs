pub mod anilist;
pub mod error;
pub mod http;
pub mod sync;

pub use anilist::{AniListClient, AnimeCandidate};
pub use error::{CloudError, Result};
pub use http::{CloudClient, RemoteRecords, UploadPayload};
pub use sync::{CloudSync, SyncOutcome, SyncStatus};

pub(crate) const USER_AGENT: &str = concat!("watchedit/", env!("CARGO_PKG_VERSION"));
