pub mod backup;
pub mod config;
pub mod error;
pub mod models;
pub mod reminder;
pub mod search;
pub mod storage;
pub mod sync;

pub use config::AppConfig;
pub use error::{ExitCode, Result, WatchedItError};
pub use models::*;

pub use backup::{BackupDocument, BackupFormat, BackupMetadata, BACKUP_VERSION};
pub use search::{FuzzySearcher, WorkMatch};
pub use storage::database::{open_database, open_in_memory, ConnectionPool, Database};
pub use storage::repositories::{
    AppStateRepository, Repository, SqliteAppStateRepository, SqliteTagRepository,
    ProgressFilter, SqliteWorkRepository, TagRepository, WorkFilter, WorkPage, WorkRepository,
};
pub use storage::queries::LibraryStatsQuery;
pub use sync::{merge_records, MergeReport};
