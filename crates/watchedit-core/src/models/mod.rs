pub mod episode;
pub mod record_set;
pub mod stats;
pub mod tag;
pub mod timestamp;
pub mod work;

pub use episode::*;
pub use record_set::*;
pub use stats::*;
pub use tag::*;
pub use timestamp::{format_timestamp, parse_timestamp};
pub use work::*;
