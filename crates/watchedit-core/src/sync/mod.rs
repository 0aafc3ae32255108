//! Cloud sync reconciliation. Everything here is pure; the HTTP transport
//! lives in `watchedit-cloud`.

mod merge;

pub use merge::{merge_records, merge_tags, merge_works, MergeReport};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Suggested minimum gap between automatic syncs, in minutes.
pub const SYNC_SUGGEST_AFTER_MINUTES: i64 = 60;

/// `device_<unix millis>_<9 random alphanumeric chars>`.
pub fn generate_device_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("device_{millis}_{suffix}")
}

/// Advisory only: true when there has never been a sync or the last one is
/// more than an hour old.
pub fn should_sync(last_sync: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_sync {
        None => true,
        Some(last) => now - last > Duration::minutes(SYNC_SUGGEST_AFTER_MINUTES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_shape() {
        let id = generate_device_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "device");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_device_id(), id);
    }

    #[test]
    fn test_should_sync() {
        let now = Utc::now();
        assert!(should_sync(None, now));
        assert!(!should_sync(Some(now - Duration::minutes(30)), now));
        assert!(!should_sync(Some(now - Duration::hours(1)), now));
        assert!(should_sync(Some(now - Duration::minutes(61)), now));
    }
}
