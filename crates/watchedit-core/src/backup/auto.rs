use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::{create_backup, decode_json, encode_json, restore};
use crate::error::{Result, WatchedItError};
use crate::storage::database::Database;

pub const AUTO_BACKUP_PREFIX: &str = "watchedit-auto-backup-";
const AUTO_BACKUP_SUFFIX: &str = ".json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoBackupEntry {
    pub date: NaiveDate,
    pub size: u64,
    pub path: PathBuf,
}

/// Dated daily JSON snapshots in one directory, pruned to the newest `keep`.
pub struct AutoBackupStore {
    dir: PathBuf,
    keep: usize,
}

impl AutoBackupStore {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep: keep.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{AUTO_BACKUP_PREFIX}{}{AUTO_BACKUP_SUFFIX}",
            date.format("%Y-%m-%d")
        ))
    }

    /// True when no backup was taken yet or the last is `interval_days` old.
    pub fn is_due(last_backup: Option<DateTime<Utc>>, interval_days: u32, now: DateTime<Utc>) -> bool {
        match last_backup {
            None => true,
            Some(last) => (now - last).num_days() >= i64::from(interval_days),
        }
    }

    /// Snapshot the store for `now`'s date (overwriting a same-day snapshot),
    /// record the backup time and prune old snapshots.
    pub fn run(&self, db: &Database, now: DateTime<Utc>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let doc = create_backup(db)?;
        let path = self.path_for(now.date_naive());
        std::fs::write(&path, encode_json(&doc)?)?;
        db.set_last_backup(now)?;

        let removed = self.prune()?;
        tracing::info!(path = %path.display(), removed, "wrote automatic backup");
        Ok(path)
    }

    /// Newest first.
    pub fn list(&self) -> Result<Vec<AutoBackupEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(date) = name.to_str().and_then(parse_file_date) else {
                continue;
            };
            entries.push(AutoBackupEntry {
                date,
                size: entry.metadata()?.len(),
                path: entry.path(),
            });
        }
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(entries)
    }

    pub fn prune(&self) -> Result<usize> {
        let stale: Vec<AutoBackupEntry> = self.list()?.into_iter().skip(self.keep).collect();
        for entry in &stale {
            std::fs::remove_file(&entry.path)?;
        }
        Ok(stale.len())
    }

    pub fn restore(&self, db: &Database, date: NaiveDate) -> Result<()> {
        let path = self.path_for(date);
        if !path.exists() {
            return Err(WatchedItError::BackupNotFound(date.to_string()));
        }
        let doc = decode_json(&std::fs::read_to_string(&path)?)?;
        restore(db, &doc)
    }
}

fn parse_file_date(name: &str) -> Option<NaiveDate> {
    let date = name
        .strip_prefix(AUTO_BACKUP_PREFIX)?
        .strip_suffix(AUTO_BACKUP_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewWork, WorkType};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_run_list_and_prune() {
        let dir = TempDir::new().unwrap();
        let store = AutoBackupStore::new(dir.path(), 3);
        let db = Database::open_in_memory().unwrap();

        for d in 1..=5 {
            store.run(&db, day(d)).unwrap();
        }
        std::fs::write(dir.path().join("unrelated.json"), "{}").unwrap();

        let dates: Vec<u32> = store
            .list()
            .unwrap()
            .iter()
            .map(|e| chrono::Datelike::day(&e.date))
            .collect();
        assert_eq!(dates, vec![5, 4, 3]);
        assert_eq!(db.last_backup().unwrap(), Some(day(5)));
        assert!(dir.path().join("unrelated.json").exists());
    }

    #[test]
    fn test_restore_by_date() {
        let dir = TempDir::new().unwrap();
        let store = AutoBackupStore::new(dir.path(), 7);
        let db = Database::open_in_memory().unwrap();
        db.create_work(NewWork::new("Monster", WorkType::Anime)).unwrap();
        store.run(&db, day(10)).unwrap();

        db.create_work(NewWork::new("Later", WorkType::Anime)).unwrap();
        assert_eq!(db.count_works().unwrap(), 2);

        store.restore(&db, day(10).date_naive()).unwrap();
        let works = db.all_works().unwrap();
        assert_eq!(works.len(), 1);
        assert_eq!(works[0].title, "Monster");

        let missing = store.restore(&db, day(11).date_naive()).unwrap_err();
        assert!(missing.is_not_found());
    }

    #[test]
    fn test_is_due() {
        let now = day(10);
        assert!(AutoBackupStore::is_due(None, 7, now));
        assert!(!AutoBackupStore::is_due(Some(now - Duration::days(6)), 7, now));
        assert!(AutoBackupStore::is_due(Some(now - Duration::days(7)), 7, now));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let store = AutoBackupStore::new("/nonexistent/watchedit/backups", 7);
        assert!(store.list().unwrap().is_empty());
    }
}
