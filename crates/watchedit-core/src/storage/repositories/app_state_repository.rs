use rusqlite::{params, Connection, OptionalExtension};
use std::sync::MutexGuard;

use crate::error::Result;
use crate::models::format_timestamp;

use super::Repository;

/// One key/value pair of local application state (device id, last sync time, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub key: String,
    pub value: String,
}

impl StateEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

pub trait AppStateRepository: Repository<Entity = StateEntry, Id = String> {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

pub struct SqliteAppStateRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteAppStateRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }
}

impl<'a> Repository for SqliteAppStateRepository<'a> {
    type Entity = StateEntry;
    type Id = String;

    fn find_by_id(&self, key: &Self::Id) -> Result<Option<Self::Entity>> {
        Ok(self.get(key)?.map(|value| StateEntry::new(key.clone(), value)))
    }

    fn save(&self, entry: &Self::Entity) -> Result<()> {
        self.conn.execute(
            "INSERT INTO app_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![entry.key, entry.value, format_timestamp(&chrono::Utc::now())],
        )?;
        Ok(())
    }

    fn delete(&self, key: &Self::Id) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM app_state WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}

impl<'a> AppStateRepository for SqliteAppStateRepository<'a> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.save(&StateEntry::new(key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::{run_migrations, ConnectionPool};

    #[test]
    fn test_set_overwrites() {
        let pool = ConnectionPool::open_in_memory().unwrap();
        run_migrations(&pool.get_connection()).unwrap();
        let repo = SqliteAppStateRepository::new(pool.get_connection());

        assert!(repo.get("device_id").unwrap().is_none());
        repo.set("device_id", "a").unwrap();
        repo.set("device_id", "b").unwrap();
        assert_eq!(repo.get("device_id").unwrap().as_deref(), Some("b"));

        assert!(repo.delete(&"device_id".to_string()).unwrap());
        assert!(repo.find_by_id(&"device_id".to_string()).unwrap().is_none());
    }
}
