use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 1;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

/// Works keep their episodes and embedded tags as JSON columns. Tag names
/// are not UNIQUE at the table level so a sync union by id can't abort on a
/// name clash; uniqueness of user-created names is checked on create/rename.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS works (
            id                 TEXT PRIMARY KEY,
            title              TEXT NOT NULL,
            work_type          TEXT NOT NULL,
            status             TEXT NOT NULL,
            year               INTEGER,
            rating             INTEGER,
            review             TEXT,
            note               TEXT,
            source             TEXT,
            reminder_enabled   INTEGER NOT NULL DEFAULT 0,
            reminder_frequency TEXT,
            episodes           TEXT NOT NULL DEFAULT '[]',
            tags               TEXT NOT NULL DEFAULT '[]',
            date_added         TEXT NOT NULL,
            date_updated       TEXT
        );

        CREATE TABLE IF NOT EXISTS tags (
            id    INTEGER PRIMARY KEY,
            name  TEXT NOT NULL,
            color TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS app_state (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_works_type   ON works(work_type);
        CREATE INDEX IF NOT EXISTS idx_works_status ON works(status);
        CREATE INDEX IF NOT EXISTS idx_works_year   ON works(year);
        CREATE INDEX IF NOT EXISTS idx_tags_name    ON tags(name);
        ",
    )?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    create_tables(conn)?;
    create_indexes(conn)?;
    Ok(())
}
