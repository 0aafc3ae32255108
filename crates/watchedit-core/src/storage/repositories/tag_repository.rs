use rusqlite::{params, Connection, OptionalExtension};
use std::sync::MutexGuard;

use crate::error::Result;
use crate::models::Tag;

use super::Repository;

pub trait TagRepository: Repository<Entity = Tag, Id = u32> {
    fn list(&self) -> Result<Vec<Tag>>;
    fn find_by_name(&self, name: &str) -> Result<Option<Tag>>;
    /// Next free id: one past the current maximum, starting at 1.
    fn next_id(&self) -> Result<u32>;
}

pub struct SqliteTagRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteTagRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
        })
    }
}

pub(crate) fn write_tag(conn: &Connection, tag: &Tag) -> Result<()> {
    conn.execute(
        "INSERT INTO tags (id, name, color) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, color = excluded.color",
        params![tag.id, tag.name, tag.color],
    )?;
    Ok(())
}

impl<'a> Repository for SqliteTagRepository<'a> {
    type Entity = Tag;
    type Id = u32;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, name, color FROM tags WHERE id = ?1",
                params![id],
                Self::row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    fn save(&self, tag: &Self::Entity) -> Result<()> {
        write_tag(&self.conn, tag)
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM tags WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

impl<'a> TagRepository for SqliteTagRepository<'a> {
    fn list(&self) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare("SELECT id, name, color FROM tags ORDER BY id")?;
        let tags = stmt
            .query_map([], Self::row_to_tag)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, name, color FROM tags WHERE name = ?1 ORDER BY id LIMIT 1",
                params![name],
                Self::row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    fn next_id(&self) -> Result<u32> {
        let max: Option<u32> = self
            .conn
            .query_row("SELECT MAX(id) FROM tags", [], |row| row.get(0))?;
        Ok(max.map_or(1, |m| m + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::{run_migrations, ConnectionPool};

    fn pool() -> ConnectionPool {
        let pool = ConnectionPool::open_in_memory().unwrap();
        run_migrations(&pool.get_connection()).unwrap();
        pool
    }

    #[test]
    fn test_next_id_is_max_plus_one() {
        let pool = pool();
        let repo = SqliteTagRepository::new(pool.get_connection());
        assert_eq!(repo.next_id().unwrap(), 1);

        repo.save(&Tag::new(5, "mecha")).unwrap();
        repo.save(&Tag::new(2, "drama")).unwrap();
        assert_eq!(repo.next_id().unwrap(), 6);
    }

    #[test]
    fn test_list_is_ordered_by_id() {
        let pool = pool();
        let repo = SqliteTagRepository::new(pool.get_connection());
        repo.save(&Tag::new(3, "c")).unwrap();
        repo.save(&Tag::new(1, "a").with_color("#000000")).unwrap();

        let tags = repo.list().unwrap();
        assert_eq!(tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(tags[0].color, "#000000");
    }

    #[test]
    fn test_find_by_name_and_delete() {
        let pool = pool();
        let repo = SqliteTagRepository::new(pool.get_connection());
        repo.save(&Tag::new(1, "romance")).unwrap();

        assert_eq!(repo.find_by_name("romance").unwrap().map(|t| t.id), Some(1));
        assert!(repo.find_by_name("Romance").unwrap().is_none());

        assert!(repo.delete(&1).unwrap());
        assert!(repo.find_by_id(&1).unwrap().is_none());
    }
}
