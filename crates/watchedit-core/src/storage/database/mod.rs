mod connection;
mod migrations;
mod schema;

pub use connection::ConnectionPool;
pub use migrations::{get_applied_versions, run_migrations, Migration};
pub use schema::{init_schema, SCHEMA_VERSION};

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::{Result, WatchedItError};
use crate::models::{
    format_timestamp, parse_timestamp, Episode, LibraryStats, NewWork, RecordSet, Tag, Work,
    WorkPatch, DEFAULT_TAG_COLOR,
};

use super::queries::LibraryStatsQuery;
use super::repositories::{
    write_tag, write_work, AppStateRepository, Repository, SqliteAppStateRepository,
    SqliteTagRepository, SqliteWorkRepository, TagRepository, WorkFilter, WorkPage, WorkRepository,
};

pub const KEY_DEVICE_ID: &str = "device_id";
pub const KEY_LAST_SYNC: &str = "last_sync";
pub const KEY_LAST_BACKUP: &str = "last_backup";

fn reminder_key(work_id: &str) -> String {
    format!("reminder:{work_id}")
}

/// Ids in first-seen order without repeats.
fn unique_ids(ids: &[String]) -> Vec<&str> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect()
}

pub fn open_database(path: &Path) -> Result<ConnectionPool> {
    let pool = ConnectionPool::open(path)?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

pub fn open_in_memory() -> Result<ConnectionPool> {
    let pool = ConnectionPool::open_in_memory()?;
    {
        let conn = pool.get_connection();
        migrations::run_migrations(&conn)?;
    }
    Ok(pool)
}

/// The record store: works (with their episodes), tags and local app state.
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let pool = open_database(path)?;
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        let pool = open_in_memory()?;
        Ok(Self { pool })
    }

    pub fn path(&self) -> Option<&str> {
        self.pool.path()
    }

    pub fn applied_migrations(&self) -> Result<Vec<u32>> {
        get_applied_versions(&self.pool.get_connection())
    }

    fn works(&self) -> SqliteWorkRepository<'_> {
        SqliteWorkRepository::new(self.pool.get_connection())
    }

    fn tags(&self) -> SqliteTagRepository<'_> {
        SqliteTagRepository::new(self.pool.get_connection())
    }

    fn state(&self) -> SqliteAppStateRepository<'_> {
        SqliteAppStateRepository::new(self.pool.get_connection())
    }

    // ─── Works ──────────────────────────────────────────────

    pub fn create_work(&self, input: NewWork) -> Result<Work> {
        let tags = self.resolve_tags(&input.tag_ids)?;
        let mut work = Work::new(input.title.trim(), input.work_type);
        work.status = input.status;
        work.year = input.year;
        work.rating = input.rating;
        work.review = input.review;
        work.note = input.note;
        work.source = input.source;
        work.reminder_enabled = input.reminder_enabled;
        work.reminder_frequency = input.reminder_frequency;
        work.episodes = input.episodes;
        work.tags = tags;
        work.validate()?;

        self.works().save(&work)?;
        tracing::debug!(id = %work.id, title = %work.title, "created work");
        Ok(work)
    }

    pub fn get_work(&self, id: &str) -> Result<Work> {
        self.works()
            .find_by_id(&id.to_string())?
            .ok_or_else(|| WatchedItError::WorkNotFound(id.to_string()))
    }

    pub fn update_work(&self, id: &str, patch: &WorkPatch) -> Result<Work> {
        let mut work = self.get_work(id)?;
        patch.apply_fields(&mut work);
        if let Some(tag_ids) = &patch.tag_ids {
            work.tags = self.resolve_tags(tag_ids)?;
        }
        self.write_modified(work)
    }

    pub fn delete_work(&self, id: &str) -> Result<()> {
        if !self.works().delete(&id.to_string())? {
            return Err(WatchedItError::WorkNotFound(id.to_string()));
        }
        self.state().delete(&reminder_key(id))?;
        Ok(())
    }

    /// Apply one patch to several works. Every id must exist and every
    /// patched work must validate before any is written; the writes share
    /// one transaction.
    pub fn update_works(&self, ids: &[String], patch: &WorkPatch) -> Result<Vec<Work>> {
        let tags = patch
            .tag_ids
            .as_deref()
            .map(|tag_ids| self.resolve_tags(tag_ids))
            .transpose()?;

        let mut updated = Vec::new();
        for id in unique_ids(ids) {
            let mut work = self.get_work(id)?;
            patch.apply_fields(&mut work);
            if let Some(tags) = &tags {
                work.tags = tags.clone();
            }
            work.validate()?;
            work.touch();
            updated.push(work);
        }

        let conn = self.pool.get_connection();
        let tx = conn.unchecked_transaction()?;
        for work in &updated {
            write_work(&tx, work)?;
        }
        tx.commit()?;

        tracing::info!(count = updated.len(), "updated works");
        Ok(updated)
    }

    /// Delete several works at once. Fails without deleting anything if an
    /// id is unknown. Returns the number of works removed.
    pub fn delete_works(&self, ids: &[String]) -> Result<usize> {
        let ids = unique_ids(ids);
        for id in &ids {
            if self.works().find_by_id(&id.to_string())?.is_none() {
                return Err(WatchedItError::WorkNotFound(id.to_string()));
            }
        }

        let conn = self.pool.get_connection();
        let tx = conn.unchecked_transaction()?;
        for id in &ids {
            tx.execute("DELETE FROM works WHERE id = ?1", [id])?;
            tx.execute("DELETE FROM app_state WHERE key = ?1", [reminder_key(id)])?;
        }
        tx.commit()?;

        tracing::info!(count = ids.len(), "deleted works");
        Ok(ids.len())
    }

    pub fn list_works(&self, filter: &WorkFilter) -> Result<WorkPage> {
        self.works().list(filter)
    }

    pub fn all_works(&self) -> Result<Vec<Work>> {
        self.works().all()
    }

    pub fn count_works(&self) -> Result<usize> {
        self.works().count()
    }

    /// Validate, refresh `date_updated` and persist.
    fn write_modified(&self, mut work: Work) -> Result<Work> {
        work.validate()?;
        work.touch();
        self.works().save(&work)?;
        Ok(work)
    }

    fn resolve_tags(&self, tag_ids: &[u32]) -> Result<Vec<Tag>> {
        let repo = self.tags();
        let mut tags: Vec<Tag> = Vec::with_capacity(tag_ids.len());
        for id in tag_ids {
            if tags.iter().any(|t| t.id == *id) {
                continue;
            }
            let tag = repo
                .find_by_id(id)?
                .ok_or_else(|| WatchedItError::TagNotFound(id.to_string()))?;
            tags.push(tag);
        }
        Ok(tags)
    }

    // ─── Episodes ───────────────────────────────────────────

    pub fn add_episode(&self, work_id: &str, episode: Episode) -> Result<Work> {
        let mut work = self.get_work(work_id)?;
        work.episodes.push(episode);
        self.write_modified(work)
    }

    pub fn set_episode_watched(&self, work_id: &str, episode_id: &str, watched: bool) -> Result<Work> {
        let mut work = self.get_work(work_id)?;
        work.episode_mut(episode_id)?.set_watched(watched);
        self.write_modified(work)
    }

    pub fn remove_episode(&self, work_id: &str, episode_id: &str) -> Result<Work> {
        let mut work = self.get_work(work_id)?;
        let before = work.episodes.len();
        work.episodes.retain(|ep| ep.id != episode_id);
        if work.episodes.len() == before {
            return Err(WatchedItError::EpisodeNotFound {
                work: work_id.to_string(),
                episode: episode_id.to_string(),
            });
        }
        self.write_modified(work)
    }

    // ─── Tags ───────────────────────────────────────────────

    pub fn create_tag(&self, name: &str, color: Option<&str>) -> Result<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WatchedItError::validation("tag name must not be empty"));
        }
        let repo = self.tags();
        if repo.find_by_name(name)?.is_some() {
            return Err(WatchedItError::DuplicateTag(name.to_string()));
        }
        let tag = Tag::new(repo.next_id()?, name).with_color(color.unwrap_or(DEFAULT_TAG_COLOR));
        repo.save(&tag)?;
        Ok(tag)
    }

    pub fn get_tag(&self, id: u32) -> Result<Tag> {
        self.tags()
            .find_by_id(&id)?
            .ok_or_else(|| WatchedItError::TagNotFound(id.to_string()))
    }

    /// Rename and/or recolour a tag, then refresh the copies embedded in works.
    pub fn update_tag(&self, id: u32, name: Option<&str>, color: Option<&str>) -> Result<Tag> {
        let mut tag = self.get_tag(id)?;
        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(WatchedItError::validation("tag name must not be empty"));
            }
            if let Some(existing) = self.tags().find_by_name(name)?
                && existing.id != id
            {
                return Err(WatchedItError::DuplicateTag(name.to_string()));
            }
            tag.name = name.to_string();
        }
        if let Some(color) = color {
            tag.color = color.to_string();
        }

        self.tags().save(&tag)?;
        let refreshed = self.works().refresh_tag_references(&tag)?;
        tracing::debug!(tag = id, works = refreshed, "updated tag");
        Ok(tag)
    }

    pub fn delete_tag(&self, id: u32) -> Result<()> {
        if !self.tags().delete(&id)? {
            return Err(WatchedItError::TagNotFound(id.to_string()));
        }
        let stripped = self.works().remove_tag_references(id)?;
        tracing::debug!(tag = id, works = stripped, "deleted tag");
        Ok(())
    }

    pub fn all_tags(&self) -> Result<Vec<Tag>> {
        self.tags().list()
    }

    // ─── Bulk ───────────────────────────────────────────────

    pub fn snapshot(&self) -> Result<RecordSet> {
        let works = self.all_works()?;
        let tags = self.all_tags()?;
        Ok(RecordSet::new(works, tags))
    }

    /// Clear works and tags and write `records` in their place, all in one
    /// transaction. On error nothing is changed.
    pub fn replace_all(&self, records: &RecordSet) -> Result<()> {
        records.validate()?;

        let conn = self.pool.get_connection();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM works", [])?;
        tx.execute("DELETE FROM tags", [])?;
        for tag in &records.tags {
            write_tag(&tx, tag)?;
        }
        for work in &records.works {
            write_work(&tx, work)?;
        }
        tx.commit()?;

        tracing::info!(
            works = records.works.len(),
            tags = records.tags.len(),
            "replaced local records"
        );
        Ok(())
    }

    // ─── App state ──────────────────────────────────────────

    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        self.state().get(key)
    }

    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.state().set(key, value)
    }

    fn get_time(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match self.get_state(key)? {
            Some(value) => match parse_timestamp(&value) {
                Ok(ts) => Ok(Some(ts)),
                Err(e) => {
                    tracing::warn!(key, value = %value, "ignoring unparseable timestamp: {e}");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn set_time(&self, key: &str, ts: DateTime<Utc>) -> Result<()> {
        self.set_state(key, &format_timestamp(&ts))
    }

    /// Stable identifier of this installation, generated on first use.
    pub fn device_id(&self) -> Result<String> {
        if let Some(id) = self.get_state(KEY_DEVICE_ID)? {
            return Ok(id);
        }
        let id = crate::sync::generate_device_id();
        self.set_state(KEY_DEVICE_ID, &id)?;
        Ok(id)
    }

    pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_time(KEY_LAST_SYNC)
    }

    pub fn set_last_sync(&self, ts: DateTime<Utc>) -> Result<()> {
        self.set_time(KEY_LAST_SYNC, ts)
    }

    pub fn last_backup(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_time(KEY_LAST_BACKUP)
    }

    pub fn set_last_backup(&self, ts: DateTime<Utc>) -> Result<()> {
        self.set_time(KEY_LAST_BACKUP, ts)
    }

    pub fn last_reminder(&self, work_id: &str) -> Result<Option<DateTime<Utc>>> {
        self.get_time(&reminder_key(work_id))
    }

    pub fn set_last_reminder(&self, work_id: &str, ts: DateTime<Utc>) -> Result<()> {
        self.set_time(&reminder_key(work_id), ts)
    }

    // ─── Stats ──────────────────────────────────────────────

    pub fn stats(&self) -> Result<LibraryStats> {
        LibraryStatsQuery::new(self.pool.get_connection()).get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EpisodeType, WorkStatus, WorkType};
    use tempfile::TempDir;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_work_resolves_tags() {
        let db = db();
        let tag = db.create_tag("shonen", None).unwrap();
        let mut input = NewWork::new("  Naruto ", WorkType::Anime);
        input.tag_ids = vec![tag.id, tag.id];
        let work = db.create_work(input).unwrap();

        assert_eq!(work.title, "Naruto");
        assert_eq!(work.tags, vec![tag]);
        assert!(work.date_updated.is_none());
        assert_eq!(db.get_work(&work.id).unwrap(), work);
    }

    #[test]
    fn test_create_work_rejects_unknown_tag_and_bad_rating() {
        let db = db();
        let mut input = NewWork::new("X", WorkType::Anime);
        input.tag_ids = vec![42];
        assert!(matches!(db.create_work(input), Err(WatchedItError::TagNotFound(_))));

        let mut input = NewWork::new("X", WorkType::Anime);
        input.rating = Some(0);
        assert!(matches!(db.create_work(input), Err(WatchedItError::ValidationError(_))));

        assert!(db.create_work(NewWork::new("   ", WorkType::Anime)).is_err());
        assert_eq!(db.count_works().unwrap(), 0);
    }

    #[test]
    fn test_update_work_sets_date_updated() {
        let db = db();
        let work = db.create_work(NewWork::new("Dune", WorkType::Novel)).unwrap();
        let patch = WorkPatch {
            status: Some(WorkStatus::Completed),
            rating: Some(Some(4)),
            review: Some(Some("Slow start".into())),
            ..Default::default()
        };
        let updated = db.update_work(&work.id, &patch).unwrap();
        assert_eq!(updated.status, WorkStatus::Completed);
        assert_eq!(updated.rating, Some(4));
        assert!(updated.date_updated.is_some());
        assert_eq!(updated.date_added, work.date_added);

        let missing = db.update_work("nope", &patch);
        assert!(matches!(missing, Err(WatchedItError::WorkNotFound(_))));
    }

    #[test]
    fn test_update_work_clears_optional_fields() {
        let db = db();
        let work = db.create_work(NewWork::new("Dune", WorkType::Novel)).unwrap();
        let set = WorkPatch {
            rating: Some(Some(5)),
            review: Some(Some("Spice".into())),
            note: Some(Some("reread".into())),
            ..Default::default()
        };
        db.update_work(&work.id, &set).unwrap();

        let clear = WorkPatch {
            rating: Some(None),
            review: Some(None),
            ..Default::default()
        };
        let cleared = db.update_work(&work.id, &clear).unwrap();
        assert_eq!(cleared.rating, None);
        assert_eq!(cleared.review, None);
        assert_eq!(cleared.note.as_deref(), Some("reread"));
    }

    #[test]
    fn test_update_works_applies_patch_to_each() {
        let db = db();
        let tag = db.create_tag("rewatch", None).unwrap();
        let a = db.create_work(NewWork::new("A", WorkType::Anime)).unwrap();
        let b = db.create_work(NewWork::new("B", WorkType::Series)).unwrap();
        let c = db.create_work(NewWork::new("C", WorkType::Movie)).unwrap();

        let patch = WorkPatch {
            status: Some(WorkStatus::Paused),
            tag_ids: Some(vec![tag.id]),
            ..Default::default()
        };
        let ids = vec![a.id.clone(), b.id.clone(), a.id.clone()];
        let updated = db.update_works(&ids, &patch).unwrap();
        assert_eq!(updated.len(), 2);
        for id in [&a.id, &b.id] {
            let stored = db.get_work(id).unwrap();
            assert_eq!(stored.status, WorkStatus::Paused);
            assert_eq!(stored.tags, vec![tag.clone()]);
            assert!(stored.date_updated.is_some());
        }
        assert_eq!(db.get_work(&c.id).unwrap().status, WorkStatus::Watching);
    }

    #[test]
    fn test_update_works_is_all_or_nothing() {
        let db = db();
        let a = db.create_work(NewWork::new("A", WorkType::Anime)).unwrap();
        let patch = WorkPatch {
            status: Some(WorkStatus::Dropped),
            ..Default::default()
        };

        let missing = db.update_works(&[a.id.clone(), "ghost".to_string()], &patch);
        assert!(matches!(missing, Err(WatchedItError::WorkNotFound(_))));
        assert_eq!(db.get_work(&a.id).unwrap().status, WorkStatus::Watching);

        let bad = WorkPatch {
            rating: Some(Some(0)),
            ..Default::default()
        };
        assert!(db.update_works(&[a.id.clone()], &bad).is_err());
        assert_eq!(db.get_work(&a.id).unwrap().rating, None);
    }

    #[test]
    fn test_delete_works() {
        let db = db();
        let a = db.create_work(NewWork::new("A", WorkType::Anime)).unwrap();
        let b = db.create_work(NewWork::new("B", WorkType::Anime)).unwrap();
        let c = db.create_work(NewWork::new("C", WorkType::Anime)).unwrap();
        db.set_last_reminder(&a.id, Utc::now()).unwrap();

        let missing = db.delete_works(&[a.id.clone(), "ghost".to_string()]);
        assert!(matches!(missing, Err(WatchedItError::WorkNotFound(_))));
        assert_eq!(db.count_works().unwrap(), 3);

        assert_eq!(db.delete_works(&[a.id.clone(), b.id.clone()]).unwrap(), 2);
        assert_eq!(db.count_works().unwrap(), 1);
        assert!(db.get_work(&c.id).is_ok());
        assert!(db.last_reminder(&a.id).unwrap().is_none());
    }

    #[test]
    fn test_episode_lifecycle() {
        let db = db();
        let work = db.create_work(NewWork::new("Frieren", WorkType::Anime)).unwrap();
        let ep = Episode::new(1, 1, EpisodeType::Episode);
        let ep_id = ep.id.clone();

        let work = db.add_episode(&work.id, ep).unwrap();
        assert_eq!(work.episodes.len(), 1);

        let work = db.set_episode_watched(&work.id, &ep_id, true).unwrap();
        assert!(work.episodes[0].watched);
        assert!(work.episodes[0].date_watched.is_some());

        let err = db.set_episode_watched(&work.id, "ghost", true).unwrap_err();
        assert!(err.is_not_found());

        let work = db.remove_episode(&work.id, &ep_id).unwrap();
        assert!(work.episodes.is_empty());
        assert!(db.remove_episode(&work.id, &ep_id).is_err());
    }

    #[test]
    fn test_duplicate_episode_id_rejected() {
        let db = db();
        let work = db.create_work(NewWork::new("A", WorkType::Anime)).unwrap();
        let ep = Episode::new(1, 1, EpisodeType::Episode);
        db.add_episode(&work.id, ep.clone()).unwrap();
        assert!(db.add_episode(&work.id, ep).is_err());
    }

    #[test]
    fn test_tag_ids_and_uniqueness() {
        let db = db();
        let a = db.create_tag("a", None).unwrap();
        let b = db.create_tag("b", Some("#111111")).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(b.color, "#111111");

        assert!(matches!(db.create_tag("a", None), Err(WatchedItError::DuplicateTag(_))));
        assert!(db.create_tag("  ", None).is_err());
        assert!(matches!(
            db.update_tag(b.id, Some("a"), None),
            Err(WatchedItError::DuplicateTag(_))
        ));
        assert!(db.update_tag(b.id, Some("b"), None).is_ok());
    }

    #[test]
    fn test_tag_rename_and_delete_cascade_into_works() {
        let db = db();
        let tag = db.create_tag("old", None).unwrap();
        let mut input = NewWork::new("A", WorkType::Anime);
        input.tag_ids = vec![tag.id];
        let work = db.create_work(input).unwrap();

        db.update_tag(tag.id, Some("new"), Some("#ff0000")).unwrap();
        let stored = db.get_work(&work.id).unwrap();
        assert_eq!(stored.tags[0].name, "new");
        assert_eq!(stored.tags[0].color, "#ff0000");

        db.delete_tag(tag.id).unwrap();
        assert!(db.get_work(&work.id).unwrap().tags.is_empty());
        assert!(matches!(db.delete_tag(tag.id), Err(WatchedItError::TagNotFound(_))));
    }

    #[test]
    fn test_replace_all_and_snapshot() {
        let db = db();
        db.create_work(NewWork::new("gone", WorkType::Anime)).unwrap();
        db.create_tag("gone", None).unwrap();

        let mut w = Work::new("kept", WorkType::Manga);
        w.tags.push(Tag::new(9, "seinen"));
        let records = RecordSet::new(vec![w.clone()], vec![Tag::new(9, "seinen")]);
        db.replace_all(&records).unwrap();

        let snap = db.snapshot().unwrap();
        assert_eq!(snap, records);
        assert_eq!(db.create_tag("next", None).unwrap().id, 10);
    }

    #[test]
    fn test_replace_all_rolls_back_on_invalid_input() {
        let db = db();
        let existing = db.create_work(NewWork::new("keep me", WorkType::Anime)).unwrap();

        let mut bad = Work::new("bad", WorkType::Anime);
        bad.rating = Some(9);
        assert!(db.replace_all(&RecordSet::new(vec![bad], vec![])).is_err());
        assert_eq!(db.get_work(&existing.id).unwrap().title, "keep me");
    }

    #[test]
    fn test_app_state() {
        let db = db();
        let id = db.device_id().unwrap();
        assert!(id.starts_with("device_"));
        assert_eq!(db.device_id().unwrap(), id);

        assert!(db.last_sync().unwrap().is_none());
        let now = Utc::now();
        db.set_last_sync(now).unwrap();
        assert_eq!(db.last_sync().unwrap(), Some(now));

        db.set_state(KEY_LAST_BACKUP, "not a date").unwrap();
        assert!(db.last_backup().unwrap().is_none());
    }

    #[test]
    fn test_delete_work_clears_reminder_state() {
        let db = db();
        let work = db.create_work(NewWork::new("A", WorkType::Anime)).unwrap();
        db.set_last_reminder(&work.id, Utc::now()).unwrap();
        db.delete_work(&work.id).unwrap();
        assert!(db.last_reminder(&work.id).unwrap().is_none());
        assert!(db.delete_work(&work.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("watchedit.db");
        let id = {
            let db = Database::open(&path).unwrap();
            db.create_work(NewWork::new("persisted", WorkType::Game)).unwrap().id
        };
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_work(&id).unwrap().title, "persisted");
        assert_eq!(db.applied_migrations().unwrap(), vec![SCHEMA_VERSION]);
    }
}
