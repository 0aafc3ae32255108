use std::str::FromStr;
use std::sync::MutexGuard;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{
    format_timestamp, parse_timestamp, Episode, ReminderFrequency, Tag, Work, WorkStatus, WorkType,
};

use super::{conversion_error, Repository};

pub const DEFAULT_PAGE_SIZE: usize = 20;

const WORK_COLUMNS: &str = "id, title, work_type, status, year, rating, review, note, source,
     reminder_enabled, reminder_frequency, episodes, tags, date_added, date_updated";

/// Episode progress bucket for listings. Works without episodes pass every bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressFilter {
    NotStarted,
    InProgress,
    Completed,
    /// At least 80% watched.
    High,
    /// Under 20% watched.
    Low,
}

impl ProgressFilter {
    pub fn matches(&self, work: &Work) -> bool {
        let progress = work.progress();
        if progress.total == 0 {
            return true;
        }
        let percent = progress.watched as f64 / progress.total as f64 * 100.0;
        match self {
            Self::NotStarted => progress.watched == 0,
            Self::InProgress => progress.watched > 0 && progress.watched < progress.total,
            Self::Completed => progress.watched == progress.total,
            Self::High => percent >= 80.0,
            Self::Low => percent < 20.0,
        }
    }
}

impl std::fmt::Display for ProgressFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not-started",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::High => "high",
            Self::Low => "low",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ProgressFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "not-started" | "unstarted" => Ok(Self::NotStarted),
            "in-progress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            _ => Err(format!("Invalid ProgressFilter: {s}")),
        }
    }
}

/// Filters for a paged listing. All set criteria must match; `tag_ids`
/// matches works carrying any of the listed tags. The rating range only
/// constrains rated works.
#[derive(Debug, Clone)]
pub struct WorkFilter {
    /// Case-insensitive substring of the title, review, note or a tag name.
    pub text: Option<String>,
    pub work_type: Option<WorkType>,
    pub status: Option<WorkStatus>,
    pub year: Option<i32>,
    pub tag_ids: Vec<u32>,
    pub min_rating: Option<u8>,
    pub max_rating: Option<u8>,
    pub progress: Option<ProgressFilter>,
    /// 1-based.
    pub page: usize,
    pub size: usize,
}

impl Default for WorkFilter {
    fn default() -> Self {
        Self {
            text: None,
            work_type: None,
            status: None,
            year: None,
            tag_ids: Vec::new(),
            min_rating: None,
            max_rating: None,
            progress: None,
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl WorkFilter {
    fn matches_in_memory(&self, work: &Work) -> bool {
        if let Some(text) = &self.text
            && !matches_text(work, &text.to_lowercase())
        {
            return false;
        }
        if !self.tag_ids.is_empty() && !self.tag_ids.iter().any(|id| work.has_tag(*id)) {
            return false;
        }
        if let Some(rating) = work.rating
            && (self.min_rating.is_some_and(|min| rating < min)
                || self.max_rating.is_some_and(|max| rating > max))
        {
            return false;
        }
        if let Some(progress) = self.progress
            && !progress.matches(work)
        {
            return false;
        }
        true
    }
}

fn matches_text(work: &Work, needle: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(needle);
    contains(&work.title)
        || work.review.as_deref().is_some_and(contains)
        || work.note.as_deref().is_some_and(contains)
        || work.tags.iter().any(|t| contains(&t.name))
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkPage {
    pub works: Vec<Work>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
}

pub trait WorkRepository: Repository<Entity = Work, Id = String> {
    /// Filtered page, most recently added first.
    fn list(&self, filter: &WorkFilter) -> Result<WorkPage>;
    /// Every work in insertion order.
    fn all(&self) -> Result<Vec<Work>>;
    fn count(&self) -> Result<usize>;
    /// Drop tag `tag_id` from every work embedding it. Returns the number of works changed.
    fn remove_tag_references(&self, tag_id: u32) -> Result<usize>;
    /// Replace embedded copies of `tag` with its current name and colour.
    fn refresh_tag_references(&self, tag: &Tag) -> Result<usize>;
}

pub struct SqliteWorkRepository<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> SqliteWorkRepository<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }

    fn row_to_work(row: &rusqlite::Row) -> rusqlite::Result<Work> {
        let work_type: String = row.get(2)?;
        let status: String = row.get(3)?;
        let frequency: Option<String> = row.get(10)?;
        let episodes: String = row.get(11)?;
        let tags: String = row.get(12)?;
        let date_added: String = row.get(13)?;
        let date_updated: Option<String> = row.get(14)?;

        Ok(Work {
            id: row.get(0)?,
            title: row.get(1)?,
            work_type: WorkType::from_str(&work_type).map_err(|e| conversion_error(2, e))?,
            status: WorkStatus::from_str(&status).map_err(|e| conversion_error(3, e))?,
            year: row.get(4)?,
            rating: row.get(5)?,
            review: row.get(6)?,
            note: row.get(7)?,
            source: row.get(8)?,
            reminder_enabled: row.get(9)?,
            reminder_frequency: frequency
                .map(|f| ReminderFrequency::from_str(&f))
                .transpose()
                .map_err(|e| conversion_error(10, e))?,
            episodes: serde_json::from_str::<Vec<Episode>>(&episodes)
                .map_err(|e| conversion_error(11, e))?,
            tags: serde_json::from_str::<Vec<Tag>>(&tags).map_err(|e| conversion_error(12, e))?,
            date_added: parse_timestamp(&date_added).map_err(|e| conversion_error(13, e))?,
            date_updated: date_updated
                .map(|d| parse_timestamp(&d))
                .transpose()
                .map_err(|e| conversion_error(14, e))?,
        })
    }

    /// Works matching the SQL-expressible part of the filter, in insertion order.
    fn query_filtered(&self, filter: &WorkFilter) -> Result<Vec<Work>> {
        let mut clauses = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(work_type) = filter.work_type {
            values.push(work_type.to_string().into());
            clauses.push(format!("work_type = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(status.to_string().into());
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(year) = filter.year {
            values.push(i64::from(year).into());
            clauses.push(format!("year = ?{}", values.len()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("SELECT {WORK_COLUMNS} FROM works {where_clause} ORDER BY rowid");

        let mut stmt = self.conn.prepare(&sql)?;
        let works = stmt
            .query_map(rusqlite::params_from_iter(values), Self::row_to_work)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(works)
    }

    fn rewrite_tags(&self, mut edit: impl FnMut(&mut Vec<Tag>) -> bool) -> Result<usize> {
        let mut changed = 0;
        for work in self.all()? {
            let mut tags = work.tags;
            if edit(&mut tags) {
                self.conn.execute(
                    "UPDATE works SET tags = ?1 WHERE id = ?2",
                    params![serde_json::to_string(&tags)?, work.id],
                )?;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// Upsert a work. `ON CONFLICT DO UPDATE` keeps the row's rowid, so listing
/// order stays the order works were first written.
pub(crate) fn write_work(conn: &Connection, work: &Work) -> Result<()> {
    conn.execute(
        "INSERT INTO works
            (id, title, work_type, status, year, rating, review, note, source,
             reminder_enabled, reminder_frequency, episodes, tags, date_added, date_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            work_type = excluded.work_type,
            status = excluded.status,
            year = excluded.year,
            rating = excluded.rating,
            review = excluded.review,
            note = excluded.note,
            source = excluded.source,
            reminder_enabled = excluded.reminder_enabled,
            reminder_frequency = excluded.reminder_frequency,
            episodes = excluded.episodes,
            tags = excluded.tags,
            date_added = excluded.date_added,
            date_updated = excluded.date_updated",
        params![
            work.id,
            work.title,
            work.work_type.to_string(),
            work.status.to_string(),
            work.year,
            work.rating,
            work.review,
            work.note,
            work.source,
            work.reminder_enabled,
            work.reminder_frequency.map(|f| f.to_string()),
            serde_json::to_string(&work.episodes)?,
            serde_json::to_string(&work.tags)?,
            format_timestamp(&work.date_added),
            work.date_updated.as_ref().map(format_timestamp),
        ],
    )?;
    Ok(())
}

impl<'a> Repository for SqliteWorkRepository<'a> {
    type Entity = Work;
    type Id = String;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let work = self
            .conn
            .query_row(
                &format!("SELECT {WORK_COLUMNS} FROM works WHERE id = ?1"),
                params![id],
                Self::row_to_work,
            )
            .optional()?;
        Ok(work)
    }

    fn save(&self, work: &Self::Entity) -> Result<()> {
        write_work(&self.conn, work)
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM works WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

impl<'a> WorkRepository for SqliteWorkRepository<'a> {
    fn list(&self, filter: &WorkFilter) -> Result<WorkPage> {
        let page = filter.page.max(1);
        let size = if filter.size == 0 { DEFAULT_PAGE_SIZE } else { filter.size };

        let mut matching: Vec<Work> = self
            .query_filtered(filter)?
            .into_iter()
            .filter(|w| filter.matches_in_memory(w))
            .collect();
        // Newest first; equal dates keep insertion order.
        matching.sort_by(|a, b| b.date_added.cmp(&a.date_added));
        let total = matching.len();
        let works = matching
            .into_iter()
            .skip((page - 1) * size)
            .take(size)
            .collect();

        Ok(WorkPage {
            works,
            total,
            page,
            size,
        })
    }

    fn all(&self) -> Result<Vec<Work>> {
        self.query_filtered(&WorkFilter::default())
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM works", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn remove_tag_references(&self, tag_id: u32) -> Result<usize> {
        self.rewrite_tags(|tags| {
            let before = tags.len();
            tags.retain(|t| t.id != tag_id);
            tags.len() != before
        })
    }

    fn refresh_tag_references(&self, tag: &Tag) -> Result<usize> {
        self.rewrite_tags(|tags| {
            let mut changed = false;
            for embedded in tags.iter_mut().filter(|t| t.id == tag.id) {
                if embedded != tag {
                    *embedded = tag.clone();
                    changed = true;
                }
            }
            changed
        })
    }
}
