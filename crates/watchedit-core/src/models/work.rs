use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WatchedItError};
use crate::models::episode::Episode;
use crate::models::tag::Tag;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

// ─── Work ───────────────────────────────────────────────────

/// A trackable media item, the canonical record of the store.
/// Episodes are owned by the work; tags are embedded by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: String,
    pub title: String,

    #[serde(rename = "type")]
    pub work_type: WorkType,

    pub status: WorkStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default)]
    pub reminder_enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_frequency: Option<ReminderFrequency>,

    #[serde(default)]
    pub episodes: Vec<Episode>,

    #[serde(default)]
    pub tags: Vec<Tag>,

    pub date_added: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_updated: Option<DateTime<Utc>>,
}

impl Work {
    /// Create a new work with a fresh id and `date_added` set to now.
    pub fn new(title: impl Into<String>, work_type: WorkType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            work_type,
            status: WorkStatus::default(),
            year: None,
            rating: None,
            review: None,
            note: None,
            source: None,
            reminder_enabled: false,
            reminder_frequency: None,
            episodes: Vec::new(),
            tags: Vec::new(),
            date_added: Utc::now(),
            date_updated: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(WatchedItError::validation("work title must not be empty"));
        }
        if let Some(rating) = self.rating {
            validate_rating(rating)?;
        }
        let mut seen = std::collections::HashSet::new();
        for episode in &self.episodes {
            if !seen.insert(episode.id.as_str()) {
                return Err(WatchedItError::validation(format!(
                    "duplicate episode id {} in work {}",
                    episode.id, self.id
                )));
            }
        }
        Ok(())
    }

    /// Refresh `date_updated`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.date_updated = Some(match self.date_updated {
            Some(previous) if previous > now => previous,
            _ => now,
        });
    }

    pub fn progress(&self) -> WorkProgress {
        let watched = self.episodes.iter().filter(|ep| ep.watched).count();
        let next_unwatched = self
            .episodes
            .iter()
            .filter(|ep| !ep.watched)
            .min_by_key(|ep| (ep.season, ep.number))
            .map(|ep| (ep.season, ep.number));
        WorkProgress {
            watched,
            total: self.episodes.len(),
            next_unwatched,
        }
    }

    pub fn has_tag(&self, tag_id: u32) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }

    pub fn episode_mut(&mut self, episode_id: &str) -> Result<&mut Episode> {
        let work = self.id.clone();
        self.episodes
            .iter_mut()
            .find(|ep| ep.id == episode_id)
            .ok_or_else(|| WatchedItError::EpisodeNotFound {
                work,
                episode: episode_id.to_string(),
            })
    }
}

pub fn validate_rating(rating: u8) -> Result<()> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(WatchedItError::validation(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
        )));
    }
    Ok(())
}

/// Episode progress derived from the typed episode list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkProgress {
    pub watched: usize,
    pub total: usize,
    /// `(season, number)` of the earliest unwatched episode.
    pub next_unwatched: Option<(u32, u32)>,
}

impl WorkProgress {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.watched == self.total
    }
}

// ─── Create / Update inputs ────────────────────────────────

/// Input for creating a work.
#[derive(Debug, Clone, Default)]
pub struct NewWork {
    pub title: String,
    pub work_type: WorkType,
    pub status: WorkStatus,
    pub year: Option<i32>,
    pub rating: Option<u8>,
    pub review: Option<String>,
    pub note: Option<String>,
    pub source: Option<String>,
    pub reminder_enabled: bool,
    pub reminder_frequency: Option<ReminderFrequency>,
    pub episodes: Vec<Episode>,
    pub tag_ids: Vec<u32>,
}

impl NewWork {
    pub fn new(title: impl Into<String>, work_type: WorkType) -> Self {
        Self {
            title: title.into(),
            work_type,
            ..Default::default()
        }
    }
}

/// Partial update. `None` leaves a field unchanged; for the optional
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct WorkPatch {
    pub title: Option<String>,
    pub work_type: Option<WorkType>,
    pub status: Option<WorkStatus>,
    pub year: Option<Option<i32>>,
    pub rating: Option<Option<u8>>,
    pub review: Option<Option<String>>,
    pub note: Option<Option<String>>,
    pub source: Option<Option<String>>,
    pub reminder_enabled: Option<bool>,
    pub reminder_frequency: Option<ReminderFrequency>,
    pub tag_ids: Option<Vec<u32>>,
}

impl WorkPatch {
    /// Apply every field except `tag_ids`, which needs the tag table to resolve.
    pub fn apply_fields(&self, work: &mut Work) {
        if let Some(title) = &self.title {
            work.title = title.clone();
        }
        if let Some(work_type) = self.work_type {
            work.work_type = work_type;
        }
        if let Some(status) = self.status {
            work.status = status;
        }
        if let Some(year) = self.year {
            work.year = year;
        }
        if let Some(rating) = self.rating {
            work.rating = rating;
        }
        if let Some(review) = &self.review {
            work.review = review.clone();
        }
        if let Some(note) = &self.note {
            work.note = note.clone();
        }
        if let Some(source) = &self.source {
            work.source = source.clone();
        }
        if let Some(enabled) = self.reminder_enabled {
            work.reminder_enabled = enabled;
        }
        if let Some(frequency) = self.reminder_frequency {
            work.reminder_frequency = Some(frequency);
        }
    }
}

// ─── Enums ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    #[default]
    Anime,
    Movie,
    Series,
    Novel,
    Manga,
    Game,
}

impl WorkType {
    pub const ALL: [WorkType; 6] = [
        Self::Anime,
        Self::Movie,
        Self::Series,
        Self::Novel,
        Self::Manga,
        Self::Game,
    ];
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Anime => "anime",
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Novel => "novel",
            Self::Manga => "manga",
            Self::Game => "game",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anime" => Ok(Self::Anime),
            "movie" => Ok(Self::Movie),
            "series" | "tv" => Ok(Self::Series),
            "novel" => Ok(Self::Novel),
            "manga" => Ok(Self::Manga),
            "game" => Ok(Self::Game),
            _ => Err(format!("Invalid WorkType: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    #[default]
    Watching,
    Completed,
    Paused,
    Dropped,
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Watching => write!(f, "watching"),
            Self::Completed => write!(f, "completed"),
            Self::Paused => write!(f, "paused"),
            Self::Dropped => write!(f, "dropped"),
        }
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "watching" => Ok(Self::Watching),
            "completed" => Ok(Self::Completed),
            "paused" => Ok(Self::Paused),
            "dropped" => Ok(Self::Dropped),
            _ => Err(format!("Invalid WorkStatus: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderFrequency {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl std::fmt::Display for ReminderFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for ReminderFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("Invalid ReminderFrequency: {s}")),
        }
    }
}

// ─── Tests ─────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EpisodeType;

    #[test]
    fn test_work_new() {
        let work = Work::new("Frieren", WorkType::Anime);
        assert_eq!(work.title, "Frieren");
        assert_eq!(work.status, WorkStatus::Watching);
        assert!(work.date_updated.is_none());
        assert!(Uuid::parse_str(&work.id).is_ok());
    }

    #[test]
    fn test_work_serializes_type_field() {
        let work = Work::new("Dune", WorkType::Novel);
        let json = serde_json::to_value(&work).unwrap();
        assert_eq!(json["type"], "novel");
        assert_eq!(json["status"], "watching");
        assert!(json.get("year").is_none());
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut work = Work::new("A", WorkType::Anime);
        let future = Utc::now() + chrono::Duration::days(1);
        work.date_updated = Some(future);
        work.touch();
        assert_eq!(work.date_updated, Some(future));

        work.date_updated = None;
        work.touch();
        assert!(work.date_updated.is_some());
    }

    #[test]
    fn test_validate_rejects_bad_rating() {
        let mut work = Work::new("A", WorkType::Anime);
        work.rating = Some(6);
        assert!(work.validate().is_err());
        work.rating = Some(5);
        assert!(work.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_episode_ids() {
        let mut work = Work::new("A", WorkType::Anime);
        let mut ep = Episode::new(1, 1, EpisodeType::Episode);
        ep.id = "same".into();
        work.episodes.push(ep.clone());
        work.episodes.push(ep);
        assert!(matches!(work.validate(), Err(WatchedItError::ValidationError(_))));
    }

    #[test]
    fn test_progress() {
        let mut work = Work::new("A", WorkType::Anime);
        for n in 1..=3 {
            work.episodes.push(Episode::new(n, 1, EpisodeType::Episode));
        }
        work.episodes[0].watched = true;
        let progress = work.progress();
        assert_eq!(progress.watched, 1);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.next_unwatched, Some((1, 2)));
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_enum_from_str() {
        assert_eq!("Movie".parse::<WorkType>().unwrap(), WorkType::Movie);
        assert_eq!("tv".parse::<WorkType>().unwrap(), WorkType::Series);
        assert_eq!("dropped".parse::<WorkStatus>().unwrap(), WorkStatus::Dropped);
        assert!("sometimes".parse::<ReminderFrequency>().is_err());
    }
}
