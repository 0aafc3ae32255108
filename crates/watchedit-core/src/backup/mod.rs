//! Versioned backup documents: build from the store, encode as JSON or CSV,
//! decode with validation, restore.

mod auto;
mod csv;
mod json;

pub use self::auto::{AutoBackupEntry, AutoBackupStore, AUTO_BACKUP_PREFIX};
pub use self::csv::{decode_csv, encode_csv, CSV_BANNER, CSV_HEADER};
pub use self::json::{decode_json, encode_json};

use std::path::Path;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchedItError};
use crate::models::{completion_rate, format_timestamp, RecordSet, Tag, Work};
use crate::storage::database::Database;

/// Format version written into every document.
pub const BACKUP_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub version: String,
    pub timestamp: String,
    #[serde(default)]
    pub works: Vec<Work>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Never read from input; decoders recompute it from the records.
    #[serde(default, skip_deserializing)]
    pub metadata: BackupMetadata,
}

/// Aggregates derived from the records; recomputed on every decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackupMetadata {
    pub total_works: usize,
    pub total_tags: usize,
    pub total_episodes: usize,
    pub watched_episodes: usize,
    pub completion_rate: f64,
}

impl BackupMetadata {
    pub fn compute(works: &[Work], tags: &[Tag]) -> Self {
        let total_episodes = works.iter().map(|w| w.episodes.len()).sum();
        let watched_episodes = works
            .iter()
            .map(|w| w.episodes.iter().filter(|ep| ep.watched).count())
            .sum();
        Self {
            total_works: works.len(),
            total_tags: tags.len(),
            total_episodes,
            watched_episodes,
            completion_rate: completion_rate(watched_episodes, total_episodes),
        }
    }
}

impl BackupDocument {
    /// A document stamped with the current version and time.
    pub fn new(records: RecordSet) -> Self {
        Self::with_header(BACKUP_VERSION, format_timestamp(&Utc::now()), records)
    }

    pub(crate) fn with_header(
        version: impl Into<String>,
        timestamp: impl Into<String>,
        records: RecordSet,
    ) -> Self {
        let metadata = BackupMetadata::compute(&records.works, &records.tags);
        Self {
            version: version.into(),
            timestamp: timestamp.into(),
            works: records.works,
            tags: records.tags,
            metadata,
        }
    }

    pub fn records(&self) -> RecordSet {
        RecordSet::new(self.works.clone(), self.tags.clone())
    }

    pub fn into_records(self) -> RecordSet {
        RecordSet::new(self.works, self.tags)
    }

    pub(crate) fn recompute_metadata(&mut self) {
        self.metadata = BackupMetadata::compute(&self.works, &self.tags);
    }

    pub(crate) fn warn_on_version_mismatch(&self) {
        if self.version != BACKUP_VERSION {
            tracing::warn!(
                found = %self.version,
                expected = BACKUP_VERSION,
                "backup version differs from current version"
            );
        }
    }
}

// ─── Format ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupFormat {
    Json,
    Csv,
}

impl BackupFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            _ => Err(WatchedItError::validation(format!(
                "unsupported backup file type: {}",
                path.display()
            ))),
        }
    }

    pub fn encode(&self, doc: &BackupDocument) -> Result<String> {
        match self {
            Self::Json => encode_json(doc),
            Self::Csv => encode_csv(doc),
        }
    }

    pub fn decode(&self, text: &str) -> Result<BackupDocument> {
        match self {
            Self::Json => decode_json(text),
            Self::Csv => decode_csv(text),
        }
    }
}

impl std::fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl std::str::FromStr for BackupFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(format!("Invalid BackupFormat: {s}")),
        }
    }
}

/// `watchedit-backup-YYYY-MM-DD.<ext>`
pub fn default_file_name(format: BackupFormat, date: NaiveDate) -> String {
    format!("watchedit-backup-{}.{}", date.format("%Y-%m-%d"), format.extension())
}

// ─── Store operations ──────────────────────────────────────

pub fn create_backup(db: &Database) -> Result<BackupDocument> {
    Ok(BackupDocument::new(db.snapshot()?))
}

/// Write a backup of the store to `path`, choosing the codec from its extension.
pub fn export_to_path(db: &Database, path: &Path) -> Result<BackupDocument> {
    let format = BackupFormat::from_path(path)?;
    let doc = create_backup(db)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format.encode(&doc)?)?;
    db.set_last_backup(Utc::now())?;
    tracing::info!(path = %path.display(), %format, works = doc.works.len(), "exported backup");
    Ok(doc)
}

pub fn read_from_path(path: &Path) -> Result<BackupDocument> {
    let format = BackupFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)?;
    format.decode(&text)
}

/// Replace the store's works and tags with the document's.
pub fn restore(db: &Database, doc: &BackupDocument) -> Result<()> {
    doc.warn_on_version_mismatch();
    db.replace_all(&doc.records())?;
    tracing::info!(works = doc.works.len(), tags = doc.tags.len(), "restored backup");
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    pub works_count: usize,
    pub tags_count: usize,
    pub total_episodes: usize,
    pub watched_episodes: usize,
    /// Percentage rounded to two decimals.
    pub completion_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_backup: Option<String>,
}

pub fn database_info(db: &Database) -> Result<DatabaseInfo> {
    let stats = db.stats()?;
    Ok(DatabaseInfo {
        works_count: stats.total_works,
        tags_count: stats.total_tags,
        total_episodes: stats.total_episodes,
        watched_episodes: stats.watched_episodes,
        completion_rate: (stats.completion_rate * 100.0).round() / 100.0,
        last_backup: db.last_backup()?.as_ref().map(format_timestamp),
    })
}
