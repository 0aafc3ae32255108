use thiserror::Error;

/// All errors that can occur in watchedit-core.
#[derive(Debug, Error)]
pub enum WatchedItError {
    #[error("Work not found: {0}")]
    WorkNotFound(String),

    #[error("Tag not found: {0}")]
    TagNotFound(String),

    #[error("Episode {episode} not found in work {work}")]
    EpisodeNotFound { work: String, episode: String },

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate tag: {0}")]
    DuplicateTag(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl WatchedItError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::WorkNotFound(_)
                | Self::TagNotFound(_)
                | Self::EpisodeNotFound { .. }
                | Self::BackupNotFound(_)
        )
    }
}

/// Exit codes used by the CLI.
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    FileSystemError = 4,
    NetworkError = 6,
    Conflict = 7,
    ConfirmRequired = 8,
}

pub type Result<T> = std::result::Result<T, WatchedItError>;
