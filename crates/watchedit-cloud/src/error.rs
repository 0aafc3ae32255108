use thiserror::Error;

use watchedit_core::WatchedItError;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("cloud sync is not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("API error from {0}: {1}")]
    Api(String, String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Core(#[from] WatchedItError),
}

impl CloudError {
    /// Failures of the remote side or the transport, as opposed to local ones.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. } | Self::Api(..))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
