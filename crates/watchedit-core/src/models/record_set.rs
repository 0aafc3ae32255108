use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchedItError};
use crate::models::{Tag, Work};

/// Every work and tag of a store, as exchanged by the backup codec,
/// the sync merge and the store's bulk operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    #[serde(default)]
    pub works: Vec<Work>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl RecordSet {
    pub fn new(works: Vec<Work>, tags: Vec<Tag>) -> Self {
        Self { works, tags }
    }

    pub fn is_empty(&self) -> bool {
        self.works.is_empty() && self.tags.is_empty()
    }

    pub fn total_episodes(&self) -> usize {
        self.works.iter().map(|w| w.episodes.len()).sum()
    }

    pub fn watched_episodes(&self) -> usize {
        self.works
            .iter()
            .map(|w| w.episodes.iter().filter(|ep| ep.watched).count())
            .sum()
    }

    pub fn completion_rate(&self) -> f64 {
        completion_rate(self.watched_episodes(), self.total_episodes())
    }

    /// Every work must pass [`Work::validate`] and work ids must be unique.
    /// Checked before the set replaces a store or leaves the device.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.works.len());
        for work in &self.works {
            work.validate()?;
            if !seen.insert(work.id.as_str()) {
                return Err(WatchedItError::validation(format!(
                    "duplicate work id {}",
                    work.id
                )));
            }
        }
        Ok(())
    }
}

/// `watched / total * 100`, or 0 when there is nothing to watch.
pub fn completion_rate(watched: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        watched as f64 / total as f64 * 100.0
    }
}
