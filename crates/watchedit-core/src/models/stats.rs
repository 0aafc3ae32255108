use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aggregate view over the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryStats {
    pub total_works: usize,
    pub total_tags: usize,
    pub type_stats: BTreeMap<String, usize>,
    pub status_stats: BTreeMap<String, usize>,
    /// Keyed by year; works without a year are counted under `"unknown"`.
    pub year_stats: BTreeMap<String, usize>,
    pub total_episodes: usize,
    pub watched_episodes: usize,
    pub completion_rate: f64,
}
