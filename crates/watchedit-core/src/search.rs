use nucleo_matcher::pattern::{AtomKind, CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config, Matcher, Utf32Str};
use serde::Serialize;

use crate::models::Work;

/// A work matched by a fuzzy query, with its score.
#[derive(Debug, Clone, Serialize)]
pub struct WorkMatch<'a> {
    pub work: &'a Work,
    pub score: u32,
    /// Matched character positions in the title, for highlighting.
    pub title_indices: Vec<u32>,
}

/// Fuzzy title search over works; source, tag names, review and note also match.
pub struct FuzzySearcher {
    matcher: Matcher,
}

impl FuzzySearcher {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(Config::DEFAULT),
        }
    }

    /// Best matches first; ties keep the input order. An empty query matches everything.
    pub fn search<'a>(&mut self, query: &str, works: &'a [Work], limit: usize) -> Vec<WorkMatch<'a>> {
        let query = query.trim();
        if query.is_empty() {
            return works
                .iter()
                .take(limit)
                .map(|work| WorkMatch {
                    work,
                    score: 0,
                    title_indices: Vec::new(),
                })
                .collect();
        }

        let pattern = Pattern::new(
            query,
            CaseMatching::Ignore,
            Normalization::Smart,
            AtomKind::Fuzzy,
        );
        let mut buf = Vec::new();
        let mut matches = Vec::new();

        for work in works {
            let tag_names: Vec<&str> = work.tags.iter().map(|t| t.name.as_str()).collect();
            let haystack_text = format!(
                "{} {} {} {} {}",
                work.title,
                work.source.as_deref().unwrap_or(""),
                tag_names.join(" "),
                work.review.as_deref().unwrap_or(""),
                work.note.as_deref().unwrap_or("")
            );
            let haystack = Utf32Str::new(&haystack_text, &mut buf);
            let mut indices = Vec::new();

            if let Some(score) = pattern.indices(haystack, &mut self.matcher, &mut indices) {
                let title_len = work.title.chars().count() as u32;
                indices.retain(|i| *i < title_len);
                matches.push(WorkMatch {
                    work,
                    score,
                    title_indices: indices,
                });
            }
        }

        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(limit);
        matches
    }
}

impl Default for FuzzySearcher {
    fn default() -> Self {
        Self::new()
    }
}
