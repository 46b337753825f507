//! Filter retrieval
//!
//! Deterministic "guaranteed inclusion" matches that bypass score-based
//! truncation downstream: explicit wiki-referenced titles, tag mentions
//! with hierarchical prefix matching, and time-range membership backed by
//! a synthesized daily-note calendar.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::core::config::DailyConfig;
use crate::core::frontmatter::normalize_tag;
use crate::core::note::NoteDocument;
use crate::core::store::{DocumentStore, MetadataReader};
use crate::core::wikilink::extract_wikilinks;

lazy_static! {
    static ref QUERY_TAG_RE: Regex = Regex::new(r"#([A-Za-z0-9_][A-Za-z0-9_/-]*)").unwrap();
}

/// Floor for the recency score of an in-range note
const RECENCY_FLOOR: f32 = 0.3;
/// Cap applied to mtime matches when the caller asks for everything
const RETURN_ALL_FLOOR: usize = 200;

/// An inclusive time window over note modification times
#[derive(Debug, Clone)]
pub struct TimeRange {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    /// Lift the per-call cap to `max(max_k, 200)`
    pub return_all: bool,
}

/// A guaranteed-include match with its score
#[derive(Debug, Clone)]
pub struct FilterMatch {
    pub document: NoteDocument,
    pub score: f32,
}

pub struct FilterRetriever {
    store: Arc<dyn DocumentStore>,
    meta: Arc<dyn MetadataReader>,
    daily: DailyConfig,
}

impl FilterRetriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        meta: Arc<dyn MetadataReader>,
        daily: DailyConfig,
    ) -> Self {
        Self { store, meta, daily }
    }

    /// Resolve deterministic matches for a query.
    ///
    /// With a time range the range fully defines the result set; otherwise
    /// explicit title references and tag mentions are matched. Every result
    /// is exempt from downstream truncation.
    pub fn relevant_documents(
        &self,
        query: &str,
        time_range: Option<&TimeRange>,
        max_k: usize,
        daily_note_cap: usize,
    ) -> Vec<FilterMatch> {
        match time_range {
            Some(range) => self.time_range_documents(range, max_k, daily_note_cap),
            None => self.term_documents(query),
        }
    }

    // ------------------------------------------------------------------
    // Time-range mode
    // ------------------------------------------------------------------

    fn time_range_documents(
        &self,
        range: &TimeRange,
        max_k: usize,
        daily_note_cap: usize,
    ) -> Vec<FilterMatch> {
        let mut by_path: HashMap<String, FilterMatch> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        // (a) the synthesized daily-note calendar, clamped to the most
        // recent `daily_note_cap` days when the range is longer
        for path in self.daily_note_paths(range, daily_note_cap) {
            if self.meta.is_excluded(&path) {
                continue;
            }
            match NoteDocument::load(self.store.as_ref(), self.meta.as_ref(), &path) {
                Ok(document) => {
                    if by_path
                        .insert(path.clone(), FilterMatch { document, score: 1.0 })
                        .is_none()
                    {
                        order.push(path);
                    }
                }
                Err(e) => warn!("filter skipping unreadable daily note {}: {}", path, e),
            }
        }

        // (b) everything else modified inside the range, recency scored
        let cap = if range.return_all {
            max_k.max(RETURN_ALL_FLOOR)
        } else {
            max_k
        };
        let mut mtime_matches: Vec<FilterMatch> = Vec::new();
        for path in self.store.list_notes() {
            if by_path.contains_key(&path) || self.meta.is_excluded(&path) {
                continue;
            }
            let stat = match self.store.stat(&path) {
                Ok(stat) => stat,
                Err(e) => {
                    debug!("filter skipping {}: {}", path, e);
                    continue;
                }
            };
            if stat.mtime < range.start || stat.mtime > range.end {
                continue;
            }
            match NoteDocument::load(self.store.as_ref(), self.meta.as_ref(), &path) {
                Ok(document) => {
                    let score = recency_score(document.mtime);
                    mtime_matches.push(FilterMatch { document, score });
                }
                Err(e) => warn!("filter skipping unreadable {}: {}", path, e),
            }
        }
        mtime_matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        mtime_matches.truncate(cap);

        for m in mtime_matches {
            let path = m.document.path.clone();
            // Daily-note matches win ties by arriving first
            if by_path.insert(path.clone(), m).is_none() {
                order.push(path);
            }
        }

        let mut results: Vec<FilterMatch> =
            order.into_iter().filter_map(|p| by_path.remove(&p)).collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    /// Paths of daily notes whose titles fall inside the range
    fn daily_note_paths(&self, range: &TimeRange, daily_note_cap: usize) -> Vec<String> {
        let cap = daily_note_cap.max(1);
        let mut start = range.start.date_naive();
        let end = range.end.date_naive();
        if start > end {
            return Vec::new();
        }

        let span_days = (end - start).num_days() as usize + 1;
        if span_days > cap {
            // Clamp to the most recent `cap` days
            start = end - Duration::days(cap as i64 - 1);
        }

        let mut paths = Vec::new();
        let mut day = start;
        while day <= end {
            if let Some(path) = self.resolve_daily_note(day) {
                paths.push(path);
            }
            day += Duration::days(1);
        }
        paths
    }

    fn resolve_daily_note(&self, day: NaiveDate) -> Option<String> {
        let title = day.format(&self.daily.format).to_string();
        let path = self.store.resolve_title(&title)?;
        if !self.daily.folder.is_empty() && !path.starts_with(&self.daily.folder) {
            return None;
        }
        Some(path)
    }

    // ------------------------------------------------------------------
    // Term mode
    // ------------------------------------------------------------------

    fn term_documents(&self, query: &str) -> Vec<FilterMatch> {
        let mut by_path: HashMap<String, FilterMatch> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        // Explicit [[Title]] references win dedup against tag matches
        for title in extract_wikilinks(query) {
            let Some(path) = self.store.resolve_title(&title) else {
                continue;
            };
            if self.meta.is_excluded(&path) || by_path.contains_key(&path) {
                continue;
            }
            match NoteDocument::load(self.store.as_ref(), self.meta.as_ref(), &path) {
                Ok(document) => {
                    by_path.insert(path.clone(), FilterMatch { document, score: 1.0 });
                    order.push(path);
                }
                Err(e) => warn!("filter skipping unreadable {}: {}", path, e),
            }
        }

        let search_tags: Vec<String> = QUERY_TAG_RE
            .captures_iter(query)
            .map(|c| normalize_tag(&c[1]))
            .collect();
        if !search_tags.is_empty() {
            for path in self.store.list_notes() {
                if by_path.contains_key(&path) || self.meta.is_excluded(&path) {
                    continue;
                }
                let note_tags = self.meta.tags(&path);
                let hit = search_tags
                    .iter()
                    .any(|s| note_tags.iter().any(|n| tag_matches(s, n)));
                if !hit {
                    continue;
                }
                match NoteDocument::load(self.store.as_ref(), self.meta.as_ref(), &path) {
                    Ok(document) => {
                        by_path.insert(path.clone(), FilterMatch { document, score: 1.0 });
                        order.push(path);
                    }
                    Err(e) => warn!("filter skipping unreadable {}: {}", path, e),
                }
            }
        }

        order.into_iter().filter_map(|p| by_path.remove(&p)).collect()
    }
}

/// Hierarchical tag matching: a search tag matches itself and anything
/// nested under it with a `/` separator, but never a sibling that merely
/// shares the prefix.
pub fn tag_matches(search_tag: &str, note_tag: &str) -> bool {
    note_tag == search_tag
        || (note_tag.len() > search_tag.len()
            && note_tag.starts_with(search_tag)
            && note_tag.as_bytes()[search_tag.len()] == b'/')
}

/// Recency score: linear decay over 30 days with a floor
fn recency_score(mtime: DateTime<Local>) -> f32 {
    let days = (Local::now() - mtime).num_seconds() as f32 / 86_400.0;
    (1.0 - days / 30.0).clamp(RECENCY_FLOOR, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::FileStat;
    use anyhow::{anyhow, Result};

    struct MemVault {
        notes: Vec<(String, String, Vec<String>, DateTime<Local>, bool)>,
    }

    impl MemVault {
        fn new() -> Self {
            Self { notes: Vec::new() }
        }

        fn add(mut self, path: &str, content: &str, tags: &[&str], age_days: i64) -> Self {
            self.notes.push((
                path.to_string(),
                content.to_string(),
                tags.iter().map(|t| t.to_string()).collect(),
                Local::now() - Duration::days(age_days),
                false,
            ));
            self
        }

        fn add_excluded(mut self, path: &str) -> Self {
            self.notes.push((
                path.to_string(),
                String::new(),
                Vec::new(),
                Local::now(),
                true,
            ));
            self
        }

        fn entry(&self, path: &str) -> Option<&(String, String, Vec<String>, DateTime<Local>, bool)> {
            self.notes.iter().find(|(p, ..)| p == path)
        }
    }

    impl DocumentStore for MemVault {
        fn list_notes(&self) -> Vec<String> {
            self.notes.iter().map(|(p, ..)| p.clone()).collect()
        }

        fn read_text(&self, path: &str) -> Result<String> {
            self.entry(path)
                .map(|(_, c, ..)| c.clone())
                .ok_or_else(|| anyhow!("missing {path}"))
        }

        fn stat(&self, path: &str) -> Result<FileStat> {
            let (_, _, _, mtime, _) = self.entry(path).ok_or_else(|| anyhow!("missing {path}"))?;
            Ok(FileStat {
                mtime: *mtime,
                ctime: *mtime,
                size: 0,
            })
        }

        fn resolve_title(&self, title: &str) -> Option<String> {
            let lower = title.to_lowercase();
            self.notes
                .iter()
                .map(|(p, ..)| p)
                .find(|p| {
                    crate::core::store::note_title(p).to_lowercase() == lower
                })
                .cloned()
        }
    }

    impl MetadataReader for MemVault {
        fn tags(&self, path: &str) -> Vec<String> {
            self.entry(path).map(|(_, _, t, ..)| t.clone()).unwrap_or_default()
        }

        fn is_excluded(&self, path: &str) -> bool {
            self.entry(path).map(|(.., e)| *e).unwrap_or(false)
        }
    }

    fn retriever(vault: MemVault) -> FilterRetriever {
        let vault = Arc::new(vault);
        FilterRetriever::new(vault.clone(), vault, DailyConfig::default())
    }

    #[test]
    fn test_title_reference_matches() {
        let r = retriever(
            MemVault::new()
                .add("Alpha.md", "alpha body", &[], 1)
                .add("Beta.md", "beta body", &[], 1),
        );
        let matches = r.relevant_documents("compare with [[Alpha]]", None, 30, 365);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].document.path, "Alpha.md");
        assert_eq!(matches[0].score, 1.0);
    }

    #[test]
    fn test_tag_hierarchy() {
        let r = retriever(
            MemVault::new()
                .add("exact.md", "", &["project"], 1)
                .add("nested.md", "", &["project/alpha"], 1)
                .add("sibling.md", "", &["projectx"], 1),
        );
        let matches = r.relevant_documents("anything #project", None, 30, 365);
        let paths: Vec<&str> = matches.iter().map(|m| m.document.path.as_str()).collect();
        assert_eq!(paths, vec!["exact.md", "nested.md"]);
    }

    #[test]
    fn test_title_wins_dedup_over_tag() {
        let r = retriever(MemVault::new().add("Alpha.md", "", &["project"], 1));
        let matches = r.relevant_documents("[[Alpha]] #project", None, 30, 365);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_excluded_notes_skipped() {
        let r = retriever(MemVault::new().add_excluded("Secret.md"));
        let matches = r.relevant_documents("[[Secret]]", None, 30, 365);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_time_range_picks_up_daily_and_mtime() {
        let today = Local::now().date_naive();
        let daily_title = today.format("%Y-%m-%d").to_string();
        let r = retriever(
            MemVault::new()
                .add(&format!("{daily_title}.md"), "today's log", &[], 0)
                .add("recent.md", "recently edited", &[], 2)
                .add("ancient.md", "old", &[], 400),
        );
        let range = TimeRange {
            start: Local::now() - Duration::days(7),
            end: Local::now(),
            return_all: false,
        };
        let matches = r.relevant_documents("", Some(&range), 30, 365);
        let paths: Vec<&str> = matches.iter().map(|m| m.document.path.as_str()).collect();
        assert!(paths.contains(&format!("{daily_title}.md").as_str()));
        assert!(paths.contains(&"recent.md"));
        assert!(!paths.contains(&"ancient.md"));
        // Daily note leads with the full score
        assert_eq!(matches[0].document.path, format!("{daily_title}.md"));
    }

    #[test]
    fn test_time_range_cap() {
        let mut vault = MemVault::new();
        for i in 0..50 {
            vault = vault.add(&format!("note{i:03}.md"), "", &[], 1);
        }
        let r = retriever(vault);
        let range = TimeRange {
            start: Local::now() - Duration::days(7),
            end: Local::now(),
            return_all: false,
        };
        let matches = r.relevant_documents("", Some(&range), 10, 365);
        assert_eq!(matches.len(), 10);
    }

    #[test]
    fn test_recency_score_bounds() {
        assert_eq!(recency_score(Local::now() - Duration::days(365)), 0.3);
        let fresh = recency_score(Local::now());
        assert!(fresh > 0.99 && fresh <= 1.0);
    }

    #[test]
    fn test_tag_matches() {
        assert!(tag_matches("project", "project"));
        assert!(tag_matches("project", "project/alpha"));
        assert!(!tag_matches("project", "projectx"));
        assert!(!tag_matches("project/alpha", "project"));
    }
}
