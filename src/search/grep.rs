//! Grep scanner
//!
//! Fast substring pre-filter producing the initial candidate set. Two
//! passes: paths first (no content I/O), then file contents in bounded
//! batches until the limit fills. Content scanning yields control
//! periodically so a large vault cannot starve the host runtime.

use std::sync::Arc;

use tracing::debug;

use crate::core::store::DocumentStore;

/// Files scanned between cooperative yield points
const YIELD_EVERY: usize = 100;

pub struct GrepScanner {
    store: Arc<dyn DocumentStore>,
}

impl GrepScanner {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Scan for substring matches against every grep-worthy term.
    ///
    /// Returns path matches first (descending by number of matching terms),
    /// then content matches, truncated to `limit`.
    pub async fn scan(&self, terms: &[String], limit: usize) -> Vec<String> {
        let needles: Vec<String> = terms
            .iter()
            .filter(|t| is_grep_worthy(t))
            .map(|t| t.trim_start_matches('#').to_lowercase())
            .collect();
        if needles.is_empty() || limit == 0 {
            return Vec::new();
        }

        let notes = self.store.list_notes();

        // Pass 1: path and filename matches, no content I/O
        let mut path_hits: Vec<(String, usize)> = Vec::new();
        for path in &notes {
            let haystack = path.to_lowercase();
            let matches = needles.iter().filter(|n| haystack.contains(n.as_str())).count();
            if matches > 0 {
                path_hits.push((path.clone(), matches));
            }
        }
        // Multi-term path matches surface first; ties stay in path order
        path_hits.sort_by(|a, b| b.1.cmp(&a.1));

        let mut results: Vec<String> = path_hits
            .into_iter()
            .map(|(path, _)| path)
            .take(limit)
            .collect();
        if results.len() >= limit {
            return results;
        }

        // Pass 2: content matches fill the remaining slots
        let already: std::collections::HashSet<&String> = results.iter().collect();
        let mut content_hits = Vec::new();
        for (i, path) in notes.iter().enumerate() {
            if results.len() + content_hits.len() >= limit {
                break;
            }
            if already.contains(path) {
                continue;
            }
            if i % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
            let content = match self.store.read_text(path) {
                Ok(c) => c,
                Err(e) => {
                    debug!("grep skipping unreadable {}: {}", path, e);
                    continue;
                }
            };
            let haystack = content.to_lowercase();
            // First hit wins, no need to count
            if needles.iter().any(|n| haystack.contains(n.as_str())) {
                content_hits.push(path.clone());
            }
        }

        results.extend(content_hits);
        results.truncate(limit);
        results
    }
}

/// Whether a term is selective enough to grep for. ASCII terms need three
/// or more characters; CJK terms carry more meaning per character, so two
/// suffice.
pub fn is_grep_worthy(term: &str) -> bool {
    let body = term.trim_start_matches('#');
    let chars = body.chars().count();
    if chars == 0 {
        return false;
    }
    if body.chars().any(is_cjk) {
        chars >= 2
    } else {
        chars >= 3
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'    // CJK unified ideographs
        | '\u{3400}'..='\u{4DBF}'  // CJK extension A
        | '\u{3040}'..='\u{30FF}'  // hiragana and katakana
        | '\u{AC00}'..='\u{D7AF}'  // hangul syllables
    )
}
