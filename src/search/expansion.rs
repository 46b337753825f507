//! Query expansion
//!
//! Turns one query into several phrasings plus two term sets with different
//! trust levels: salient terms come strictly from the user's own words and
//! feed scoring; expanded terms come from the model and only broaden recall.
//! Model failures of any kind degrade silently to local term extraction.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::core::config::ExpansionConfig;
use crate::providers::{cancel_pair, LanguageModel};

lazy_static! {
    static ref QUERY_TAG_RE: Regex = Regex::new(r"#([A-Za-z0-9_-]+)").unwrap();
    static ref TAGGED_BLOCK_RE: Regex =
        Regex::new(r"(?s)<(queries|terms)>\s*(.*?)\s*</(queries|terms)>").unwrap();
}

/// Where an expansion came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionOrigin {
    /// Model produced usable variants
    Model,
    /// Local term extraction only (empty query, no model, timeout, error,
    /// or unparseable output)
    Local,
}

/// The result of expanding one query
#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    pub original_query: String,
    /// The original query first, then up to `max_variants` alternatives
    pub queries: Vec<String>,
    /// Scoring terms, drawn only from the original query text
    pub salient_terms: Vec<String>,
    /// Model-suggested terms, recall-only, never used for scoring
    pub expanded_terms: Vec<String>,
    pub origin: ExpansionOrigin,
}

impl ExpandedQuery {
    fn empty(query: &str) -> Self {
        Self {
            original_query: query.to_string(),
            queries: Vec::new(),
            salient_terms: Vec::new(),
            expanded_terms: Vec::new(),
            origin: ExpansionOrigin::Local,
        }
    }

    /// Every query phrasing plus every term, for recall-oriented scanning
    pub fn scan_terms(&self) -> Vec<String> {
        let mut terms = self.salient_terms.clone();
        for term in &self.expanded_terms {
            if !terms.contains(term) {
                terms.push(term.clone());
            }
        }
        terms
    }
}

// ============================================================================
// LRU cache
// ============================================================================

/// Small strict-LRU map keyed by exact query string. Self-contained; the
/// capacity is tens of entries, so linear scans are fine.
struct LruCache {
    entries: VecDeque<(String, ExpandedQuery)>,
    capacity: usize,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Get and promote to most-recently-used
    fn get(&mut self, key: &str) -> Option<ExpandedQuery> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(pos).unwrap();
        let value = entry.1.clone();
        self.entries.push_back(entry);
        Some(value)
    }

    /// Insert at most-recently-used, evicting the oldest entry at capacity
    fn put(&mut self, key: String, value: ExpandedQuery) {
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(pos);
        } else if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((key, value));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Expander
// ============================================================================

pub struct QueryExpander {
    model: Option<Arc<dyn LanguageModel>>,
    cache: Mutex<LruCache>,
    max_variants: usize,
    timeout: Duration,
}

impl QueryExpander {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, config: &ExpansionConfig) -> Self {
        Self {
            model,
            cache: Mutex::new(LruCache::new(config.cache_capacity)),
            max_variants: config.max_variants,
            timeout: Duration::from_millis(config.model_timeout_ms),
        }
    }

    /// Expand a query. Infallible: every failure mode falls back to local
    /// term extraction, callers never see an error.
    pub async fn expand(&self, query: &str) -> ExpandedQuery {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            // No cache entry and no model call for blank input
            return ExpandedQuery::empty(query);
        }

        if let Some(hit) = self.cache.lock().unwrap().get(trimmed) {
            return hit;
        }

        let expanded = match &self.model {
            Some(model) => self.expand_with_model(model.as_ref(), trimmed).await,
            None => None,
        };
        let expanded = expanded.unwrap_or_else(|| local_expansion(trimmed));

        self.cache
            .lock()
            .unwrap()
            .put(trimmed.to_string(), expanded.clone());
        expanded
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    async fn expand_with_model(
        &self,
        model: &dyn LanguageModel,
        query: &str,
    ) -> Option<ExpandedQuery> {
        let prompt = build_prompt(query);
        let (source, token) = cancel_pair();

        let text = match tokio::time::timeout(self.timeout, model.invoke(&prompt, token)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                debug!("expansion model error, using local terms: {e:#}");
                return None;
            }
            Err(_) => {
                // Thread the abort through to the provider
                source.cancel();
                debug!("expansion model timed out after {:?}", self.timeout);
                return None;
            }
        };

        let (variants, terms) = parse_model_output(&text)?;

        let mut queries = vec![query.to_string()];
        for variant in variants {
            if queries.len() > self.max_variants {
                break;
            }
            if !queries.iter().any(|q| q.eq_ignore_ascii_case(&variant)) {
                queries.push(variant);
            }
        }

        let salient_terms = extract_terms(query);
        let mut expanded_terms = Vec::new();
        for term in terms {
            let term = term.trim().to_string();
            if !is_valid_term(&term) {
                continue;
            }
            if salient_terms.iter().any(|t| t.eq_ignore_ascii_case(&term)) {
                continue;
            }
            if !expanded_terms
                .iter()
                .any(|t: &String| t.eq_ignore_ascii_case(&term))
            {
                expanded_terms.push(term);
            }
        }

        Some(ExpandedQuery {
            original_query: query.to_string(),
            queries,
            salient_terms,
            expanded_terms,
            origin: ExpansionOrigin::Model,
        })
    }
}

/// Expansion without a model: the original phrasing plus terms extracted
/// from it.
fn local_expansion(query: &str) -> ExpandedQuery {
    ExpandedQuery {
        original_query: query.to_string(),
        queries: vec![query.to_string()],
        salient_terms: extract_terms(query),
        expanded_terms: Vec::new(),
        origin: ExpansionOrigin::Local,
    }
}

fn build_prompt(query: &str) -> String {
    format!(
        "Rewrite the search query below as up to 3 alternative phrasings and \
         suggest related terms that could appear in matching notes.\n\
         Respond in exactly this format:\n\
         <queries>\none phrasing per line\n</queries>\n\
         <terms>\ncomma, separated, terms\n</terms>\n\n\
         Query: {query}"
    )
}

// ============================================================================
// Model output parsing
// ============================================================================

/// Parse the tagged format, then the legacy line-oriented format. Returns
/// None when neither yields any content.
fn parse_model_output(text: &str) -> Option<(Vec<String>, Vec<String>)> {
    let tagged = parse_tagged(text);
    let (queries, terms) = if tagged.0.is_empty() && tagged.1.is_empty() {
        parse_legacy(text)
    } else {
        tagged
    };

    if queries.is_empty() && terms.is_empty() {
        None
    } else {
        Some((queries, terms))
    }
}

/// Primary format: `<queries>` block with one phrasing per line, `<terms>`
/// block with comma or newline separated terms.
fn parse_tagged(text: &str) -> (Vec<String>, Vec<String>) {
    let mut queries = Vec::new();
    let mut terms = Vec::new();

    for captures in TAGGED_BLOCK_RE.captures_iter(text) {
        let body = captures[2].trim();
        match &captures[1] {
            "queries" => queries.extend(clean_lines(body)),
            "terms" => terms.extend(split_terms(body)),
            _ => {}
        }
    }

    (queries, terms)
}

/// Legacy format: a `Queries:` section and a `Terms:` section with one item
/// per line.
fn parse_legacy(text: &str) -> (Vec<String>, Vec<String>) {
    #[derive(PartialEq)]
    enum Section {
        None,
        Queries,
        Terms,
    }

    let mut section = Section::None;
    let mut queries = Vec::new();
    let mut terms = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();
        if lower.starts_with("queries:") || lower.starts_with("alternative queries:") {
            section = Section::Queries;
            continue;
        }
        if lower.starts_with("terms:") || lower.starts_with("related terms:") {
            section = Section::Terms;
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        match section {
            Section::Queries => {
                if let Some(item) = clean_item(trimmed) {
                    queries.push(item);
                }
            }
            Section::Terms => terms.extend(split_terms(trimmed)),
            Section::None => {}
        }
    }

    (queries, terms)
}

fn clean_lines(body: &str) -> Vec<String> {
    body.lines().filter_map(clean_item).collect()
}

/// Strip list markers and numbering from one line
fn clean_item(line: &str) -> Option<String> {
    let mut item = line.trim();
    item = item.trim_start_matches(['-', '*', '•']).trim_start();
    if let Some(rest) = item.split_once('.').and_then(|(n, rest)| {
        n.chars().all(|c| c.is_ascii_digit()).then_some(rest)
    }) {
        item = rest.trim_start();
    }
    let item = item.trim_matches('"').trim();
    (!item.is_empty()).then(|| item.to_string())
}

fn split_terms(body: &str) -> Vec<String> {
    body.split([',', '\n'])
        .filter_map(clean_item)
        .collect()
}

// ============================================================================
// Local term extraction
// ============================================================================

/// Extract salient terms from raw query text.
///
/// Tags are taken verbatim with the hash preserved; the remaining text is
/// split on whitespace and punctuation, with hyphenated compounds kept both
/// whole and split. A tag-only occurrence does not add its bare word.
pub fn extract_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut push = |term: &str, terms: &mut Vec<String>| {
        if is_valid_term(term) && !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    };

    // Tags first, verbatim
    for captures in QUERY_TAG_RE.captures_iter(query) {
        push(&format!("#{}", &captures[1]), &mut terms);
    }

    // Blank out tag occurrences so they do not leak into the bare-word set
    let without_tags = QUERY_TAG_RE.replace_all(query, " ");

    for word in without_tags.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-')) {
        let word = word.trim_matches('-');
        if word.is_empty() {
            continue;
        }
        push(word, &mut terms);
        if word.contains('-') {
            for part in word.split('-') {
                push(part, &mut terms);
            }
        }
    }

    terms
}

/// A term is two or more characters of alphanumerics, underscores or
/// hyphens; a tag is the same shape behind a hash.
pub fn is_valid_term(term: &str) -> bool {
    let body = term.strip_prefix('#').unwrap_or(term);
    body.chars().count() >= 2
        && !body.is_empty()
        && body
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{BoxFuture, CancelToken};
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeModel {
        response: String,
        calls: AtomicUsize,
    }

    impl FakeModel {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl LanguageModel for FakeModel {
        fn invoke<'a>(
            &'a self,
            _prompt: &'a str,
            _cancel: CancelToken,
        ) -> BoxFuture<'a, Result<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(self.response.clone()) })
        }
    }

    struct StallingModel;

    impl LanguageModel for StallingModel {
        fn invoke<'a>(
            &'a self,
            _prompt: &'a str,
            mut cancel: CancelToken,
        ) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move {
                cancel.cancelled().await;
                anyhow::bail!("cancelled")
            })
        }
    }

    fn config(max_variants: usize, cache_capacity: usize) -> ExpansionConfig {
        ExpansionConfig {
            max_variants,
            cache_capacity,
            model_timeout_ms: 50,
        }
    }

    const TAGGED: &str = "<queries>\nrust async runtime\ntokio scheduler internals\n</queries>\n<terms>\nruntime, scheduler, executor\n</terms>";

    #[tokio::test]
    async fn test_empty_query_short_circuits() {
        let expander = QueryExpander::new(None, &config(3, 8));
        let result = expander.expand("   ").await;
        assert!(result.queries.is_empty());
        assert!(result.salient_terms.is_empty());
        assert_eq!(expander.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_model_expansion() {
        let model = Arc::new(FakeModel::new(TAGGED));
        let expander = QueryExpander::new(Some(model.clone()), &config(3, 8));
        let result = expander.expand("tokio runtime").await;

        assert_eq!(result.origin, ExpansionOrigin::Model);
        assert_eq!(result.queries[0], "tokio runtime");
        assert_eq!(result.queries.len(), 3);
        assert_eq!(result.salient_terms, vec!["tokio", "runtime"]);
        // "runtime" is salient, so only the genuinely new terms survive
        assert_eq!(result.expanded_terms, vec!["scheduler", "executor"]);
    }

    #[tokio::test]
    async fn test_salient_never_from_model() {
        let model = Arc::new(FakeModel::new(TAGGED));
        let expander = QueryExpander::new(Some(model), &config(3, 8));
        let result = expander.expand("borrow checker").await;
        for term in &result.salient_terms {
            assert!(
                "borrow checker".contains(term.trim_start_matches('#')),
                "salient term {term:?} not in original query"
            );
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_model() {
        let model = Arc::new(FakeModel::new(TAGGED));
        let expander = QueryExpander::new(Some(model.clone()), &config(3, 8));
        expander.expand("tokio runtime").await;
        expander.expand("tokio runtime").await;
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_is_strict() {
        let expander = QueryExpander::new(None, &config(3, 2));
        expander.expand("one one").await;
        expander.expand("two two").await;
        // Touch "one" so "two" becomes the eviction candidate
        expander.expand("one one").await;
        expander.expand("three three").await;
        assert_eq!(expander.cache_len(), 2);

        let mut cache = expander.cache.lock().unwrap();
        assert!(cache.get("one one").is_some());
        assert!(cache.get("two two").is_none());
        assert!(cache.get("three three").is_some());
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_local() {
        let expander = QueryExpander::new(Some(Arc::new(StallingModel)), &config(3, 8));
        let result = expander.expand("memory safety").await;
        assert_eq!(result.origin, ExpansionOrigin::Local);
        assert_eq!(result.queries, vec!["memory safety"]);
        assert_eq!(result.salient_terms, vec!["memory", "safety"]);
    }

    #[tokio::test]
    async fn test_unparseable_output_falls_back() {
        let model = Arc::new(FakeModel::new("I cannot help with that."));
        let expander = QueryExpander::new(Some(model), &config(3, 8));
        let result = expander.expand("lifetimes").await;
        assert_eq!(result.origin, ExpansionOrigin::Local);
    }

    #[test]
    fn test_parse_legacy_format() {
        let text = "Queries:\n- first phrasing\n2. second phrasing\nTerms:\nalpha, beta\ngamma";
        let (queries, terms) = parse_legacy(text);
        assert_eq!(queries, vec!["first phrasing", "second phrasing"]);
        assert_eq!(terms, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_extract_terms_tags_and_words() {
        let terms = extract_terms("find #project notes about project planning");
        assert_eq!(terms, vec!["#project", "find", "notes", "about", "project", "planning"]);
    }

    #[test]
    fn test_tag_only_does_not_add_bare_word() {
        let terms = extract_terms("#rust news");
        assert_eq!(terms, vec!["#rust", "news"]);
    }

    #[test]
    fn test_hyphenated_kept_whole_and_split() {
        let terms = extract_terms("copy-on-write semantics");
        assert!(terms.contains(&"copy-on-write".to_string()));
        assert!(terms.contains(&"copy".to_string()));
        assert!(terms.contains(&"write".to_string()));
        // "on" is below the length floor
        assert!(!terms.contains(&"on".to_string()));
        assert!(terms.contains(&"semantics".to_string()));
    }

    #[test]
    fn test_term_validation() {
        assert!(is_valid_term("ok"));
        assert!(is_valid_term("#tag"));
        assert!(is_valid_term("snake_case"));
        assert!(!is_valid_term("a"));
        assert!(!is_valid_term("#a"));
        assert!(!is_valid_term("no!bang"));
    }

    #[test]
    fn test_variant_cap() {
        let many = "<queries>\nq1\nq2\nq3\nq4\nq5\n</queries>";
        let (queries, _) = parse_tagged(many);
        assert_eq!(queries.len(), 5);
        // The cap is applied by the expander, not the parser
    }

    #[tokio::test]
    async fn test_variants_capped_by_expander() {
        let many = "<queries>\nq one\nq two\nq three\nq four\nq five\n</queries>\n<terms>\nzeta\n</terms>";
        let expander = QueryExpander::new(Some(Arc::new(FakeModel::new(many))), &config(2, 8));
        let result = expander.expand("base query").await;
        // original + at most 2 variants
        assert_eq!(result.queries.len(), 3);
    }
}
