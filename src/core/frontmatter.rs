//! Frontmatter parsing
//!
//! Parses the YAML block fenced by `---` at the top of a note and exposes
//! the handful of fields retrieval cares about: tags and the exclusion flag.
//! Inline `#tags` in the note body are extracted separately.

use lazy_static::lazy_static;
use regex::Regex;
use serde_yaml::Value;

lazy_static! {
    static ref FRONTMATTER_RE: Regex = Regex::new(r"(?s)^---\r?\n(.*?)\r?\n---").unwrap();
    // Inline tag: hash followed by a word, optionally nested with '/'
    static ref INLINE_TAG_RE: Regex =
        Regex::new(r"(^|\s)#([A-Za-z0-9_][A-Za-z0-9_/-]*)").unwrap();
}

/// Frontmatter key marking a note as hidden from retrieval
pub const EXCLUDE_KEY: &str = "loam_exclude";

#[derive(Debug, Default, Clone)]
pub struct Frontmatter {
    mapping: serde_yaml::Mapping,
}

impl Frontmatter {
    /// Parse frontmatter from note content. Returns None when there is no
    /// fence or the YAML does not parse as a mapping.
    pub fn parse(content: &str) -> Option<Self> {
        let captures = FRONTMATTER_RE.captures(content)?;
        let yaml = captures.get(1)?.as_str();

        match serde_yaml::from_str::<Value>(yaml) {
            Ok(Value::Mapping(mapping)) => Some(Self { mapping }),
            _ => None,
        }
    }

    /// Tags from the `tags` field, normalized to lowercase without a leading
    /// hash. Accepts both a YAML list and a comma-separated string.
    pub fn tags(&self) -> Vec<String> {
        let Some(value) = self.get("tags") else {
            return Vec::new();
        };

        let raw: Vec<String> = match value {
            Value::Sequence(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Value::String(s) => s.split(',').map(|t| t.trim().to_string()).collect(),
            _ => Vec::new(),
        };

        raw.iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Whether the note opted out of retrieval
    pub fn excluded(&self) -> bool {
        self.get(EXCLUDE_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Raw field access for callers that need more than tags
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.mapping
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }
}

/// Strip a leading hash and lowercase
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

/// Extract inline `#tags` from note body text, normalized, in order of first
/// appearance.
pub fn extract_inline_tags(content: &str) -> Vec<String> {
    // Skip the frontmatter fence so YAML comments are not misread as tags
    let body = strip_frontmatter(content);

    let mut seen = std::collections::HashSet::new();
    let mut tags = Vec::new();
    for captures in INLINE_TAG_RE.captures_iter(body) {
        let tag = captures[2].to_lowercase();
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    tags
}

/// Note content with the frontmatter fence removed
pub fn strip_frontmatter(content: &str) -> &str {
    match FRONTMATTER_RE.find(content) {
        Some(m) => content[m.end()..].trim_start_matches(['\r', '\n']),
        None => content,
    }
}
