//! Wikilink extraction
//!
//! Pulls `[[Target]]` style links out of note content. Aliases
//! (`[[Target|shown]]`) and heading anchors (`[[Target#Section]]`) resolve
//! to the bare target. Embeds (`![[image.png]]`) are ignored.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WIKILINK_RE: Regex = Regex::new(r"(!?)\[\[([^\[\]]+)\]\]").unwrap();
}

/// Extract wikilink targets in order of first appearance, deduplicated.
pub fn extract_wikilinks(content: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for captures in WIKILINK_RE.captures_iter(content) {
        if &captures[1] == "!" {
            continue;
        }
        let inner = &captures[2];
        // Strip alias and heading anchor
        let target = inner.split('|').next().unwrap_or(inner);
        let target = target.split('#').next().unwrap_or(target).trim();
        if target.is_empty() {
            continue;
        }
        if seen.insert(target.to_lowercase()) {
            links.push(target.to_string());
        }
    }

    links
}
