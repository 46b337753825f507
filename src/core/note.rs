//! Note document model
//!
//! `NoteDocument` is the ephemeral unit the retrieval pipeline passes
//! around: constructed per query from the store, never mutated afterwards.

use anyhow::Result;
use chrono::{DateTime, Local};

use super::store::{note_title, DocumentStore, MetadataReader};

#[derive(Debug, Clone)]
pub struct NoteDocument {
    /// Stable identifier, equal to the vault-relative path
    pub id: String,
    pub path: String,
    pub title: String,
    pub content: String,
    pub mtime: DateTime<Local>,
    pub ctime: DateTime<Local>,
    pub tags: Vec<String>,
}

impl NoteDocument {
    /// Load one note through the store traits
    pub fn load(
        store: &dyn DocumentStore,
        meta: &dyn MetadataReader,
        path: &str,
    ) -> Result<Self> {
        let content = store.read_text(path)?;
        let stat = store.stat(path)?;

        Ok(Self {
            id: path.to_string(),
            path: path.to_string(),
            title: note_title(path).to_string(),
            content,
            mtime: stat.mtime,
            ctime: stat.ctime,
            tags: meta.tags(path),
        })
    }

    /// Copy with different content (copy-on-write enrichment; the original
    /// is left untouched)
    pub fn with_content(&self, content: String) -> Self {
        Self {
            content,
            ..self.clone()
        }
    }
}

// ============================================================================
// Ranked references
// ============================================================================

/// Which stage produced a ranking entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Grep,
    Lexical,
    Semantic,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Grep => "grep",
            Engine::Lexical => "lexical",
            Engine::Semantic => "semantic",
        }
    }
}

/// A scored reference to a note, produced by ranking stages and consumed by
/// rank fusion. Not an owning handle; `id` is the note path.
#[derive(Debug, Clone)]
pub struct NoteIdRank {
    pub id: String,
    pub score: f32,
    pub engine: Engine,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_names() {
        assert_eq!(Engine::Grep.as_str(), "grep");
        assert_eq!(Engine::Lexical.as_str(), "lexical");
        assert_eq!(Engine::Semantic.as_str(), "semantic");
    }
}
