//! Ephemeral full-text engine
//!
//! A BM25 index built fresh for each retrieval call from the expanded
//! candidate set and discarded with the call. Living only in RAM keeps the
//! candidate corpus and the index trivially consistent; nothing is ever
//! persisted or shared across queries.

use anyhow::{Context, Result};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexWriter, ReloadPolicy};
use tracing::debug;

use crate::core::note::{Engine, NoteDocument, NoteIdRank};

/// Field boost weights for the ephemeral index
#[derive(Debug, Clone)]
pub struct FulltextConfig {
    pub title_boost: f32,
    pub tags_boost: f32,
}

impl Default for FulltextConfig {
    fn default() -> Self {
        Self {
            title_boost: 3.0,
            tags_boost: 1.5,
        }
    }
}

/// Per-query BM25 index over candidate notes
pub struct EphemeralIndex {
    index: Index,
    title_field: Field,
    tags_field: Field,
    body_field: Field,
    path_field: Field,
    config: FulltextConfig,
}

impl EphemeralIndex {
    /// Build an in-RAM index over the candidate set
    pub fn build(documents: &[NoteDocument]) -> Result<Self> {
        Self::build_with_config(documents, FulltextConfig::default())
    }

    pub fn build_with_config(
        documents: &[NoteDocument],
        config: FulltextConfig,
    ) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let title_field = schema_builder.add_text_field("title", TEXT);
        let tags_field = schema_builder.add_text_field("tags", TEXT);
        let body_field = schema_builder.add_text_field("body", TEXT);
        let path_field = schema_builder.add_text_field("path", STRING | STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let mut writer: IndexWriter = index
            .writer(50_000_000)
            .context("creating ephemeral index writer")?;

        for document in documents {
            writer.add_document(doc!(
                title_field => document.title.as_str(),
                tags_field => document.tags.join(" "),
                body_field => document.content.as_str(),
                path_field => document.path.as_str(),
            ))?;
        }
        writer.commit().context("committing ephemeral index")?;

        Ok(Self {
            index,
            title_field,
            tags_field,
            body_field,
            path_field,
            config,
        })
    }

    /// Search every query variant and keep each note's best score.
    ///
    /// A variant that fails to parse is skipped rather than failing the
    /// batch; user queries routinely contain characters the query grammar
    /// rejects.
    pub fn search(&self, queries: &[String], limit: usize) -> Result<Vec<NoteIdRank>> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("creating ephemeral index reader")?;
        let searcher = reader.searcher();

        let mut query_parser = QueryParser::for_index(
            &self.index,
            vec![self.title_field, self.tags_field, self.body_field],
        );
        query_parser.set_field_boost(self.title_field, self.config.title_boost);
        query_parser.set_field_boost(self.tags_field, self.config.tags_boost);

        let mut best: Vec<NoteIdRank> = Vec::new();
        for query in queries {
            let parsed = match query_parser.parse_query(query) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!("skipping unparseable query variant {:?}: {}", query, e);
                    continue;
                }
            };
            let top_docs = searcher
                .search(&parsed, &TopDocs::with_limit(limit))
                .context("ephemeral index search")?;

            for (score, doc_address) in top_docs {
                let retrieved: tantivy::TantivyDocument = searcher
                    .doc(doc_address)
                    .context("retrieving ephemeral index document")?;
                let Some(path) = retrieved
                    .get_first(self.path_field)
                    .and_then(|v| v.as_str())
                else {
                    continue;
                };
                match best.iter_mut().find(|r| r.id == path) {
                    Some(existing) => existing.score = existing.score.max(score),
                    None => best.push(NoteIdRank {
                        id: path.to_string(),
                        score,
                        engine: Engine::Lexical,
                    }),
                }
            }
        }

        best.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        best.truncate(limit);
        Ok(best)
    }
}
