//! Tiered retriever
//!
//! The orchestrator for one retrieval call: expand the query, scan for
//! candidates, widen along the link graph, rank with an ephemeral
//! full-text index and an optional semantic stage, fuse with weighted RRF,
//! then merge in deterministic filter matches as always-included. Partial
//! stage failures degrade that stage's contribution; if the whole pipeline
//! fails the call still answers with a grep-only result set.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::config::{Config, SearchOptions};
use crate::core::note::{Engine, NoteDocument, NoteIdRank};
use crate::core::store::{DocumentStore, LinkGraph, MetadataReader};
use crate::index::ChunkIndexManager;
use crate::providers::{EmbeddingProvider, LanguageModel};
use crate::search::expansion::{ExpandedQuery, QueryExpander};
use crate::search::filters::{FilterRetriever, TimeRange};
use crate::search::fulltext::EphemeralIndex;
use crate::search::fusion::{fuse_weighted, RankedList};
use crate::search::graph::GraphExpander;
use crate::search::grep::GrepScanner;
use crate::search::rerank::rerank_by_similarity;

/// RRF weight of the grep-order prior relative to the lexical list
const GREP_PRIOR_WEIGHT: f32 = 0.3;
/// RRF weight of the lexical (full-text) list
const LEXICAL_WEIGHT: f32 = 1.0;
/// Widening factor for the single low-recall re-expansion pass
const REEXPAND_FACTOR: usize = 3;

/// One search hit as returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub title: String,
    pub content: String,
    pub path: String,
    pub score: f32,
    /// Stage that won this item: "filter", "lexical", "semantic" or "grep"
    pub source: String,
    pub mtime: DateTime<Local>,
    /// Deterministic matches are always included regardless of ranking
    pub include_in_context: bool,
}

pub struct TieredRetriever {
    store: Arc<dyn DocumentStore>,
    meta: Arc<dyn MetadataReader>,
    expander: QueryExpander,
    scanner: GrepScanner,
    graph: GraphExpander,
    filters: FilterRetriever,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    chunk_index: Option<Arc<ChunkIndexManager>>,
}

impl TieredRetriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        meta: Arc<dyn MetadataReader>,
        graph: Arc<dyn LinkGraph>,
        model: Option<Arc<dyn LanguageModel>>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        chunk_index: Option<Arc<ChunkIndexManager>>,
        config: &Config,
    ) -> Self {
        Self {
            expander: QueryExpander::new(model, &config.expansion),
            scanner: GrepScanner::new(store.clone()),
            graph: GraphExpander::new(graph),
            filters: FilterRetriever::new(store.clone(), meta.clone(), config.daily.clone()),
            store,
            meta,
            embedder,
            chunk_index,
        }
    }

    /// Run the full pipeline for one query.
    ///
    /// Returns at most `max_results` ranked items plus every deterministic
    /// filter match, which is exempt from the cap.
    pub async fn retrieve(
        &self,
        query: &str,
        time_range: Option<&TimeRange>,
        opts: &SearchOptions,
    ) -> Vec<SearchResultItem> {
        self.retrieve_with_terms(query, &[], time_range, opts).await
    }

    /// Like [`retrieve`](Self::retrieve), with additional caller-supplied
    /// salient terms. Hosts that extract terms upstream pass them here;
    /// they join the scoring set alongside the ones derived from the query
    /// text itself.
    pub async fn retrieve_with_terms(
        &self,
        query: &str,
        salient_terms: &[String],
        time_range: Option<&TimeRange>,
        opts: &SearchOptions,
    ) -> Vec<SearchResultItem> {
        let mut expanded = self.expander.expand(query).await;
        for term in salient_terms {
            if !expanded.salient_terms.contains(term) {
                expanded.salient_terms.push(term.clone());
            }
        }
        let expanded = expanded;

        // Guaranteed-include matches resolve independently of ranking
        let filter_matches =
            self.filters
                .relevant_documents(query, time_range, opts.max_results, opts.daily_note_cap);
        let mut results: Vec<SearchResultItem> = filter_matches
            .into_iter()
            .map(|m| item_from_document(m.document, m.score, "filter"))
            .collect();
        let mut included: HashSet<String> = results.iter().map(|r| r.path.clone()).collect();

        if expanded.queries.is_empty() {
            // Blank query: only deterministic matches can answer it
            return results;
        }

        let grep_hits = self
            .scanner
            .scan(&expanded.scan_terms(), opts.candidate_limit)
            .await;

        let fused = match self.ranked_pass(&expanded, &grep_hits, opts).await {
            Ok(fused) => fused,
            Err(e) => {
                warn!("retrieval pipeline failed, degrading to grep-only: {e:#}");
                grep_only(&grep_hits)
            }
        };

        // Fused items fill whatever room the cap leaves; filter matches are
        // exempt and never evicted
        let cap = opts.max_results.max(results.len());
        for (path, score, source) in fused {
            if results.len() >= cap {
                break;
            }
            if !included.insert(path.clone()) {
                continue;
            }
            match NoteDocument::load(self.store.as_ref(), self.meta.as_ref(), &path) {
                Ok(document) => results.push(item_from_document(document, score, source)),
                Err(e) => debug!("dropping unreadable result {}: {}", path, e),
            }
        }

        results
    }

    /// Scan-to-fusion pass, with one progressive re-expansion when the
    /// first pass comes back thin.
    async fn ranked_pass(
        &self,
        expanded: &ExpandedQuery,
        grep_hits: &[String],
        opts: &SearchOptions,
    ) -> Result<Vec<(String, f32, &'static str)>> {
        let fused = self
            .pipeline_pass(expanded, grep_hits, opts, opts.candidate_limit)
            .await?;

        let floor = (opts.max_results / 3).max(3);
        if fused.len() >= floor {
            return Ok(fused);
        }

        // Low recall: rerun once with a wider candidate cap before giving up
        debug!(
            "low recall ({} results), re-expanding with a wider candidate cap",
            fused.len()
        );
        let wider = self
            .scanner
            .scan(
                &expanded.scan_terms(),
                opts.candidate_limit * REEXPAND_FACTOR,
            )
            .await;
        self.pipeline_pass(expanded, &wider, opts, opts.candidate_limit * REEXPAND_FACTOR)
            .await
    }

    async fn pipeline_pass(
        &self,
        expanded: &ExpandedQuery,
        grep_hits: &[String],
        opts: &SearchOptions,
        candidate_limit: usize,
    ) -> Result<Vec<(String, f32, &'static str)>> {
        // Widen along the link graph, then cap before the expensive stages
        let mut candidates = self.graph.expand_candidates(
            grep_hits,
            self.store.active_note().as_deref(),
            opts.graph_hops,
            opts.co_citation_threshold,
        );
        candidates.truncate(candidate_limit);

        let mut documents = Vec::with_capacity(candidates.len());
        for path in &candidates {
            if self.meta.is_excluded(path) {
                continue;
            }
            match NoteDocument::load(self.store.as_ref(), self.meta.as_ref(), path) {
                Ok(document) => documents.push(document),
                Err(e) => debug!("candidate {} unreadable, skipped: {}", path, e),
            }
        }

        // Ephemeral full-text index: built here, dropped with this scope
        let lexical = match EphemeralIndex::build(&documents)
            .and_then(|index| index.search(&expanded.queries, candidate_limit))
        {
            Ok(ranks) => ranks,
            Err(e) => {
                warn!("full-text stage degraded, falling back to grep order: {e:#}");
                grep_ranks(grep_hits)
            }
        };

        let semantic = if opts.enable_semantic {
            self.semantic_ranks(expanded, &candidates, candidate_limit).await
        } else {
            Vec::new()
        };

        let grep_prior = grep_ranks(grep_hits);
        let fused = fuse_weighted(
            &[
                RankedList {
                    name: "lexical",
                    weight: LEXICAL_WEIGHT,
                    ranks: &lexical,
                },
                RankedList {
                    name: "semantic",
                    weight: opts.semantic_weight,
                    ranks: &semantic,
                },
                RankedList {
                    name: "grep",
                    weight: GREP_PRIOR_WEIGHT,
                    ranks: &grep_prior,
                },
            ],
            opts.rrf_k,
        );

        let lexical_ids: HashSet<&String> = lexical.iter().map(|r| &r.id).collect();
        let semantic_ids: HashSet<&String> = semantic.iter().map(|r| &r.id).collect();
        Ok(fused
            .into_iter()
            .map(|(path, score)| {
                let source = if lexical_ids.contains(&path) {
                    Engine::Lexical.as_str()
                } else if semantic_ids.contains(&path) {
                    Engine::Semantic.as_str()
                } else {
                    Engine::Grep.as_str()
                };
                (path, score, source)
            })
            .collect())
    }

    /// Semantic list: the persisted chunk index when one is populated,
    /// otherwise direct snippet embedding of the candidates. Any failure
    /// empties the list instead of failing the query.
    async fn semantic_ranks(
        &self,
        expanded: &ExpandedQuery,
        candidates: &[String],
        limit: usize,
    ) -> Vec<NoteIdRank> {
        let Some(embedder) = &self.embedder else {
            return Vec::new();
        };

        let mut query_embeddings = Vec::new();
        for query in &expanded.queries {
            match embedder.embed_query(query).await {
                Ok(embedding) => query_embeddings.push(embedding),
                Err(e) => debug!("query embedding failed for {:?}: {:#}", query, e),
            }
        }
        if query_embeddings.is_empty() {
            return Vec::new();
        }

        if let Some(chunk_index) = &self.chunk_index {
            if chunk_index.is_populated() {
                match chunk_index.search(&query_embeddings, limit) {
                    Ok(ranks) => return ranks,
                    Err(e) => {
                        warn!("chunk index search degraded to snippet rerank: {e:#}");
                    }
                }
            }
        }

        rerank_by_similarity(
            self.store.as_ref(),
            embedder.as_ref(),
            candidates,
            &query_embeddings,
        )
        .await
    }
}

/// Grep hits as a ranked list: order carries the signal, scores are nominal
fn grep_ranks(grep_hits: &[String]) -> Vec<NoteIdRank> {
    grep_hits
        .iter()
        .enumerate()
        .map(|(i, path)| NoteIdRank {
            id: path.clone(),
            score: 1.0 / (i + 1) as f32,
            engine: Engine::Grep,
        })
        .collect()
}

fn grep_only(grep_hits: &[String]) -> Vec<(String, f32, &'static str)> {
    grep_ranks(grep_hits)
        .into_iter()
        .map(|r| (r.id, r.score, Engine::Grep.as_str()))
        .collect()
}

fn item_from_document(document: NoteDocument, score: f32, source: &str) -> SearchResultItem {
    SearchResultItem {
        title: document.title,
        content: document.content,
        path: document.path,
        score,
        source: source.to_string(),
        mtime: document.mtime,
        include_in_context: true,
    }
}
