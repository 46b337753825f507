//! Semantic reranker
//!
//! Scores candidates by embedding a bounded snippet of each note and taking
//! the best cosine similarity against any query-variant embedding: a
//! candidate only needs to match one phrasing well. Failures never abort
//! the batch; a candidate that cannot be read or embedded scores 0.

use tracing::{debug, warn};

use crate::core::note::{Engine, NoteIdRank};
use crate::core::store::DocumentStore;
use crate::providers::EmbeddingProvider;

/// Content prefix handed to the embedding provider
pub const SNIPPET_CHARS: usize = 2000;

/// Rerank candidate notes by embedding similarity to the query variants.
///
/// Returns one entry per candidate, best first.
pub async fn rerank_by_similarity(
    store: &dyn DocumentStore,
    embedder: &dyn EmbeddingProvider,
    candidates: &[String],
    query_embeddings: &[Vec<f32>],
) -> Vec<NoteIdRank> {
    if candidates.is_empty() || query_embeddings.is_empty() {
        return Vec::new();
    }

    // Gather snippets; unreadable candidates keep their slot with score 0
    let mut snippets: Vec<Option<String>> = Vec::with_capacity(candidates.len());
    for path in candidates {
        match store.read_text(path) {
            Ok(content) => snippets.push(Some(snippet(&content, SNIPPET_CHARS))),
            Err(e) => {
                debug!("rerank could not read {}: {}", path, e);
                snippets.push(None);
            }
        }
    }

    // One scatter/gather batch for every readable snippet
    let texts: Vec<String> = snippets.iter().flatten().cloned().collect();
    let embeddings = if texts.is_empty() {
        Vec::new()
    } else {
        match embedder.embed_documents(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                warn!("rerank embedding batch failed, scoring candidates 0: {e:#}");
                Vec::new()
            }
        }
    };

    let mut embedded = embeddings.into_iter();
    let mut ranks: Vec<NoteIdRank> = candidates
        .iter()
        .zip(&snippets)
        .map(|(path, snippet)| {
            let score = match snippet {
                Some(_) => embedded
                    .next()
                    .map(|embedding| max_similarity(&embedding, query_embeddings))
                    .unwrap_or(0.0),
                None => 0.0,
            };
            NoteIdRank {
                id: path.clone(),
                score,
                engine: Engine::Semantic,
            }
        })
        .collect();

    ranks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranks
}

/// Best cosine similarity against any query variant
fn max_similarity(embedding: &[f32], query_embeddings: &[Vec<f32>]) -> f32 {
    query_embeddings
        .iter()
        .map(|q| cosine_similarity(embedding, q))
        .fold(0.0, f32::max)
}

/// Cosine similarity, defined as 0 for zero vectors and mismatched lengths
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Bounded character prefix on a char boundary
fn snippet(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::FileStat;
    use crate::providers::BoxFuture;
    use anyhow::{anyhow, bail, Result};
    use std::collections::HashMap;

    struct MemStore(HashMap<String, String>);

    impl DocumentStore for MemStore {
        fn list_notes(&self) -> Vec<String> {
            self.0.keys().cloned().collect()
        }

        fn read_text(&self, path: &str) -> Result<String> {
            self.0.get(path).cloned().ok_or_else(|| anyhow!("missing {path}"))
        }

        fn stat(&self, _path: &str) -> Result<FileStat> {
            unimplemented!()
        }

        fn resolve_title(&self, _title: &str) -> Option<String> {
            None
        }
    }

    /// Embeds "x"-heavy text along axis 0 and everything else along axis 1
    struct AxisEmbedder {
        fail: bool,
    }

    impl EmbeddingProvider for AxisEmbedder {
        fn embed_query<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
            let v = axis_embed(text);
            Box::pin(async move { Ok(v) })
        }

        fn embed_documents<'a>(
            &'a self,
            texts: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
            Box::pin(async move {
                if self.fail {
                    bail!("embedding backend down");
                }
                Ok(texts.iter().map(|t| axis_embed(t)).collect())
            })
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn axis_embed(text: &str) -> Vec<f32> {
        if text.contains('x') {
            vec![1.0, 0.0]
        } else {
            vec![0.0, 1.0]
        }
    }

    fn store() -> MemStore {
        let mut files = HashMap::new();
        files.insert("xnote.md".to_string(), "x x x".to_string());
        files.insert("other.md".to_string(), "plain prose".to_string());
        MemStore(files)
    }

    #[tokio::test]
    async fn test_best_variant_wins() {
        let embedder = AxisEmbedder { fail: false };
        let candidates = vec!["xnote.md".to_string(), "other.md".to_string()];
        // Two variants along different axes; each candidate matches one
        let query_embeddings = vec![vec![1.0, 0.0]];
        let ranks =
            rerank_by_similarity(&store(), &embedder, &candidates, &query_embeddings).await;
        assert_eq!(ranks[0].id, "xnote.md");
        assert!(ranks[0].score > 0.99);
        assert!(ranks[1].score < 0.01);
    }

    #[tokio::test]
    async fn test_unreadable_candidate_scores_zero() {
        let embedder = AxisEmbedder { fail: false };
        let candidates = vec!["missing.md".to_string(), "xnote.md".to_string()];
        let query_embeddings = vec![vec![1.0, 0.0]];
        let ranks =
            rerank_by_similarity(&store(), &embedder, &candidates, &query_embeddings).await;
        assert_eq!(ranks.len(), 2);
        let missing = ranks.iter().find(|r| r.id == "missing.md").unwrap();
        assert_eq!(missing.score, 0.0);
        // The readable candidate still gets its real embedding
        assert!(ranks.iter().find(|r| r.id == "xnote.md").unwrap().score > 0.99);
    }

    #[tokio::test]
    async fn test_embedding_failure_scores_all_zero() {
        let embedder = AxisEmbedder { fail: true };
        let candidates = vec!["xnote.md".to_string()];
        let ranks =
            rerank_by_similarity(&store(), &embedder, &candidates, &[vec![1.0, 0.0]]).await;
        assert_eq!(ranks.len(), 1);
        assert_eq!(ranks[0].score, 0.0);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_snippet_bound() {
        let long = "é".repeat(5000);
        assert_eq!(snippet(&long, 2000).chars().count(), 2000);
    }
}
