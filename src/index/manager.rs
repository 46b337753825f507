//! Chunk index manager
//!
//! Owns the partition layout plus the store and embedding provider handles,
//! and is the only component that mutates the persisted index. Reads are
//! lock-free; writers (full rebuild, incremental patch, clear) serialize on
//! one async mutex so at most one is ever in flight per index.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::config::IndexConfig;
use crate::core::note::{Engine, NoteDocument, NoteIdRank};
use crate::core::store::{DocumentStore, MetadataReader};
use crate::index::chunks::{chunk_id, chunk_note, ChunkRecord};
use crate::index::partitions::{PartitionLayout, PartitionWriter};
use crate::index::IndexError;
use crate::providers::EmbeddingProvider;
use crate::search::rerank::cosine_similarity;

/// Notes processed between cooperative yield points during a rebuild
const YIELD_EVERY: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub records: usize,
    pub notes: usize,
    pub partitions: usize,
    pub failed: usize,
}

pub struct ChunkIndexManager {
    store: Arc<dyn DocumentStore>,
    meta: Arc<dyn MetadataReader>,
    embedder: Arc<dyn EmbeddingProvider>,
    layout: PartitionLayout,
    chunk_bytes: usize,
    write_lock: Mutex<()>,
}

impl ChunkIndexManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        meta: Arc<dyn MetadataReader>,
        embedder: Arc<dyn EmbeddingProvider>,
        index_dir: PathBuf,
        config: &IndexConfig,
    ) -> Result<Self, IndexError> {
        let layout = PartitionLayout::new(index_dir, &config.base_name, config.partition_cap_bytes)?;
        Ok(Self {
            store,
            meta,
            embedder,
            layout,
            chunk_bytes: config.chunk_bytes.max(1),
            write_lock: Mutex::new(()),
        })
    }

    /// Rebuild the whole index, streaming records to disk note by note.
    ///
    /// A note that cannot be read or embedded is counted and skipped, never
    /// fatal. The resulting partition set replaces whatever was on disk.
    pub async fn rebuild(&self) -> Result<IndexStats> {
        let _guard = self.write_lock.lock().await;

        let mut stats = IndexStats::default();
        let mut writer = PartitionWriter::create(&self.layout)?;

        for (i, path) in self.store.list_notes().into_iter().enumerate() {
            if i % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
            if self.meta.is_excluded(&path) {
                continue;
            }
            match self.note_records(&path).await {
                Ok(records) => {
                    stats.notes += 1;
                    for record in &records {
                        writer.push(record)?;
                        stats.records += 1;
                    }
                }
                Err(e) => {
                    warn!("index skipping {}: {:#}", path, e);
                    stats.failed += 1;
                }
            }
        }

        stats.partitions = writer.finish()?;
        info!(
            "chunk index rebuilt: {} records over {} partitions ({} notes, {} failed)",
            stats.records, stats.partitions, stats.notes, stats.failed
        );
        Ok(stats)
    }

    /// Patch the records of one note after a modify event.
    ///
    /// Only partitions containing the note's records are rewritten; the
    /// rest of the index is untouched on disk.
    pub async fn update_file(&self, path: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let records = match self.note_records(path).await {
            Ok(records) => records,
            Err(e) => {
                // A vanished note degrades to a removal
                debug!("treating {} as removed: {:#}", path, e);
                Vec::new()
            }
        };
        self.layout.replace_path_records(path, &records)
    }

    /// Drop one note's records after a delete event
    pub async fn remove_file(&self, path: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.layout.replace_path_records(path, &[])
    }

    /// Remove all partitions
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.layout.clear()
    }

    /// All persisted records, legacy file included
    pub fn read_records(&self) -> Result<Vec<ChunkRecord>> {
        self.layout.read_records()
    }

    /// Note-level semantic search: stream every record, score each chunk
    /// by its best cosine against the query variants, keep each note's
    /// best chunk, return the top `limit` notes.
    ///
    /// A missing index is an empty result set, not an error.
    pub fn search(&self, query_embeddings: &[Vec<f32>], limit: usize) -> Result<Vec<NoteIdRank>> {
        if query_embeddings.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut best: std::collections::HashMap<String, f32> = std::collections::HashMap::new();
        self.layout.for_each_line(|line| {
            let record: ChunkRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!("search skipping malformed index line: {}", e);
                    return Ok(());
                }
            };
            let score = query_embeddings
                .iter()
                .map(|q| cosine_similarity(&record.embedding, q))
                .fold(0.0, f32::max);
            let entry = best.entry(record.path).or_insert(0.0);
            if score > *entry {
                *entry = score;
            }
            Ok(())
        })?;

        let mut ranks: Vec<NoteIdRank> = best
            .into_iter()
            .map(|(id, score)| NoteIdRank {
                id,
                score,
                engine: Engine::Semantic,
            })
            .collect();
        ranks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranks.truncate(limit);
        Ok(ranks)
    }

    /// Record and partition counts as currently persisted
    pub fn status(&self) -> Result<IndexStats> {
        let mut stats = IndexStats {
            partitions: self.layout.discover().len(),
            ..Default::default()
        };
        let mut paths = std::collections::HashSet::new();
        self.layout.for_each_line(|line| {
            stats.records += 1;
            if let Ok(probe) = serde_json::from_str::<ChunkRecord>(line) {
                paths.insert(probe.path);
            }
            Ok(())
        })?;
        stats.notes = paths.len();
        Ok(stats)
    }

    /// Whether any records are persisted
    pub fn is_populated(&self) -> bool {
        !self.layout.discover().is_empty()
    }

    async fn note_records(&self, path: &str) -> Result<Vec<ChunkRecord>> {
        let document = NoteDocument::load(self.store.as_ref(), self.meta.as_ref(), path)?;
        let chunks = chunk_note(&document.content, self.chunk_bytes);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .embedder
            .embed_documents(&chunks)
            .await
            .with_context(|| format!("embedding {} chunks of {}", chunks.len(), path))?;

        Ok(embeddings
            .into_iter()
            .enumerate()
            .map(|(seq, embedding)| ChunkRecord {
                id: chunk_id(path, seq),
                path: document.path.clone(),
                title: document.title.clone(),
                mtime: document.mtime.timestamp_millis(),
                ctime: document.ctime.timestamp_millis(),
                embedding,
            })
            .collect())
    }
}
