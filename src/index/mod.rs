//! Persistent chunk-embedding index
//!
//! Durable, partitioned, append-friendly storage for per-chunk embeddings.
//! Partitions are JSON-Lines files `<base>-NNN.jsonl` capped at a byte
//! budget; a legacy un-partitioned `<base>.jsonl` is still read but never
//! written. Supports full rebuild and single-file incremental update
//! without ever holding the whole index in memory.

pub mod chunks;
pub mod manager;
pub mod partitions;

pub use chunks::{chunk_note, ChunkRecord};
pub use manager::{ChunkIndexManager, IndexStats};
pub use partitions::PartitionLayout;

use thiserror::Error;

/// Boundary validation errors for index construction
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index base name must be a bare file stem, got {0:?}")]
    InvalidBaseName(String),

    #[error("partition byte cap must be positive")]
    ZeroPartitionCap,
}
