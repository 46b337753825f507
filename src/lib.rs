//! loam - hybrid retrieval engine for markdown note vaults
//!
//! One query fans out to several independent retrieval strategies:
//! - Grep scanning (path and content substring matching)
//! - Link-graph expansion (outgoing links, backlinks, co-citations)
//! - Ephemeral full-text indexing (BM25, rebuilt per query)
//! - Semantic reranking (embedding cosine similarity)
//! - Deterministic filters (title, tag, time-range matches)
//!
//! Results are fused with weighted Reciprocal Rank Fusion. A persistent
//! partitioned chunk-embedding index backs the semantic stage without
//! loading the whole corpus into memory.

pub mod core;
pub mod index;
pub mod providers;
pub mod search;

pub use crate::core::config::{Config, SearchOptions};
pub use crate::core::note::NoteDocument;
pub use crate::core::store::{DocumentStore, LinkGraph, MetadataReader, VaultStore};
pub use crate::index::ChunkIndexManager;
pub use crate::search::tiered::{SearchResultItem, TieredRetriever};
