//! Retrieval pipeline
//!
//! Stage order inside a query: expansion, grep scan, graph expansion,
//! ephemeral full-text indexing, optional semantic rerank, rank fusion.
//! Deterministic filter matches bypass fusion and truncation entirely.

pub mod expansion;
pub mod filters;
pub mod fulltext;
pub mod fusion;
pub mod graph;
pub mod grep;
pub mod rerank;
pub mod tiered;

pub use expansion::{ExpandedQuery, ExpansionOrigin, QueryExpander};
pub use filters::{FilterRetriever, TimeRange};
pub use fusion::fuse_weighted;
pub use tiered::{SearchResultItem, TieredRetriever};
