//! Vault configuration
//!
//! Config loading: a single optional `.loam.json` at the vault root supplies
//! fallback defaults. Per-call behavior is controlled by `SearchOptions`,
//! which callers construct explicitly; there is no global mutable state.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Config file name at the vault root
pub const CONFIG_FILE: &str = ".loam.json";
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub patterns: PatternsConfig,

    #[serde(default)]
    pub daily: DailyConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub expansion: ExpansionConfig,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

/// Include/exclude glob patterns applied to vault-relative paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternsConfig {
    /// Globs a note must match to be visible (empty list matches everything)
    #[serde(default)]
    pub include: Vec<String>,

    /// Globs that hide a note even when included
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_exclude() -> Vec<String> {
    vec![".obsidian/**".to_string(), ".trash/**".to_string()]
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: default_exclude(),
        }
    }
}

/// Daily-note calendar settings used by time-range filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyConfig {
    /// Folder holding daily notes, relative to the vault root ("" for root)
    #[serde(default)]
    pub folder: String,

    /// chrono format string for daily-note titles
    #[serde(default = "default_daily_format")]
    pub format: String,
}

fn default_daily_format() -> String {
    "%Y-%m-%d".to_string()
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            folder: String::new(),
            format: default_daily_format(),
        }
    }
}

/// Persistent chunk index tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Base name for partition files (`<base>-NNN.jsonl`)
    #[serde(default = "default_index_base")]
    pub base_name: String,

    /// Byte budget per partition file
    #[serde(default = "default_partition_cap")]
    pub partition_cap_bytes: u64,

    /// Upper bound on bytes embedded per chunk
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,
}

fn default_index_base() -> String {
    "chunks".to_string()
}

fn default_partition_cap() -> u64 {
    150 * 1024 * 1024
}

fn default_chunk_bytes() -> usize {
    2000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_name: default_index_base(),
            partition_cap_bytes: default_partition_cap(),
            chunk_bytes: default_chunk_bytes(),
        }
    }
}

/// Query expansion tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    /// Maximum model-suggested query variants kept (plus the original)
    #[serde(default = "default_max_variants")]
    pub max_variants: usize,

    /// LRU cache capacity for expansion results
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Model call timeout in milliseconds
    #[serde(default = "default_model_timeout_ms")]
    pub model_timeout_ms: u64,
}

fn default_max_variants() -> usize {
    3
}

fn default_cache_capacity() -> usize {
    64
}

fn default_model_timeout_ms() -> u64 {
    8_000
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_variants: default_max_variants(),
            cache_capacity: default_cache_capacity(),
            model_timeout_ms: default_model_timeout_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            patterns: PatternsConfig::default(),
            daily: DailyConfig::default(),
            index: IndexConfig::default(),
            expansion: ExpansionConfig::default(),
        }
    }
}

impl Config {
    /// Load config from the vault root, falling back to defaults.
    ///
    /// A malformed file is reported and ignored rather than failing the
    /// whole session.
    pub fn load(vault_root: &Path) -> Self {
        let path = vault_root.join(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!("ignoring malformed {}: {}", CONFIG_FILE, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("could not read {}: {}", CONFIG_FILE, e);
                Self::default()
            }
        }
    }
}

// ============================================================================
// Search Options
// ============================================================================

/// Per-call search configuration
///
/// Every retrieval call receives one of these; documented fallbacks live in
/// `Default` and nowhere else.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Final result cap (guaranteed-include matches are exempt)
    pub max_results: usize,
    /// Whether the semantic rerank stage runs at all
    pub enable_semantic: bool,
    /// RRF weight of the semantic list
    pub semantic_weight: f32,
    /// Candidate cap applied before full-text indexing and embedding
    pub candidate_limit: usize,
    /// Link-graph expansion depth
    pub graph_hops: usize,
    /// RRF smoothing constant
    pub rrf_k: f32,
    /// Skip co-citation expansion above this many grep hits
    pub co_citation_threshold: usize,
    /// Maximum days in a synthesized daily-note sequence
    pub daily_note_cap: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 30,
            enable_semantic: true,
            semantic_weight: 0.7,
            candidate_limit: 120,
            graph_hops: 1,
            rrf_k: 60.0,
            co_citation_threshold: 20,
            daily_note_cap: 365,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.index.partition_cap_bytes, 150 * 1024 * 1024);
        assert_eq!(config.daily.format, "%Y-%m-%d");
        assert_eq!(config.expansion.max_variants, 3);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "index": { "base_name": "embeddings" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.index.base_name, "embeddings");
        assert_eq!(config.index.partition_cap_bytes, 150 * 1024 * 1024);
        assert_eq!(config.expansion.cache_capacity, 64);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path());
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn test_search_options_default() {
        let opts = SearchOptions::default();
        assert_eq!(opts.max_results, 30);
        assert_eq!(opts.co_citation_threshold, 20);
        assert_eq!(opts.daily_note_cap, 365);
    }
}
