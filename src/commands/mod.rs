//! CLI command bodies

pub mod index;
pub mod search;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use loam::core::store::VaultStore;
use loam::index::ChunkIndexManager;
use loam::providers::HashProjectionEmbedder;

/// Directory under the vault root holding loam's persisted state
pub const STATE_DIR: &str = ".loam";

pub fn index_dir(vault: &Path) -> PathBuf {
    vault.join(STATE_DIR)
}

/// Chunk index wired with the built-in embedder, shared by the commands
pub fn open_chunk_index(vault: &Path, store: Arc<VaultStore>) -> Result<ChunkIndexManager> {
    let config = store.config().index.clone();
    let manager = ChunkIndexManager::new(
        store.clone(),
        store,
        Arc::new(HashProjectionEmbedder::new()),
        index_dir(vault),
        &config,
    )?;
    Ok(manager)
}
