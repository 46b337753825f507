use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use loam::core::config::SearchOptions;
use loam::core::store::VaultStore;
use loam::providers::{EmbeddingProvider, HashProjectionEmbedder};
use loam::search::tiered::TieredRetriever;

pub async fn run(
    vault: &Path,
    query: &str,
    limit: usize,
    no_semantic: bool,
    json: bool,
) -> Result<()> {
    let store = Arc::new(VaultStore::open(vault)?);
    let config = store.config().clone();

    let embedder: Option<Arc<dyn EmbeddingProvider>> = if no_semantic {
        None
    } else {
        Some(Arc::new(HashProjectionEmbedder::new()))
    };
    let chunk_index = if no_semantic {
        None
    } else {
        Some(Arc::new(super::open_chunk_index(vault, store.clone())?))
    };

    // No language model on the CLI: expansion degrades to local terms
    let retriever = TieredRetriever::new(
        store.clone(),
        store.clone(),
        store,
        None,
        embedder,
        chunk_index,
        &config,
    );

    let opts = SearchOptions {
        max_results: limit,
        enable_semantic: !no_semantic,
        ..SearchOptions::default()
    };
    let results = retriever.retrieve(query, None, &opts).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("no matches");
        return Ok(());
    }
    for (i, item) in results.iter().enumerate() {
        println!(
            "{:>2}. [{:>8}] {:.3}  {}",
            i + 1,
            item.source,
            item.score,
            item.path
        );
    }
    Ok(())
}
