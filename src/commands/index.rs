use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use loam::core::store::VaultStore;

pub async fn build(vault: &Path) -> Result<()> {
    let store = Arc::new(VaultStore::open(vault)?);
    let manager = super::open_chunk_index(vault, store)?;
    let stats = manager.rebuild().await?;
    println!(
        "indexed {} notes: {} chunk records in {} partitions ({} failed)",
        stats.notes, stats.records, stats.partitions, stats.failed
    );
    Ok(())
}

pub async fn update(vault: &Path, path: &str) -> Result<()> {
    let store = Arc::new(VaultStore::open(vault)?);
    let manager = super::open_chunk_index(vault, store)?;
    manager.update_file(path).await?;
    println!("updated {path}");
    Ok(())
}

pub async fn clear(vault: &Path) -> Result<()> {
    let store = Arc::new(VaultStore::open(vault)?);
    let manager = super::open_chunk_index(vault, store)?;
    manager.clear().await?;
    println!("index cleared");
    Ok(())
}

pub async fn status(vault: &Path, json: bool) -> Result<()> {
    let store = Arc::new(VaultStore::open(vault)?);
    let manager = super::open_chunk_index(vault, store)?;
    let stats = manager.status()?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "records": stats.records,
                "notes": stats.notes,
                "partitions": stats.partitions,
            })
        );
    } else if stats.partitions == 0 {
        println!("no index (run `loam index build`)");
    } else {
        println!(
            "{} chunk records for {} notes in {} partitions",
            stats.records, stats.notes, stats.partitions
        );
    }
    Ok(())
}
