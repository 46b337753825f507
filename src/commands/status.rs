use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use loam::core::store::{DocumentStore, LinkGraph, MetadataReader, VaultStore};

#[derive(Serialize)]
struct VaultStatus {
    notes: usize,
    tagged: usize,
    distinct_tags: usize,
    linked: usize,
}

pub fn run(vault: &Path, json: bool) -> Result<()> {
    let store = VaultStore::open(vault)?;
    let notes = store.list_notes();

    let mut tag_counts: HashMap<String, usize> = HashMap::new();
    let mut tagged = 0usize;
    let mut linked = 0usize;
    for path in &notes {
        let tags = store.tags(path);
        if !tags.is_empty() {
            tagged += 1;
        }
        for tag in tags {
            *tag_counts.entry(tag).or_insert(0) += 1;
        }
        if !store.outgoing_links(path).is_empty() || !store.backlinks(path).is_empty() {
            linked += 1;
        }
    }

    let status = VaultStatus {
        notes: notes.len(),
        tagged,
        distinct_tags: tag_counts.len(),
        linked,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{} notes ({} tagged, {} linked)", status.notes, status.tagged, status.linked);
    if !tag_counts.is_empty() {
        let mut tags: Vec<(String, usize)> = tag_counts.into_iter().collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        println!("top tags:");
        for (tag, count) in tags.into_iter().take(10) {
            println!("  #{tag}  {count}");
        }
    }
    Ok(())
}
