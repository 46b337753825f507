//! Note chunking and the persisted record type
//!
//! A chunk is the unit of embedding and storage: a bounded slice of one
//! note, split on heading and paragraph boundaries where possible. Chunk
//! ids are `<path>#<seq>` so one file's records can be targeted by path
//! without touching the rest of the index.

use serde::{Deserialize, Serialize};

/// One persisted chunk embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Stable across rebuilds: `<path>#<seq>`
    pub id: String,
    pub path: String,
    pub title: String,
    /// Epoch milliseconds
    pub mtime: i64,
    pub ctime: i64,
    pub embedding: Vec<f32>,
}

/// Chunk id for the `seq`-th chunk of a note
pub fn chunk_id(path: &str, seq: usize) -> String {
    format!("{path}#{seq}")
}

/// Split note content into chunks of at most `max_bytes` bytes.
///
/// Headings start a new chunk; paragraphs fill chunks up to the budget; a
/// single oversized paragraph is hard-split on a char boundary. Blank
/// content yields no chunks.
pub fn chunk_note(content: &str, max_bytes: usize) -> Vec<String> {
    let max_bytes = max_bytes.max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    let mut flush = |current: &mut String, chunks: &mut Vec<String>| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        current.clear();
    };

    for block in content.split("\n\n") {
        let block = block.trim_end();
        if block.trim().is_empty() {
            continue;
        }

        let starts_section = block.trim_start().starts_with('#');
        if starts_section && !current.is_empty() {
            flush(&mut current, &mut chunks);
        }

        if current.len() + block.len() + 2 > max_bytes && !current.is_empty() {
            flush(&mut current, &mut chunks);
        }

        if block.len() > max_bytes {
            // Oversized paragraph: hard-split on char boundaries
            flush(&mut current, &mut chunks);
            let mut piece = String::new();
            for c in block.chars() {
                if piece.len() + c.len_utf8() > max_bytes {
                    chunks.push(std::mem::take(&mut piece));
                }
                piece.push(c);
            }
            if !piece.trim().is_empty() {
                chunks.push(piece);
            }
            continue;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(block);
    }
    flush(&mut current, &mut chunks);

    chunks
}
