//! Built-in hash-projection embedder
//!
//! A deterministic, dependency-free embedding for installs without an
//! external provider: tokens are FNV-hashed onto a fixed number of
//! harmonic components and the sum is L2-normalized. Far weaker than a
//! learned model, but stable across runs and good enough to make cosine
//! ranking meaningful on shared vocabulary.

use std::f32::consts::PI;

use anyhow::Result;

use super::{BoxFuture, EmbeddingProvider};

pub const EMBEDDING_DIM: usize = 256;
/// Harmonic components contributed per token
const COMPONENTS: u64 = 4;

pub struct HashProjectionEmbedder {
    dim: usize,
}

impl HashProjectionEmbedder {
    pub fn new() -> Self {
        Self { dim: EMBEDDING_DIM }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in text
            .to_lowercase()
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        {
            if token.chars().count() < 2 {
                continue;
            }
            let hash = fnv1a(token.as_bytes());
            for k in 0..COMPONENTS {
                let index = ((hash >> (k * 11)) as usize) % self.dim;
                let phase = ((hash >> (k * 7)) & 0xff) as f32 / 255.0;
                v[index] += (2.0 * PI * phase).cos() / (k + 1) as f32;
            }
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for HashProjectionEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProvider for HashProjectionEmbedder {
    fn embed_query<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
        let v = self.embed_text(text);
        Box::pin(async move { Ok(v) })
    }

    fn embed_documents<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        let vs = texts.iter().map(|t| self.embed_text(t)).collect();
        Box::pin(async move { Ok(vs) })
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
