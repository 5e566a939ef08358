/// Feature-hashing embedder over identifier sub-tokens.
///
/// `getUserName` contributes `getusername`, `get`, `user` and `name`; each
/// token lands in one signed bucket chosen by xxh64. Deterministic across
/// runs, platforms and builds.
use xxhash_rust::xxh64::xxh64;

use super::{Embedder, EmbedderError};

const SEED: u64 = 0x5EED;

pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self, EmbedderError> {
        if dimensions == 0 {
            return Err(EmbedderError::InvalidDimensions(dimensions));
        }
        Ok(Self { dimensions })
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let hash = xxh64(token.as_bytes(), SEED);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Lowercased words plus their camelCase parts. Snake case splits on `_`.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        tokens.push(word.to_lowercase());
        let parts = split_camel_case(word);
        if parts.len() > 1 {
            tokens.extend(parts);
        }
    }
    tokens
}

fn split_camel_case(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !current.is_empty() {
                parts.push(std::mem::take(&mut current).to_lowercase());
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current.to_lowercase());
    }
    parts
}
