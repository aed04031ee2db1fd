// src/memory/embeddings.rs — Vector operations and the offline embedder

use async_trait::async_trait;

use crate::infra::errors::GenerationError;
use crate::provider::Embedder;

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Normalize a vector to unit length.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub const LOCAL_DIMENSIONS: usize = 256;

/// Feature-hashing embedder that needs no network.
///
/// Words and character trigrams are hashed into a fixed number of buckets.
/// Texts sharing vocabulary land close together, which is enough for skill
/// retrieval and dedup when no embedding model is configured.
pub struct LocalEmbedder {
    dimensions: usize,
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new(LOCAL_DIMENSIONS)
    }
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        let lowered = text.replace('\n', " ").to_lowercase();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
        {
            v[self.bucket(word.as_bytes())] += 1.0;
            let chars: Vec<char> = word.chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                v[self.bucket(gram.as_bytes())] += 0.5;
            }
        }
        normalize(&mut v);
        v
    }

    fn bucket(&self, bytes: &[u8]) -> usize {
        (fnv1a(bytes) % self.dimensions as u64) as usize
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn id(&self) -> &str {
        "local/hashing"
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, GenerationError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// 64-bit FNV-1a. Stable across builds, so persisted vectors stay comparable.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_empty_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    // ─── LocalEmbedder ──────────────────────────────────────────

    #[test]
    fn test_local_embedder_is_deterministic_and_unit() {
        let e = LocalEmbedder::default();
        let a = e.embed_one("compute fibonacci numbers");
        let b = e.embed_one("compute fibonacci numbers");
        assert_eq!(a, b);
        assert_eq!(a.len(), LOCAL_DIMENSIONS);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_local_embedder_similarity_tracks_vocabulary() {
        let e = LocalEmbedder::default();
        let q = e.embed_one("reverse a linked list in place");
        let close = e.embed_one("Reverse a singly linked list in place");
        let far = e.embed_one("parse an ISO 8601 timestamp");
        assert!(cosine_similarity(&q, &close) > cosine_similarity(&q, &far));
        assert!(cosine_similarity(&q, &close) > 0.8);
    }

    #[test]
    fn test_local_embedder_newlines_equal_spaces() {
        let e = LocalEmbedder::default();
        assert_eq!(e.embed_one("a\nb"), e.embed_one("a b"));
    }

    #[test]
    fn test_local_embedder_empty_text() {
        let e = LocalEmbedder::new(8);
        assert_eq!(e.embed_one(""), vec![0.0; 8]);
    }

    #[tokio::test]
    async fn test_local_embedder_batch() {
        let e = LocalEmbedder::default();
        let out = e.embed(&["one", "two"]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_ne!(out[0], out[1]);
    }

    #[test]
    fn test_fnv1a_known_value() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }
}
