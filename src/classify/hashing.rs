use std::io::Cursor;

use futures::FutureExt;
use futures::future::BoxFuture;
use murmur3::murmur3_32;

use crate::AppResult;
use crate::classify::traits::Embedder;

pub const DEFAULT_DIMENSIONS: usize = 384;

/// Offline embedder: hashes each whitespace token into one of `dimensions`
/// signed buckets and L2-normalizes the counts.
///
/// Texts sharing vocabulary land close together, which is enough to exercise
/// the pipeline without model weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    /// Zero dimensions are bumped to one.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut v = vec![0f32; self.dimensions];
        for token in text.split_whitespace() {
            let hash = murmur3_32(&mut Cursor::new(token.as_bytes()), 0)?;
            let bucket = hash as usize % self.dimensions;
            let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }
}

impl Embedder for HashingEmbedder {
    fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, AppResult<Vec<Vec<f32>>>> {
        async move { texts.iter().map(|t| self.embed_one(t)).collect() }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_are_unit_length() {
        let e = HashingEmbedder::new(64);
        let v = e.embed_one("rust ownership and borrowing").unwrap();
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_the_zero_vector() {
        let v = HashingEmbedder::new(8).embed_one("   ").unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn same_text_same_vector() {
        let e = HashingEmbedder::default();
        assert_eq!(e.embed_one("graph theory").unwrap(), e.embed_one("graph theory").unwrap());
    }

    #[test]
    fn token_lands_in_its_murmur3_bucket() {
        // murmur3_32("hello", 0) == 0x248bfa47
        let v = HashingEmbedder::new(1000).embed_one("hello").unwrap();
        assert_eq!(v[0x248b_fa47 % 1000], 1.0);
        assert_eq!(v.iter().filter(|&&x| x != 0.0).count(), 1);
    }

    #[tokio::test]
    async fn batch_keeps_input_order() {
        let e = HashingEmbedder::new(32);
        let texts = vec!["alpha beta".to_string(), "gamma".to_string(), String::new()];
        let out = e.embed(&texts).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], e.embed_one("gamma").unwrap());
    }
}
