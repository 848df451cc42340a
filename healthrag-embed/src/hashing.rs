//! Deterministic feature-hashing embedding provider.
//!
//! Each lowercase alphanumeric token is hashed with blake3 into one of
//! `dimension` buckets with a hash-derived sign, and the resulting
//! bag-of-words vector is L2-normalized. No model files are needed, output
//! is identical across runs and platforms, and texts sharing vocabulary get
//! positive cosine similarity. Useful for offline indexing and tests.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, normalize_in_place};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct HashingEmbedProvider {
    dimension: usize,
    identity: String,
}

impl HashingEmbedProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config(
                "hashing provider dimension must be at least 1",
            ));
        }
        Ok(Self {
            dimension,
            identity: format!("hashing-bow-{dimension}"),
        })
    }

    /// Embed one text synchronously.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize_in_place(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let embeddings = texts.iter().map(|t| self.embed_sync(t)).collect();
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn model_identity(&self) -> &str {
        &self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_rejects_zero_dimension() {
        assert!(HashingEmbedProvider::new(0).is_err());
    }

    #[tokio::test]
    async fn test_deterministic_and_normalized() -> Result<()> {
        let provider = HashingEmbedProvider::new(64)?;
        let a = provider.embed_text("Insulin regulates blood sugar").await?;
        let b = provider.embed_text("insulin regulates BLOOD sugar!").await?;

        assert_eq!(a.len(), 64);
        assert_eq!(a, b, "case and punctuation must not change the vector");
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        Ok(())
    }

    #[tokio::test]
    async fn test_shared_vocabulary_is_more_similar() -> Result<()> {
        let provider = HashingEmbedProvider::new(256)?;
        let result = provider
            .embed_texts(&[
                "symptoms of diabetes include thirst".to_string(),
                "diabetes symptoms include frequent thirst".to_string(),
                "quarterly earnings exceeded analyst forecasts".to_string(),
            ])
            .await?;

        assert_eq!(result.len(), 3);
        let related = cosine(&result.embeddings[0], &result.embeddings[1]);
        let unrelated = cosine(&result.embeddings[0], &result.embeddings[2]);
        assert!(related > unrelated);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() -> Result<()> {
        let provider = HashingEmbedProvider::new(8)?;
        let v = provider.embed_text("   ").await?;
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(provider.model_identity(), "hashing-bow-8");
        Ok(())
    }
}
