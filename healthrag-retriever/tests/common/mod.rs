//! Embedding providers with scripted behavior for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use healthrag_embed::{EmbedError, EmbeddingProvider, EmbeddingResult};
use healthrag_retriever::chunk::{Chunk, ChunkMetadata};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Delegates to `inner` but fails the `fail_on`-th batch call (1-based).
pub struct FailingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn embed_text(&self, text: &str) -> healthrag_embed::Result<Vec<f32>> {
        self.inner.embed_text(text).await
    }

    async fn embed_texts(&self, texts: &[String]) -> healthrag_embed::Result<EmbeddingResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(EmbedError::invalid_config("simulated model crash"));
        }
        self.inner.embed_texts(texts).await
    }

    fn embedding_dimension(&self) -> usize {
        self.inner.embedding_dimension()
    }

    fn provider_name(&self) -> &str {
        "failing"
    }

    fn model_identity(&self) -> &str {
        self.inner.model_identity()
    }
}

/// Returns the same unit vector for every text, so any two texts have
/// cosine similarity 1.0.
pub struct ConstantProvider {
    identity: String,
    dimension: usize,
}

impl ConstantProvider {
    pub fn new(identity: &str, dimension: usize) -> Self {
        Self {
            identity: identity.to_string(),
            dimension,
        }
    }

    fn vector(&self) -> Vec<f32> {
        let mut v = vec![0.0; self.dimension];
        v[0] = 1.0;
        v
    }
}

#[async_trait]
impl EmbeddingProvider for ConstantProvider {
    async fn embed_text(&self, _text: &str) -> healthrag_embed::Result<Vec<f32>> {
        Ok(self.vector())
    }

    async fn embed_texts(&self, texts: &[String]) -> healthrag_embed::Result<EmbeddingResult> {
        Ok(EmbeddingResult::new(texts.iter().map(|_| self.vector()).collect()))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "constant"
    }

    fn model_identity(&self) -> &str {
        &self.identity
    }
}

/// Returns an error for every request.
pub struct BrokenProvider;

#[async_trait]
impl EmbeddingProvider for BrokenProvider {
    async fn embed_text(&self, _text: &str) -> healthrag_embed::Result<Vec<f32>> {
        Err(EmbedError::invalid_config("model unavailable"))
    }

    async fn embed_texts(&self, _texts: &[String]) -> healthrag_embed::Result<EmbeddingResult> {
        Err(EmbedError::invalid_config("model unavailable"))
    }

    fn embedding_dimension(&self) -> usize {
        8
    }

    fn provider_name(&self) -> &str {
        "broken"
    }

    fn model_identity(&self) -> &str {
        "broken-8"
    }
}

/// `n` chunks drawn from a handful of health topics, two chunks per document.
pub fn health_chunks(n: usize) -> Vec<Chunk> {
    const TOPICS: [&str; 5] = [
        "iron deficiency anemia causes fatigue and pale skin",
        "type 2 diabetes is managed with diet exercise and metformin",
        "hypertension raises the risk of stroke and heart disease",
        "influenza vaccination is recommended every autumn",
        "migraine attacks can be triggered by stress and poor sleep",
    ];
    (0..n)
        .map(|i| {
            let doc = i / 2;
            Chunk::new(
                format!("{} (note {i})", TOPICS[i % TOPICS.len()]),
                ChunkMetadata::new(format!("data/qa_pairs/doc_{doc}.txt"), i % 2, 2)
                    .with_extra("id", format!("doc-{doc}")),
            )
        })
        .collect()
}
