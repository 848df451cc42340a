use healthrag_embed::EmbeddingProvider;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::phrases::{PhraseMatcher, cosine_similarity};
use super::{ResponseVerification, SourceVerification, VerificationThresholds};
use crate::chunk::ChunkMetadata;
use crate::error::Result;
use crate::retrieval::SearchHit;

/// Scores how well an answer is supported by the documents it was built from.
///
/// Source documents are read from disk through `metadata.source` (resolved
/// against an optional root directory). Their content and embedding are
/// cached for the lifetime of the verifier. Unreadable or empty sources produce an unverified,
/// zero-confidence result; verification itself never fails.
pub struct GroundingVerifier {
    provider: Arc<dyn EmbeddingProvider>,
    thresholds: VerificationThresholds,
    matcher: PhraseMatcher,
    source_root: Option<PathBuf>,
    source_cache: Mutex<HashMap<PathBuf, Arc<str>>>,
    embedding_cache: Mutex<HashMap<PathBuf, Arc<[f32]>>>,
}

impl GroundingVerifier {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        thresholds: VerificationThresholds,
    ) -> Result<Self> {
        thresholds.validate()?;
        let matcher = PhraseMatcher::new(thresholds.min_phrase_words, thresholds.max_phrase_words)?;
        Ok(Self {
            provider,
            thresholds,
            matcher,
            source_root: None,
            source_cache: Mutex::new(HashMap::new()),
            embedding_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Resolve relative source paths against `root`.
    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    pub fn thresholds(&self) -> &VerificationThresholds {
        &self.thresholds
    }

    fn resolve(&self, source: &str) -> PathBuf {
        let path = Path::new(source);
        match &self.source_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Content of a source document, or `None` when missing, unreadable or
    /// empty.
    pub async fn source_content(&self, source: &str) -> Option<Arc<str>> {
        let path = self.resolve(source);
        let cached = lock(&self.source_cache).get(&path).cloned();
        if cached.is_some() {
            return cached;
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Source file not found: {}", path.display());
                return None;
            }
            Err(e) => {
                warn!("Error reading source file {}: {}", path.display(), e);
                return None;
            }
        };
        if content.trim().is_empty() {
            warn!("Source file is empty: {}", path.display());
            return None;
        }

        let content: Arc<str> = Arc::from(content);
        lock(&self.source_cache).insert(path, content.clone());
        Some(content)
    }

    /// Embedding of a source document's full content. Failed embeddings are
    /// not cached.
    async fn source_embedding(&self, source: &str, content: &str) -> Option<Arc<[f32]>> {
        let path = self.resolve(source);
        let cached = lock(&self.embedding_cache).get(&path).cloned();
        if cached.is_some() {
            return cached;
        }

        let vector: Arc<[f32]> = Arc::from(self.embed(content, "source").await?);
        lock(&self.embedding_cache).insert(path, vector.clone());
        Some(vector)
    }

    async fn embed(&self, text: &str, what: &str) -> Option<Vec<f32>> {
        match self.provider.embed_text(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!("Failed to embed {} for similarity, scoring 0.0: {}", what, e);
                None
            }
        }
    }

    /// Verify `response` against the single source described by `metadata`.
    pub async fn verify_source_grounding(
        &self,
        response: &str,
        metadata: &ChunkMetadata,
    ) -> SourceVerification {
        let response_embedding = self.embed(response, "response").await;
        self.verify_source_with(response, response_embedding.as_deref(), metadata)
            .await
    }

    async fn verify_source_with(
        &self,
        response: &str,
        response_embedding: Option<&[f32]>,
        metadata: &ChunkMetadata,
    ) -> SourceVerification {
        let source_id = metadata.source_id();
        let source_file = metadata.file_name();

        let Some(content) = self.source_content(&metadata.source).await else {
            return SourceVerification::unavailable(source_id, source_file);
        };

        let exact_matches = self.matcher.find_exact_matches(response, &content);

        let similarity = match response_embedding {
            Some(response_vec) => match self.source_embedding(&metadata.source, &content).await {
                Some(source_vec) => cosine_similarity(response_vec, &source_vec),
                None => 0.0,
            },
            None => 0.0,
        };

        let confidence = self.thresholds.confidence(exact_matches.len(), similarity);
        let is_verified =
            self.thresholds
                .is_source_verified(exact_matches.len(), similarity, confidence);
        debug!(
            "Source {}: {} exact phrases, similarity {:.3}, confidence {:.3}",
            source_file,
            exact_matches.len(),
            similarity,
            confidence
        );

        SourceVerification {
            source_id,
            source_file,
            content_hash: blake3::hash(content.as_bytes()).to_hex().to_string(),
            similarity_score: similarity,
            exact_matches,
            semantic_overlap: confidence,
            is_verified,
            verification_confidence: confidence,
        }
    }

    /// Verify an answer against every source it was built from.
    pub async fn verify_response(
        &self,
        query: &str,
        response: &str,
        sources: &[SearchHit],
    ) -> ResponseVerification {
        let mut verifications = Vec::with_capacity(sources.len());
        if !sources.is_empty() {
            let response_embedding = self.embed(response, "response").await;
            for hit in sources {
                verifications.push(
                    self.verify_source_with(response, response_embedding.as_deref(), &hit.metadata)
                        .await,
                );
            }
        }
        ResponseVerification::aggregate(query, response, verifications, &self.thresholds)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
