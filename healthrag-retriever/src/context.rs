//! Process-wide wiring: configuration plus the one embedding provider that
//! every component shares.

use healthrag_embed::{EmbeddingProvider, FastEmbedProvider, HashingEmbedProvider};
use std::sync::Arc;
use tracing::info;

use crate::config::{ProviderKind, RetrieverConfig};
use crate::error::Result;
use crate::orchestrator::{AnswerOrchestrator, LanguageModel};
use crate::retrieval::{BatchIndexingPipeline, RetrievalEngine};
use crate::storage::CheckpointStore;
use crate::verification::GroundingVerifier;

/// Built once at startup and handed to the pipeline, the retrieval engine,
/// the verifier and the orchestrator. Loading the embedding model happens
/// here and nowhere else.
#[derive(Clone)]
pub struct RetrieverContext {
    config: RetrieverConfig,
    provider: Arc<dyn EmbeddingProvider>,
}

impl RetrieverContext {
    /// Validate `config` and initialize its embedding provider.
    pub async fn build(config: RetrieverConfig) -> Result<Self> {
        config.validate()?;
        let provider: Arc<dyn EmbeddingProvider> = match config.embedding.provider {
            ProviderKind::FastEmbed => {
                Arc::new(FastEmbedProvider::create(config.embedding.model.clone()).await?)
            }
            ProviderKind::Hashing => {
                Arc::new(HashingEmbedProvider::new(config.embedding.hashing_dimension)?)
            }
        };
        info!(
            "Embedding provider {} ready: {} ({} dimensions)",
            provider.provider_name(),
            provider.model_identity(),
            provider.embedding_dimension()
        );
        Ok(Self { config, provider })
    }

    /// Use an already constructed provider.
    pub fn with_provider(config: RetrieverConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, provider })
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn provider(&self) -> Arc<dyn EmbeddingProvider> {
        self.provider.clone()
    }

    pub fn checkpoint_store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.config.indexing.checkpoint_dir)
    }

    pub fn pipeline(&self) -> Result<BatchIndexingPipeline> {
        BatchIndexingPipeline::new(self.provider(), self.config.indexing.clone())
    }

    /// A retrieval engine with the configured artifacts loaded.
    pub async fn retrieval_engine(&self) -> Result<RetrievalEngine> {
        let mut engine = RetrievalEngine::new(self.provider());
        engine.load(&self.config.indexing.artifact_paths()).await?;
        Ok(engine)
    }

    pub fn verifier(&self) -> Result<GroundingVerifier> {
        let verifier =
            GroundingVerifier::new(self.provider(), self.config.verification.thresholds.clone())?;
        Ok(match &self.config.verification.source_root {
            Some(root) => verifier.with_source_root(root),
            None => verifier,
        })
    }

    pub fn orchestrator(
        &self,
        engine: Arc<RetrievalEngine>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<AnswerOrchestrator> {
        AnswerOrchestrator::new(engine, model, self.config.llm.clone())
    }
}
