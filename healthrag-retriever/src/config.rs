//! TOML configuration for the whole workspace.
//!
//! Every field has a default, so an empty file (or no file) is valid:
//!
//! ```toml
//! [embedding]
//! provider = "fastembed"          # or "hashing"
//! model_name = "sentence-transformers/all-MiniLM-L6-v2"
//! cache_dir = "model_cache"
//! hashing_dimension = 384
//!
//! [indexing]
//! batch_size = 50000
//! checkpoint_dir = "checkpoint"
//! index_path = "vector_index.idx"
//! metadata_path = "vector_metadata.jsonl"
//!
//! [verification]
//! semantic_similarity = 0.7
//! grounding = 0.6
//! source_root = "."
//!
//! [llm]
//! model = "llama-3.1-8b-instant"
//! max_retries = 3
//! top_k = 5
//! ```
//!
//! The API key for the hosted model is deliberately not part of the file.

use healthrag_embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, RetrieverError};
use crate::orchestrator::LlmConfig;
use crate::retrieval::IndexingConfig;
use crate::storage::ArtifactPaths;
use crate::verification::VerificationThresholds;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local ONNX sentence-transformer via FastEmbed
    #[default]
    FastEmbed,
    /// Deterministic feature hashing, no model download
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: ProviderKind,
    /// Vector dimension of the hashing provider
    pub hashing_dimension: usize,
    #[serde(flatten)]
    pub model: EmbedConfig,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            hashing_dimension: 384,
            model: EmbedConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    #[serde(flatten)]
    pub thresholds: VerificationThresholds,
    /// Directory that relative `metadata.source` paths are resolved against
    pub source_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub embedding: EmbeddingSettings,
    pub indexing: IndexingConfig,
    pub verification: VerificationSettings,
    pub llm: LlmConfig,
}

impl RetrieverConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RetrieverError::Config(e.to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RetrieverError::io(path, e))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RetrieverError::Config(e.to_string()))
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.embedding.provider = provider;
        self
    }

    pub fn with_hashing_dimension(mut self, dimension: usize) -> Self {
        self.embedding.hashing_dimension = dimension;
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.embedding.model.model_name = model_name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.indexing.batch_size = batch_size;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.indexing.checkpoint_dir = dir.into();
        self
    }

    pub fn with_artifacts(mut self, paths: ArtifactPaths) -> Self {
        self.indexing = self.indexing.with_artifacts(paths);
        self
    }

    pub fn with_thresholds(mut self, thresholds: VerificationThresholds) -> Self {
        self.verification.thresholds = thresholds;
        self
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.verification.source_root = Some(root.into());
        self
    }

    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    pub fn validate(&self) -> Result<()> {
        match self.embedding.provider {
            ProviderKind::FastEmbed => self.embedding.model.validate()?,
            ProviderKind::Hashing if self.embedding.hashing_dimension == 0 => {
                return Err(RetrieverError::Config(
                    "embedding.hashing_dimension must be greater than 0".to_string(),
                ));
            }
            ProviderKind::Hashing => {}
        }
        self.indexing.validate()?;
        self.verification.thresholds.validate()?;
        self.llm.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = RetrieverConfig::from_toml_str("").unwrap();
        assert_eq!(config, RetrieverConfig::default());
        assert_eq!(config.indexing.batch_size, 50_000);
        assert_eq!(config.indexing.checkpoint_dir, PathBuf::from("checkpoint"));
        assert_eq!(config.embedding.model.model_name, "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = RetrieverConfig::from_toml_str(
            r#"
            [embedding]
            provider = "hashing"
            hashing_dimension = 64

            [indexing]
            batch_size = 1000
            index_path = "out/index.idx"

            [verification]
            grounding = 0.5
            source_root = "data"

            [llm]
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.provider, ProviderKind::Hashing);
        assert_eq!(config.embedding.hashing_dimension, 64);
        assert_eq!(config.indexing.batch_size, 1000);
        assert_eq!(config.indexing.index_path, PathBuf::from("out/index.idx"));
        assert_eq!(config.indexing.metadata_path, PathBuf::from("vector_metadata.jsonl"));
        assert_eq!(config.verification.thresholds.grounding, 0.5);
        assert_eq!(config.verification.thresholds.semantic_similarity, 0.7);
        assert_eq!(config.verification.source_root, Some(PathBuf::from("data")));
        assert_eq!(config.llm.max_retries, 5);
        assert_eq!(config.llm.top_k, 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RetrieverConfig::default().with_batch_size(0).validate().is_err());
        assert!(
            RetrieverConfig::default()
                .with_provider(ProviderKind::Hashing)
                .with_hashing_dimension(0)
                .validate()
                .is_err()
        );
        let thresholds = VerificationThresholds {
            grounding: 2.0,
            ..Default::default()
        };
        assert!(RetrieverConfig::default().with_thresholds(thresholds).validate().is_err());
    }

    #[test]
    fn test_unknown_provider_is_an_error() {
        let err = RetrieverConfig::from_toml_str("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(matches!(err, RetrieverError::Config(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RetrieverConfig::default()
            .with_provider(ProviderKind::Hashing)
            .with_source_root("corpus");
        let text = config.to_toml_string().unwrap();
        assert_eq!(RetrieverConfig::from_toml_str(&text).unwrap(), config);
    }
}
