//! # healthrag-embed
//!
//! Text embedding providers for the healthrag indexing pipeline, retrieval
//! engine and grounding verifier.
//!
//! ## Quick Start
//!
//! ```no_run
//! use healthrag_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(
//!     EmbedConfig::default_with_path("/tmp/models")
//! ).await?;
//!
//! let texts = vec!["What causes anemia?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//! println!("{} vectors of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: local ONNX sentence-transformer models via FastEmbed
//!   (default `sentence-transformers/all-MiniLM-L6-v2`, 384 dimensions).
//! - [`HashingEmbedProvider`]: deterministic feature hashing, no model files.
//!
//! Both implement [`EmbeddingProvider`], the seam the rest of the workspace
//! depends on. A provider is created once per process and shared behind an
//! `Arc`; there is no global model cache.

pub mod config;
pub mod error;
pub mod hashing;
pub mod provider;

pub use config::{DEFAULT_MODEL_NAME, EmbedConfig};
pub use error::{EmbedError, Result};
pub use hashing::HashingEmbedProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, normalize_in_place};
