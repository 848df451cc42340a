//! healthrag-retriever: resumable vector indexing, retrieval and grounding
//! verification for a health-document corpus.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: Batch indexing pipeline with checkpoint/resume, and the query-time retrieval engine
//! - **[`storage`]**: Flat L2 vector index, metadata codec, checkpoint store and final artifacts
//! - **[`verification`]**: Exact-phrase and semantic grounding checks, hallucination risk
//! - **[`orchestrator`]**: Retrieval-augmented answers from a hosted chat model with bounded retry
//! - **[`context`]**: Shared wiring built once per process
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use healthrag_retriever::{
//!     chunk::read_chunks_jsonl,
//!     config::{ProviderKind, RetrieverConfig},
//!     context::RetrieverContext,
//! };
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RetrieverConfig::default().with_provider(ProviderKind::Hashing);
//! let context = RetrieverContext::build(config).await?;
//!
//! let chunks = read_chunks_jsonl(Path::new("chunks.jsonl")).await?;
//! let report = context.pipeline()?.run(&chunks, true).await?;
//! println!("indexed {} chunks", report.vectors_indexed);
//!
//! let engine = context.retrieval_engine().await?;
//! let hits = engine.search("What are the symptoms of anemia?", 5).await?;
//! let verification = context
//!     .verifier()?
//!     .verify_response("What are the symptoms of anemia?", "Fatigue and pale skin.", &hits)
//!     .await;
//! println!("risk: {}", verification.hallucination_risk);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! chunks.jsonl → BatchIndexingPipeline → vector_index.idx + vector_metadata.jsonl
//!                       ↕                              ↓
//!                CheckpointStore               RetrievalEngine → AnswerOrchestrator
//!                                                      ↓                 ↓
//!                                               GroundingVerifier ← (answer, sources)
//! ```

pub mod chunk;
pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod retrieval;
pub mod storage;
pub mod verification;

pub use error::{Result, RetrieverError};
