//! Resumable batch indexing pipeline.
//!
//! Turns an ordered sequence of chunks into a persisted vector index and
//! metadata sequence, checkpointing after every batch so that a crash or an
//! interruption loses at most the batch in flight.
//!
//! ## Pipeline Flow
//!
//! ```text
//! chunks ─► batch ─► EmbeddingProvider ─► IndexedCorpus::append ─► CheckpointStore::save
//!             ▲                                                         │
//!             └──────────────────── next batch ◄────────────────────────┘
//!
//! all batches done ─► write_artifacts ─► CheckpointStore::clear
//! ```
//!
//! ## Resume
//!
//! With `resume` set, a valid checkpoint is loaded and processing continues
//! at chunk `processed_count`. The checkpoint must have been produced by the
//! same embedding model and dimension, the same batch size and the same input
//! prefix; any difference is a [`RetrieverError::ConfigMismatch`]. A
//! corrupt or partial checkpoint is discarded and the run starts fresh.
//!
//! ## Failure
//!
//! An embedding, insertion or checkpoint-write failure aborts the run with
//! [`RetrieverError::BatchFailed`]; the checkpoint still describes the last
//! completed batch. The batch is not retried in-process.

use healthrag_embed::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{info, warn};

use crate::chunk::Chunk;
use crate::error::{Result, RetrieverError};
use crate::storage::{
    ArtifactPaths, CheckpointRun, CheckpointStore, IndexedCorpus, LoadedCheckpoint,
    write_artifacts,
};

pub const DEFAULT_BATCH_SIZE: usize = 50_000;
pub const DEFAULT_CHECKPOINT_DIR: &str = "checkpoint";

/// Configuration for a batch index build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Chunks per embedding call and per checkpoint
    pub batch_size: usize,
    pub checkpoint_dir: PathBuf,
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        let artifacts = ArtifactPaths::default();
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            index_path: artifacts.index_path,
            metadata_path: artifacts.metadata_path,
        }
    }
}

impl IndexingConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    pub fn with_artifacts(mut self, paths: ArtifactPaths) -> Self {
        self.index_path = paths.index_path;
        self.metadata_path = paths.metadata_path;
        self
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.index_path, &self.metadata_path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(RetrieverError::Config(
                "indexing.batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub total_chunks: usize,
    pub total_batches: usize,
    /// Batches embedded during this run
    pub batches_processed: usize,
    /// Batches already covered by the checkpoint
    pub batches_skipped: usize,
    /// `processed_count` of the checkpoint the run resumed from
    pub resumed_from: Option<usize>,
    pub vectors_indexed: usize,
    pub model_identity: String,
    pub embedding_dim: usize,
    pub artifacts: ArtifactPaths,
    pub elapsed_secs: f64,
}

pub struct BatchIndexingPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    config: IndexingConfig,
    checkpoints: CheckpointStore,
    interrupt: InterruptHandle,
}

impl BatchIndexingPipeline {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: IndexingConfig) -> Result<Self> {
        config.validate()?;
        let checkpoints = CheckpointStore::new(&config.checkpoint_dir);
        Ok(Self {
            provider,
            config,
            checkpoints,
            interrupt: InterruptHandle::new(),
        })
    }

    /// Share an externally owned interrupt flag (e.g. one set by Ctrl-C).
    pub fn with_interrupt(mut self, interrupt: InterruptHandle) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    /// Build the index for `chunks`, optionally resuming from a checkpoint.
    pub async fn run(&self, chunks: &[Chunk], resume: bool) -> Result<PipelineReport> {
        let started = Instant::now();
        let batch_size = self.config.batch_size;
        let total = chunks.len();
        let total_batches = total.div_ceil(batch_size);
        let model_identity = self.provider.model_identity().to_string();
        let embedding_dim = self.provider.embedding_dimension();

        let mut fingerprint = blake3::Hasher::new();
        let (mut corpus, resumed_from) = if resume {
            match self.checkpoints.load().await? {
                Some(checkpoint) => {
                    let corpus = self.accept_checkpoint(checkpoint, chunks, &mut fingerprint)?;
                    let processed = corpus.len();
                    (corpus, Some(processed))
                }
                None => (IndexedCorpus::new(embedding_dim), None),
            }
        } else {
            self.checkpoints.clear().await?;
            (IndexedCorpus::new(embedding_dim), None)
        };

        let start_offset = corpus.len();
        let batches_skipped = start_offset.div_ceil(batch_size);
        match resumed_from {
            Some(processed) => info!(
                "Resuming from checkpoint: {}/{} chunks already indexed, skipping {} batches",
                processed, total, batches_skipped
            ),
            None => info!(
                "Starting index build: {} chunks in {} batches of {} with {}",
                total, total_batches, batch_size, model_identity
            ),
        }

        let run = |fingerprint: &blake3::Hasher| CheckpointRun {
            model_identity: model_identity.clone(),
            batch_size,
            input_fingerprint: fingerprint.finalize().to_hex().to_string(),
        };

        let mut batches_processed = 0;
        let mut offset = start_offset;
        while offset < total {
            if self.interrupt.is_requested() {
                warn!(
                    "Indexing interrupted after {} of {} chunks; checkpoint kept",
                    offset, total
                );
                return Err(RetrieverError::Interrupted {
                    processed_count: corpus.len(),
                });
            }

            let end = (offset + batch_size).min(total);
            let batch_number = offset / batch_size + 1;
            let batch = &chunks[offset..end];

            // A batch counts as done only once its checkpoint is committed.
            let committed: Result<()> = async {
                self.index_batch(&mut corpus, batch).await?;
                update_fingerprint(&mut fingerprint, batch)?;
                self.checkpoints.save(&corpus, &run(&fingerprint)).await?;
                Ok(())
            }
            .await;
            if let Err(source) = committed {
                return Err(RetrieverError::BatchFailed {
                    batch: batch_number,
                    total_batches,
                    processed_count: offset,
                    source: Box::new(source),
                });
            }
            batches_processed += 1;
            offset = end;

            let elapsed = started.elapsed().as_secs_f64();
            let done_this_run = (offset - start_offset) as f64;
            let rate = if elapsed > 0.0 { done_this_run / elapsed } else { 0.0 };
            let remaining = if rate > 0.0 {
                (total - offset) as f64 / rate
            } else {
                0.0
            };
            info!(
                "Batch {}/{}: chunks {}..{} indexed, {} vectors ({:.1}%), elapsed {:.1}s, {:.1} chunks/s, ~{:.0}s remaining",
                batch_number,
                total_batches,
                offset - batch.len(),
                offset,
                corpus.len(),
                offset as f64 * 100.0 / total as f64,
                elapsed,
                rate,
                remaining
            );
        }

        let artifacts = self.config.artifact_paths();
        write_artifacts(&corpus, &model_identity, &artifacts).await?;
        self.checkpoints.clear().await?;

        let elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            "Index build complete: {} vectors of dimension {} in {:.1}s",
            corpus.len(),
            corpus.dimension(),
            elapsed_secs
        );

        Ok(PipelineReport {
            total_chunks: total,
            total_batches,
            batches_processed,
            batches_skipped,
            resumed_from,
            vectors_indexed: corpus.len(),
            model_identity,
            embedding_dim: corpus.dimension(),
            artifacts,
            elapsed_secs,
        })
    }

    /// Check a loaded checkpoint against this run and seed the fingerprint
    /// with the chunks it covers.
    fn accept_checkpoint(
        &self,
        checkpoint: LoadedCheckpoint,
        chunks: &[Chunk],
        fingerprint: &mut blake3::Hasher,
    ) -> Result<IndexedCorpus> {
        let state = &checkpoint.state;
        let model_identity = self.provider.model_identity();
        if state.model_identity != model_identity {
            return Err(RetrieverError::mismatch(
                "model_identity",
                model_identity,
                &state.model_identity,
            ));
        }
        let dim = self.provider.embedding_dimension();
        if state.embedding_dim != dim {
            return Err(RetrieverError::mismatch("embedding_dim", dim, state.embedding_dim));
        }
        if state.batch_size != self.config.batch_size {
            return Err(RetrieverError::mismatch(
                "batch_size",
                self.config.batch_size,
                state.batch_size,
            ));
        }
        if state.processed_count > chunks.len() {
            return Err(RetrieverError::mismatch(
                "input_chunks",
                chunks.len(),
                format!("at least {}", state.processed_count),
            ));
        }

        update_fingerprint(fingerprint, &chunks[..state.processed_count])?;
        let current = fingerprint.finalize().to_hex().to_string();
        if current != state.input_fingerprint {
            return Err(RetrieverError::mismatch(
                "input_fingerprint",
                current,
                &state.input_fingerprint,
            ));
        }
        Ok(checkpoint.corpus)
    }

    /// Embed one batch and append it. Either the whole batch lands in the
    /// corpus or nothing does.
    async fn index_batch(&self, corpus: &mut IndexedCorpus, batch: &[Chunk]) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let result = self.provider.embed_texts(&texts).await?;
        if result.len() != batch.len() {
            return Err(RetrieverError::RowMisalignment {
                vectors: result.len(),
                metadata: batch.len(),
            });
        }
        let metadata = batch.iter().map(|c| c.metadata.clone()).collect();
        corpus.append(&result.embeddings, metadata)
    }
}

fn update_fingerprint(hasher: &mut blake3::Hasher, chunks: &[Chunk]) -> Result<()> {
    for chunk in chunks {
        hasher.update(&(chunk.text.len() as u64).to_le_bytes());
        hasher.update(chunk.text.as_bytes());
        let metadata = serde_json::to_vec(&chunk.metadata)?;
        hasher.update(&(metadata.len() as u64).to_le_bytes());
        hasher.update(&metadata);
    }
    Ok(())
}
