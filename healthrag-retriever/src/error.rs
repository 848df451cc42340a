//! Error types for indexing, retrieval and answer generation

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RetrieverError>;

/// Errors raised by the retriever crate.
///
/// The variants separate what a caller must react to differently:
/// [`ConfigMismatch`](Self::ConfigMismatch) is fatal and must not be retried,
/// [`BatchFailed`](Self::BatchFailed) and [`Interrupted`](Self::Interrupted)
/// leave a valid checkpoint behind and can be resumed,
/// [`CorruptArtifact`](Self::CorruptArtifact) on a checkpoint is absorbed by
/// the checkpoint store ("start fresh") but is fatal for final artifacts.
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// The checkpoint or artifacts were built under a different configuration
    #[error("Configuration mismatch: {field} is {found} on disk but {expected} in the current run")]
    ConfigMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },

    /// Search was attempted before an index was loaded
    #[error("Retrieval engine not ready: {0}")]
    NotReady(String),

    /// A persisted file failed validation
    #[error("Corrupt artifact {path}: {reason}")]
    CorruptArtifact { path: PathBuf, reason: String },

    /// A vector or query had the wrong dimension for the index
    #[error("Dimension mismatch: index expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Vector rows and metadata rows fell out of lock-step
    #[error("Row alignment violated: {vectors} vectors but {metadata} metadata entries")]
    RowMisalignment { vectors: usize, metadata: usize },

    /// Embedding or insertion failed for one batch; the checkpoint still
    /// reflects `processed_count` rows and the run can be resumed
    #[error(
        "Batch {batch}/{total_batches} failed with {processed_count} chunks committed: {source}"
    )]
    BatchFailed {
        batch: usize,
        total_batches: usize,
        processed_count: usize,
        #[source]
        source: Box<RetrieverError>,
    },

    /// The run was interrupted between batches
    #[error("Indexing interrupted with {processed_count} chunks committed")]
    Interrupted { processed_count: usize },

    #[error("Embedding error: {source}")]
    Embedding {
        #[from]
        source: healthrag_embed::EmbedError,
    },

    #[error("Language model request failed: {0}")]
    Llm(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl RetrieverError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn mismatch(
        field: &'static str,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Self::ConfigMismatch {
            field,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Whether re-running with resume enabled can make progress.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::BatchFailed { .. } | Self::Interrupted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_failure_reports_progress() {
        let err = RetrieverError::BatchFailed {
            batch: 3,
            total_batches: 10,
            processed_count: 100,
            source: Box::new(RetrieverError::Llm("boom".into())),
        };
        let message = err.to_string();
        assert!(message.contains("Batch 3/10"));
        assert!(message.contains("100 chunks committed"));
        assert!(err.is_resumable());
    }

    #[test]
    fn test_mismatch_is_not_resumable() {
        let err = RetrieverError::mismatch("embedding_dim", 768, 384);
        assert_eq!(
            err.to_string(),
            "Configuration mismatch: embedding_dim is 384 on disk but 768 in the current run"
        );
        assert!(!err.is_resumable());
    }
}
