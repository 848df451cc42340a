//! Final index and metadata artifacts of a completed build.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use super::metadata::{decode_metadata, encode_metadata};
use super::vector_index::FlatL2Index;
use super::{IndexedCorpus, atomic_write};
use crate::error::{Result, RetrieverError};

pub const DEFAULT_INDEX_PATH: &str = "vector_index.idx";
pub const DEFAULT_METADATA_PATH: &str = "vector_metadata.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            metadata_path: PathBuf::from(DEFAULT_METADATA_PATH),
        }
    }
}

impl ArtifactPaths {
    pub fn new(index_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            metadata_path: metadata_path.into(),
        }
    }

    /// Both files exist.
    pub fn exist(&self) -> bool {
        self.index_path.is_file() && self.metadata_path.is_file()
    }
}

/// A loaded pair of artifacts.
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub corpus: IndexedCorpus,
    /// Embedding model recorded when the artifacts were written
    pub model_identity: Option<String>,
}

pub async fn write_artifacts(
    corpus: &IndexedCorpus,
    model_identity: &str,
    paths: &ArtifactPaths,
) -> Result<()> {
    atomic_write(&paths.index_path, &corpus.index().to_bytes()).await?;
    let metadata = encode_metadata(corpus.metadata(), Some(model_identity))?;
    atomic_write(&paths.metadata_path, &metadata).await?;
    info!(
        "Saved {} vectors to {} and metadata to {}",
        corpus.len(),
        paths.index_path.display(),
        paths.metadata_path.display()
    );
    Ok(())
}

/// Load both artifacts; fails unless both parse and their row counts agree.
pub async fn load_artifacts(paths: &ArtifactPaths) -> Result<LoadedArtifacts> {
    let index_bytes = read(&paths.index_path).await?;
    let metadata_bytes = read(&paths.metadata_path).await?;

    let index = FlatL2Index::from_bytes(&index_bytes, &paths.index_path)?;
    let metadata = decode_metadata(&metadata_bytes, &paths.metadata_path)?;
    let corpus = IndexedCorpus::from_parts(index, metadata.rows)?;
    Ok(LoadedArtifacts {
        corpus,
        model_identity: metadata.model_identity,
    })
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| RetrieverError::io(path, e))
}
