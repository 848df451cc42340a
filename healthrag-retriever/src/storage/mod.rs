//! Durable storage for the vector index and its metadata sequence.
//!
//! ## Key Components
//!
//! - **FlatL2Index**: append-only exact squared-L2 index with a checksummed binary format
//! - **Metadata codec**: versioned JSON-lines encoding of the metadata sequence
//! - **IndexedCorpus**: index and metadata kept in row lock-step
//! - **CheckpointStore**: crash-safe per-batch snapshots of an in-progress build
//! - **Artifacts**: the final index and metadata files produced by a completed build
//!
//! Every file is written through [`atomic_write`]: the bytes go to a sibling
//! `.tmp` file which is flushed and then renamed over the destination, so a
//! reader sees either the previous file or the complete new one.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::chunk::ChunkMetadata;
use crate::error::{Result, RetrieverError};

pub mod artifacts;
pub mod checkpoint;
pub mod metadata;
pub mod vector_index;

pub use artifacts::{ArtifactPaths, LoadedArtifacts, load_artifacts, write_artifacts};
pub use checkpoint::{CheckpointRun, CheckpointState, CheckpointStore, LoadedCheckpoint};
pub use metadata::{MetadataFile, decode_metadata, encode_metadata};
pub use vector_index::FlatL2Index;

/// Write `bytes` to `path` via a temporary sibling and rename.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RetrieverError::io(parent, e))?;
    }

    let tmp = tmp_path(path);
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| RetrieverError::io(&tmp, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| RetrieverError::io(&tmp, e))?;
    file.sync_all()
        .await
        .map_err(|e| RetrieverError::io(&tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| RetrieverError::io(path, e))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Remove a file, treating "already gone" as success.
pub(crate) async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RetrieverError::io(path, e)),
    }
}

/// A vector index together with its row-aligned metadata sequence.
///
/// Row `i` of the index and entry `i` of the metadata always describe the
/// same chunk. The only way to grow a corpus is [`append`](Self::append),
/// which adds both halves or neither.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedCorpus {
    index: FlatL2Index,
    metadata: Vec<ChunkMetadata>,
}

impl IndexedCorpus {
    pub fn new(dim: usize) -> Self {
        Self {
            index: FlatL2Index::new(dim),
            metadata: Vec::new(),
        }
    }

    /// Pair a loaded index with its metadata, rejecting misaligned halves.
    pub fn from_parts(index: FlatL2Index, metadata: Vec<ChunkMetadata>) -> Result<Self> {
        if index.len() != metadata.len() {
            return Err(RetrieverError::RowMisalignment {
                vectors: index.len(),
                metadata: metadata.len(),
            });
        }
        Ok(Self { index, metadata })
    }

    pub fn append(&mut self, vectors: &[Vec<f32>], metadata: Vec<ChunkMetadata>) -> Result<()> {
        if vectors.len() != metadata.len() {
            return Err(RetrieverError::RowMisalignment {
                vectors: vectors.len(),
                metadata: metadata.len(),
            });
        }
        self.index.add(vectors)?;
        self.metadata.extend(metadata);
        debug_assert_eq!(self.index.len(), self.metadata.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn index(&self) -> &FlatL2Index {
        &self.index
    }

    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_atomic_write_replaces_and_leaves_no_tmp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        atomic_write(&path, b"first").await.unwrap();
        atomic_write(&path, b"second").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_remove_if_exists_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        remove_if_exists(&path).await.unwrap();
        atomic_write(&path, b"x").await.unwrap();
        remove_if_exists(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_append_keeps_rows_aligned() {
        let mut corpus = IndexedCorpus::new(2);
        corpus
            .append(
                &[vec![0.0, 1.0], vec![1.0, 0.0]],
                vec![
                    ChunkMetadata::new("a.txt", 0, 2),
                    ChunkMetadata::new("a.txt", 1, 2),
                ],
            )
            .unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.index().len(), 2);

        let err = corpus
            .append(&[vec![0.0, 0.0]], Vec::new())
            .unwrap_err();
        assert!(matches!(err, RetrieverError::RowMisalignment { vectors: 1, metadata: 0 }));

        let err = corpus
            .append(&[vec![0.0]], vec![ChunkMetadata::new("b.txt", 0, 1)])
            .unwrap_err();
        assert!(matches!(err, RetrieverError::DimensionMismatch { .. }));
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.index().len(), 2);
    }

    #[test]
    fn test_from_parts_rejects_misalignment() {
        let mut index = FlatL2Index::new(1);
        index.add(&[vec![1.0]]).unwrap();
        assert!(IndexedCorpus::from_parts(index.clone(), Vec::new()).is_err());
        assert!(IndexedCorpus::from_parts(index, vec![ChunkMetadata::new("a", 0, 1)]).is_ok());
    }
}
