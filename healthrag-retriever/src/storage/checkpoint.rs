//! Checkpoint store for in-progress index builds.
//!
//! A checkpoint directory holds one generation of snapshots per committed
//! checkpoint, tagged with its `processed_count`, plus the state descriptor:
//!
//! ```text
//! checkpoint/
//! ├── index_snapshot.<n>.idx       FlatL2Index binary format
//! ├── metadata_snapshot.<n>.jsonl  metadata codec
//! └── state.json                   CheckpointState, written last
//! ```
//!
//! `state.json` is the commit marker. It names the snapshot generation it
//! describes and records the blake3 digest of both files. A save writes the
//! new generation next to the committed one, replaces `state.json`, and only
//! then removes the older generation, so a crash at any point leaves the
//! previous checkpoint loadable. A checkpoint that fails validation is
//! logged, discarded and reported as absent; the caller starts fresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::metadata::{decode_metadata, encode_metadata};
use super::vector_index::FlatL2Index;
use super::{IndexedCorpus, atomic_write, remove_if_exists};
use crate::error::{Result, RetrieverError};

pub const CHECKPOINT_FORMAT_VERSION: u32 = 2;

const INDEX_PREFIX: &str = "index_snapshot.";
const METADATA_PREFIX: &str = "metadata_snapshot.";
const STATE_FILE: &str = "state.json";

fn index_file_name(generation: usize) -> String {
    format!("{INDEX_PREFIX}{generation}.idx")
}

fn metadata_file_name(generation: usize) -> String {
    format!("{METADATA_PREFIX}{generation}.jsonl")
}

/// The state descriptor persisted as `state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub format_version: u32,
    /// Number of chunks embedded and indexed so far
    pub processed_count: usize,
    pub model_identity: String,
    pub embedding_dim: usize,
    pub batch_size: usize,
    pub timestamp: DateTime<Utc>,
    /// File name of the committed index snapshot, relative to the checkpoint directory
    pub index_file: String,
    /// File name of the committed metadata snapshot
    pub metadata_file: String,
    pub index_checksum: String,
    pub metadata_checksum: String,
    /// blake3 digest over the first `processed_count` input chunks
    pub input_fingerprint: String,
}

/// What a build run records alongside its snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRun {
    pub model_identity: String,
    pub batch_size: usize,
    pub input_fingerprint: String,
}

/// A checkpoint that passed validation.
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    pub state: CheckpointState,
    pub corpus: IndexedCorpus,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Resolve a snapshot name recorded in the state descriptor. Anything
    /// other than a bare snapshot file name is rejected.
    fn snapshot_path(&self, name: &str, prefix: &str) -> Result<PathBuf> {
        let bare = Path::new(name).file_name().is_some_and(|n| n == name);
        if !bare || !name.starts_with(prefix) {
            return Err(RetrieverError::corrupt(
                self.state_path(),
                format!("invalid snapshot name {name:?}"),
            ));
        }
        Ok(self.dir.join(name))
    }

    /// Persist a snapshot of `corpus` as a new generation. The index snapshot
    /// is written first, then the metadata snapshot, then the state
    /// descriptor; older generations are removed after that.
    pub async fn save(&self, corpus: &IndexedCorpus, run: &CheckpointRun) -> Result<CheckpointState> {
        let generation = corpus.len();
        let index_file = index_file_name(generation);
        let metadata_file = metadata_file_name(generation);

        let index_bytes = corpus.index().to_bytes();
        let metadata_bytes = encode_metadata(corpus.metadata(), Some(&run.model_identity))?;

        atomic_write(&self.dir.join(&index_file), &index_bytes).await?;
        atomic_write(&self.dir.join(&metadata_file), &metadata_bytes).await?;

        let state = CheckpointState {
            format_version: CHECKPOINT_FORMAT_VERSION,
            processed_count: generation,
            model_identity: run.model_identity.clone(),
            embedding_dim: corpus.dimension(),
            batch_size: run.batch_size,
            timestamp: Utc::now(),
            index_file,
            metadata_file,
            index_checksum: blake3::hash(&index_bytes).to_hex().to_string(),
            metadata_checksum: blake3::hash(&metadata_bytes).to_hex().to_string(),
            input_fingerprint: run.input_fingerprint.clone(),
        };
        let state_bytes = serde_json::to_vec_pretty(&state)?;
        atomic_write(&self.state_path(), &state_bytes).await?;

        self.remove_stale_snapshots(&state).await;
        debug!(
            "Checkpoint saved: {} chunks in {}",
            state.processed_count,
            self.dir.display()
        );
        Ok(state)
    }

    /// Remove snapshot files not named by `keep`. Failures are logged and
    /// left for the next save or clear.
    async fn remove_stale_snapshots(&self, keep: &CheckpointState) {
        for path in self.snapshot_files().await {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if name == keep.index_file || name == keep.metadata_file {
                continue;
            }
            if let Err(e) = remove_if_exists(&path).await {
                warn!("Could not remove stale checkpoint file: {}", e);
            }
        }
    }

    /// Regular files in the checkpoint directory that belong to a snapshot
    /// generation, including unfinished `.tmp` writes.
    async fn snapshot_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return files;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if is_file && (name.starts_with(INDEX_PREFIX) || name.starts_with(METADATA_PREFIX)) {
                files.push(entry.path());
            }
        }
        files
    }

    /// Read the state descriptor without touching the snapshots.
    pub async fn inspect(&self) -> Result<Option<CheckpointState>> {
        let path = self.state_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RetrieverError::io(&path, e)),
        };
        let state = serde_json::from_slice(&bytes)
            .map_err(|e| RetrieverError::corrupt(&path, format!("bad state descriptor: {e}")))?;
        Ok(Some(state))
    }

    /// Load and validate the checkpoint.
    ///
    /// Returns `Ok(None)` when there is no checkpoint, and also when the
    /// checkpoint is unreadable or inconsistent; in that case a warning is
    /// logged and the checkpoint files are removed.
    pub async fn load(&self) -> Result<Option<LoadedCheckpoint>> {
        let state = match self.inspect().await {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("No checkpoint in {}", self.dir.display());
                return Ok(None);
            }
            Err(e @ RetrieverError::CorruptArtifact { .. }) => {
                return self.discard(e).await;
            }
            Err(e) => return Err(e),
        };

        match self.load_snapshots(&state).await {
            Ok(corpus) => {
                info!(
                    "Loaded checkpoint: {} chunks, model {}, saved {}",
                    state.processed_count, state.model_identity, state.timestamp
                );
                Ok(Some(LoadedCheckpoint { state, corpus }))
            }
            Err(e @ RetrieverError::CorruptArtifact { .. }) => self.discard(e).await,
            Err(e) => Err(e),
        }
    }

    async fn load_snapshots(&self, state: &CheckpointState) -> Result<IndexedCorpus> {
        let state_path = self.state_path();
        if state.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(RetrieverError::corrupt(
                &state_path,
                format!("unsupported checkpoint format version {}", state.format_version),
            ));
        }

        let index_path = self.snapshot_path(&state.index_file, INDEX_PREFIX)?;
        let index_bytes = read_snapshot(&index_path).await?;
        if blake3::hash(&index_bytes).to_hex().as_str() != state.index_checksum {
            return Err(RetrieverError::corrupt(
                &index_path,
                "snapshot does not match the state descriptor checksum",
            ));
        }

        let metadata_path = self.snapshot_path(&state.metadata_file, METADATA_PREFIX)?;
        let metadata_bytes = read_snapshot(&metadata_path).await?;
        if blake3::hash(&metadata_bytes).to_hex().as_str() != state.metadata_checksum {
            return Err(RetrieverError::corrupt(
                &metadata_path,
                "snapshot does not match the state descriptor checksum",
            ));
        }

        let index = FlatL2Index::from_bytes(&index_bytes, &index_path)?;
        let metadata = decode_metadata(&metadata_bytes, &metadata_path)?.rows;

        if index.len() != state.processed_count || metadata.len() != state.processed_count {
            return Err(RetrieverError::corrupt(
                &state_path,
                format!(
                    "processed_count {} but index has {} rows and metadata {}",
                    state.processed_count,
                    index.len(),
                    metadata.len()
                ),
            ));
        }
        if index.dimension() != state.embedding_dim {
            return Err(RetrieverError::corrupt(
                &index_path,
                format!(
                    "index dimension {} but state records {}",
                    index.dimension(),
                    state.embedding_dim
                ),
            ));
        }

        IndexedCorpus::from_parts(index, metadata)
    }

    async fn discard(&self, reason: RetrieverError) -> Result<Option<LoadedCheckpoint>> {
        warn!("Discarding unusable checkpoint, starting fresh: {}", reason);
        self.clear().await?;
        Ok(None)
    }

    /// Delete the checkpoint. Succeeds when there is nothing to delete.
    pub async fn clear(&self) -> Result<()> {
        // Removing the marker first leaves any survivors uncommitted.
        remove_if_exists(&self.state_path()).await?;
        for path in self.snapshot_files().await {
            remove_if_exists(&path).await?;
        }
        // The directory may hold unrelated files; only remove it when empty.
        let _ = tokio::fs::remove_dir(&self.dir).await;
        debug!("Checkpoint cleared in {}", self.dir.display());
        Ok(())
    }
}

async fn read_snapshot(path: &Path) -> Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(RetrieverError::corrupt(path, "snapshot missing"))
        }
        Err(e) => Err(RetrieverError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkMetadata;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    fn corpus(rows: usize) -> IndexedCorpus {
        let mut corpus = IndexedCorpus::new(3);
        let vectors: Vec<Vec<f32>> = (0..rows).map(|i| vec![i as f32, 0.5, -1.0]).collect();
        let metadata = (0..rows)
            .map(|i| ChunkMetadata::new("doc.txt", i, rows))
            .collect();
        corpus.append(&vectors, metadata).unwrap();
        corpus
    }

    fn run() -> CheckpointRun {
        CheckpointRun {
            model_identity: "hashing-bow-3".to_string(),
            batch_size: 2,
            input_fingerprint: "abc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint"));

        let saved = store.save(&corpus(4), &run()).await.unwrap();
        assert_eq!(saved.processed_count, 4);
        assert_eq!(saved.embedding_dim, 3);

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.state, saved);
        assert_eq!(loaded.corpus, corpus(4));
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_none() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint"));
        assert!(store.load().await.unwrap().is_none());
        assert!(store.inspect().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_later_save_overwrites_earlier() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(&corpus(2), &run()).await.unwrap();
        store.save(&corpus(5), &run()).await.unwrap();

        let state = store.inspect().await.unwrap().unwrap();
        assert_eq!(state.processed_count, 5);
        assert_eq!(store.load().await.unwrap().unwrap().corpus.len(), 5);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_tampered_snapshot_is_discarded() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint"));
        store.save(&corpus(3), &run()).await.unwrap();

        // Simulates a crash after the metadata snapshot was replaced but
        // before the state descriptor was.
        let state = store.inspect().await.unwrap().unwrap();
        let meta_path = dir.path().join("checkpoint").join(&state.metadata_file);
        let bytes = encode_metadata(corpus(4).metadata(), None).unwrap();
        tokio::fs::write(&meta_path, bytes).await.unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(logs_contain("Discarding unusable checkpoint"));
        assert!(store.inspect().await.unwrap().is_none());
        assert!(!meta_path.exists());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_garbled_state_is_discarded() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(&corpus(1), &run()).await.unwrap();
        tokio::fs::write(dir.path().join(STATE_FILE), b"{not json")
            .await
            .unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(logs_contain("bad state descriptor"));
    }

    #[tokio::test]
    async fn test_snapshots_without_state_are_ignored() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(&corpus(2), &run()).await.unwrap();
        tokio::fs::remove_file(dir.path().join(STATE_FILE))
            .await
            .unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unfinished_generation_keeps_previous_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let committed = store.save(&corpus(2), &run()).await.unwrap();
        assert_eq!(committed.index_file, "index_snapshot.2.idx");
        assert_eq!(committed.metadata_file, "metadata_snapshot.2.jsonl");

        // Crash after the next generation's snapshots landed, before state.json.
        tokio::fs::write(dir.path().join(index_file_name(4)), corpus(4).index().to_bytes())
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("metadata_snapshot.4.jsonl.tmp"), b"partial")
            .await
            .unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.state, committed);
        assert_eq!(loaded.corpus, corpus(2));

        // The next commit removes every other generation.
        store.save(&corpus(6), &run()).await.unwrap();
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        assert_eq!(
            names,
            ["index_snapshot.6.idx", "metadata_snapshot.6.jsonl", "state.json"]
        );
    }

    #[tokio::test]
    async fn test_snapshot_name_outside_directory_is_discarded() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint"));
        let mut state = store.save(&corpus(2), &run()).await.unwrap();
        state.index_file = "../index_snapshot.2.idx".to_string();
        tokio::fs::write(
            store.state_path(),
            serde_json::to_vec_pretty(&state).unwrap(),
        )
        .await
        .unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(store.inspect().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let checkpoint_dir = dir.path().join("checkpoint");
        let store = CheckpointStore::new(&checkpoint_dir);

        store.clear().await.unwrap();
        store.save(&corpus(2), &run()).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(!checkpoint_dir.exists());
    }
}
