//! Chunk data model and the JSON-lines chunk input format.
//!
//! Chunks are produced upstream (document loading and splitting are not part
//! of this crate) and arrive as one JSON object per line:
//!
//! ```text
//! {"text": "Diabetes is ...", "metadata": {"source": "data/nih/diabetes.txt", "chunk_index": 0, "total_chunks": 4, "chunk_size": 1987, "id": "doc_123"}}
//! ```
//!
//! The four named metadata keys are required; any other keys are kept
//! verbatim and travel with the chunk into the metadata sequence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{Result, RetrieverError};

/// Metadata attached to a chunk and stored row-aligned with its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the originating document
    pub source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Length of the chunk text in characters
    pub chunk_size: usize,
    /// Any additional upstream keys (`id`, `original_doc_index`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChunkMetadata {
    pub fn new(source: impl Into<String>, chunk_index: usize, total_chunks: usize) -> Self {
        Self {
            source: source.into(),
            chunk_index,
            total_chunks,
            chunk_size: 0,
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn source_path(&self) -> &Path {
        Path::new(&self.source)
    }

    /// Final path component of the source, or the whole source string.
    pub fn file_name(&self) -> String {
        self.source_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.clone())
    }

    /// Upstream document id, rendered as a string, or `"unknown"`.
    pub fn source_id(&self) -> String {
        match self.extra.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "unknown".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// A bounded span of source text plus its metadata; the unit that is embedded
/// and indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Build a chunk, filling `chunk_size` from the text length.
    pub fn new(text: impl Into<String>, mut metadata: ChunkMetadata) -> Self {
        let text = text.into();
        metadata.chunk_size = text.chars().count();
        Self { text, metadata }
    }
}

/// Parse chunks from JSON-lines text. Blank lines are skipped.
pub fn parse_chunks_jsonl(content: &str, origin: &Path) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let chunk: Chunk = serde_json::from_str(line).map_err(|e| {
            RetrieverError::corrupt(origin, format!("line {}: {}", line_no + 1, e))
        })?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Read a JSON-lines chunk file.
pub async fn read_chunks_jsonl(path: &Path) -> Result<Vec<Chunk>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RetrieverError::io(path, e))?;
    let chunks = parse_chunks_jsonl(&content, path)?;
    tracing::info!("Loaded {} chunks from {}", chunks.len(), path.display());
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_new_sets_size_in_chars() {
        let chunk = Chunk::new("fièvre", ChunkMetadata::new("a.txt", 0, 1));
        assert_eq!(chunk.metadata.chunk_size, 6);
    }

    #[test]
    fn test_metadata_accessors() {
        let meta = ChunkMetadata::new("data/raw/NIH/diabetes.txt", 2, 5).with_extra("id", "doc_123");
        assert_eq!(meta.file_name(), "diabetes.txt");
        assert_eq!(meta.source_id(), "doc_123");

        let numeric = ChunkMetadata::new("x.txt", 0, 1).with_extra("id", 42);
        assert_eq!(numeric.source_id(), "42");
        assert_eq!(ChunkMetadata::new("x.txt", 0, 1).source_id(), "unknown");
    }

    #[test]
    fn test_parse_jsonl_keeps_extra_keys() {
        let input = r#"{"text": "Anemia is a condition", "metadata": {"source": "anemia.txt", "chunk_index": 0, "total_chunks": 1, "chunk_size": 21, "original_doc_index": 7}}

{"text": "Second", "metadata": {"source": "b.txt", "chunk_index": 0, "total_chunks": 1, "chunk_size": 6}}
"#;
        let chunks = parse_chunks_jsonl(input, Path::new("chunks.jsonl")).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.extra.get("original_doc_index"), Some(&Value::from(7)));

        let round = serde_json::to_value(&chunks[0].metadata).unwrap();
        assert_eq!(round["original_doc_index"], 7);
        assert_eq!(round["source"], "anemia.txt");
    }

    #[test]
    fn test_parse_jsonl_reports_line_number() {
        let input = "{\"text\": \"ok\", \"metadata\": {\"source\": \"a\", \"chunk_index\": 0, \"total_chunks\": 1, \"chunk_size\": 2}}\n{\"text\": 5}\n";
        let err = parse_chunks_jsonl(input, Path::new("bad.jsonl")).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }
}
