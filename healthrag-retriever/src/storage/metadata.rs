//! Metadata sequence codec.
//!
//! JSON lines: a header line naming the format, its version, the row count
//! and the embedding model that produced the matching vectors, followed by
//! exactly one [`ChunkMetadata`] object per index row.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::chunk::ChunkMetadata;
use crate::error::{Result, RetrieverError};

const METADATA_FORMAT: &str = "healthrag-metadata";
pub const METADATA_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct MetadataHeader {
    format: String,
    format_version: u32,
    rows: usize,
    #[serde(default)]
    model_identity: Option<String>,
}

/// A decoded metadata file.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFile {
    pub rows: Vec<ChunkMetadata>,
    pub model_identity: Option<String>,
}

pub fn encode_metadata(rows: &[ChunkMetadata], model_identity: Option<&str>) -> Result<Vec<u8>> {
    let header = MetadataHeader {
        format: METADATA_FORMAT.to_string(),
        format_version: METADATA_FORMAT_VERSION,
        rows: rows.len(),
        model_identity: model_identity.map(str::to_string),
    };
    let mut out = serde_json::to_vec(&header)?;
    out.push(b'\n');
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.push(b'\n');
    }
    Ok(out)
}

pub fn decode_metadata(bytes: &[u8], origin: &Path) -> Result<MetadataFile> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| RetrieverError::corrupt(origin, format!("metadata is not UTF-8: {e}")))?;
    let mut lines = text.lines();

    let header_line = lines
        .next()
        .ok_or_else(|| RetrieverError::corrupt(origin, "metadata file is empty"))?;
    let header: MetadataHeader = serde_json::from_str(header_line)
        .map_err(|e| RetrieverError::corrupt(origin, format!("bad metadata header: {e}")))?;
    if header.format != METADATA_FORMAT {
        return Err(RetrieverError::corrupt(
            origin,
            format!("unexpected metadata format {:?}", header.format),
        ));
    }
    if header.format_version != METADATA_FORMAT_VERSION {
        return Err(RetrieverError::corrupt(
            origin,
            format!("unsupported metadata format version {}", header.format_version),
        ));
    }

    let mut rows = Vec::with_capacity(header.rows);
    for (i, line) in lines.enumerate() {
        let row: ChunkMetadata = serde_json::from_str(line).map_err(|e| {
            RetrieverError::corrupt(origin, format!("metadata row {i}: {e}"))
        })?;
        rows.push(row);
    }
    if rows.len() != header.rows {
        return Err(RetrieverError::corrupt(
            origin,
            format!("header declares {} rows, found {}", header.rows, rows.len()),
        ));
    }
    Ok(MetadataFile {
        rows,
        model_identity: header.model_identity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_keeps_order_and_extras() {
        let rows = vec![
            ChunkMetadata::new("b.txt", 0, 2).with_extra("id", "x"),
            ChunkMetadata::new("a.txt", 1, 2),
        ];
        let bytes = encode_metadata(&rows, Some("hashing-bow-8")).unwrap();
        let decoded = decode_metadata(&bytes, Path::new("m.jsonl")).unwrap();
        assert_eq!(decoded.rows, rows);
        assert_eq!(decoded.model_identity.as_deref(), Some("hashing-bow-8"));
    }

    #[test]
    fn test_empty_sequence() {
        let bytes = encode_metadata(&[], None).unwrap();
        let decoded = decode_metadata(&bytes, Path::new("m.jsonl")).unwrap();
        assert!(decoded.rows.is_empty());
        assert_eq!(decoded.model_identity, None);
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let rows = vec![ChunkMetadata::new("a.txt", 0, 1); 3];
        let bytes = encode_metadata(&rows, None).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let truncated: String = text.lines().take(3).map(|l| format!("{l}\n")).collect();
        let err = decode_metadata(truncated.as_bytes(), Path::new("m.jsonl")).unwrap_err();
        assert!(err.to_string().contains("declares 3 rows, found 2"), "{err}");
    }

    #[test]
    fn test_foreign_header_rejected() {
        let err = decode_metadata(b"{\"rows\": 0}\n", Path::new("m.jsonl")).unwrap_err();
        assert!(matches!(err, RetrieverError::CorruptArtifact { .. }));
    }
}
