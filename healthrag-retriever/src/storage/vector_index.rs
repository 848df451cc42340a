//! Exact (flat) squared-L2 vector index.
//!
//! Rows are append-only and identified only by their 0-based position. Search
//! is a brute-force scan; results are ordered by ascending squared Euclidean
//! distance with ties broken by row id, so the same index and query always
//! produce the same ranking.
//!
//! ## On-disk format
//!
//! ```text
//! magic "HRAGFLAT" (8) | version u32 | dim u32 | rows u64 | rows*dim f32 | blake3 (32)
//! ```
//!
//! Integers and floats are little-endian. The trailing blake3 digest covers
//! every preceding byte, so a truncated or partially written file fails to
//! load instead of deserializing into a shorter index.

use std::path::Path;

use crate::error::{Result, RetrieverError};

const INDEX_MAGIC: &[u8; 8] = b"HRAGFLAT";
pub const INDEX_FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 4 + 8;
const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Number of rows in the index
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append vectors as new rows. Either every vector is appended or, if any
    /// has the wrong dimension, none is.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(RetrieverError::DimensionMismatch {
                expected: self.dim,
                got: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dim);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    pub fn vector(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    /// Return up to `k` `(squared_distance, row)` pairs nearest to `query`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(f32, usize)>> {
        if query.len() != self.dim {
            return Err(RetrieverError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize)> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(row, v)| (squared_l2(query, v), row))
            .collect();

        let order = |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, order);
            scored.truncate(k);
        }
        scored.sort_unstable_by(order);
        Ok(scored)
    }

    /// Serialize to the versioned binary format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4 + DIGEST_LEN);
        out.extend_from_slice(INDEX_MAGIC);
        out.extend_from_slice(&INDEX_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dim as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            out.extend_from_slice(&value.to_le_bytes());
        }
        let digest = blake3::hash(&out);
        out.extend_from_slice(digest.as_bytes());
        out
    }

    /// Deserialize from the versioned binary format; `origin` names the file
    /// in error messages.
    pub fn from_bytes(bytes: &[u8], origin: &Path) -> Result<Self> {
        if bytes.len() < HEADER_LEN + DIGEST_LEN {
            return Err(RetrieverError::corrupt(origin, "index file truncated"));
        }
        let (body, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
        if blake3::hash(body).as_bytes() != digest {
            return Err(RetrieverError::corrupt(origin, "index checksum mismatch"));
        }
        if &body[..8] != INDEX_MAGIC {
            return Err(RetrieverError::corrupt(origin, "not a healthrag index file"));
        }

        let version = u32::from_le_bytes(read_array(&body[8..12]));
        if version != INDEX_FORMAT_VERSION {
            return Err(RetrieverError::corrupt(
                origin,
                format!("unsupported index format version {version}"),
            ));
        }
        let dim = u32::from_le_bytes(read_array(&body[12..16])) as usize;
        let rows = u64::from_le_bytes(read_array(&body[16..24])) as usize;

        let payload = &body[HEADER_LEN..];
        let expected_len = rows
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| RetrieverError::corrupt(origin, "index header overflow"))?;
        if payload.len() != expected_len {
            return Err(RetrieverError::corrupt(
                origin,
                format!(
                    "header declares {rows} rows of dimension {dim} but payload has {} bytes",
                    payload.len()
                ),
            ));
        }

        let data = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(read_array(b)))
            .collect();
        Ok(Self { dim, data })
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
