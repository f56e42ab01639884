//! In-memory vector index
//!
//! Append-only at build time, read-only while serving. Vectors are
//! L2-normalized on insert so cosine similarity is a plain dot product.
//! Snapshots persist as JSON together with a fingerprint of the knowledge
//! base they were built from.

use chrono::{DateTime, Utc};
use geoqa_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Floor added to the L2 norm so degenerate vectors do not divide by zero
pub const NORM_EPSILON: f32 = 1e-12;

/// Current snapshot format version
const SNAPSHOT_VERSION: u32 = 2;

/// L2-normalize a vector with an epsilon floor on the norm
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
    vector.iter().map(|x| x / norm).collect()
}

/// SHA-256 (hex) over `(source, content)` pairs, in the order given
pub fn fingerprint<'a, I>(documents: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut hasher = Sha256::new();
    for (source, content) in documents {
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Text and provenance stored alongside each vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    /// Stable chunk id (`{stem}_chunk_{n}`)
    pub chunk_id: String,
    /// Source document identifier (file name)
    pub source: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    #[serde(flatten)]
    record: ChunkRecord,
    vector: Vec<f32>,
}

/// Flat exact-search index over normalized vectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    version: u32,
    dimension: usize,
    model: String,
    fingerprint: Option<String>,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` produced by `model`
    pub fn new(dimension: usize, model: impl Into<String>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dimension,
            model: model.into(),
            fingerprint: None,
            created_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record at insertion position `position`
    pub fn get(&self, position: usize) -> Option<&ChunkRecord> {
        self.entries.get(position).map(|e| &e.record)
    }

    /// Append a record; the vector is normalized before storage
    pub fn insert(&mut self, record: ChunkRecord, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(AppError::Internal {
                message: format!(
                    "vector for {} has dimension {}, index expects {}",
                    record.chunk_id,
                    vector.len(),
                    self.dimension
                ),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(AppError::Internal {
                message: format!("vector for {} contains non-finite values", record.chunk_id),
            });
        }

        self.entries.push(IndexEntry {
            record,
            vector: normalize(vector),
        });
        Ok(())
    }

    /// Top-`k` `(position, similarity)` pairs by descending cosine similarity.
    ///
    /// Ties keep insertion order. An empty index yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(AppError::unavailable(
                "vector_index",
                format!(
                    "query dimension {} does not match index dimension {}",
                    query.len(),
                    self.dimension
                ),
            ));
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(AppError::validation("query", "query vector contains non-finite values"));
        }

        let query = normalize(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let dot = entry.vector.iter().zip(&query).map(|(a, b)| a * b).sum();
                (position, dot)
            })
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    /// Write the index as a JSON snapshot, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(self)?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;

        tracing::info!(
            path = %path.display(),
            entries = self.len(),
            dimension = self.dimension,
            "Vector index saved"
        );
        Ok(())
    }

    /// Read a JSON snapshot written by `save`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::unavailable(
                "vector_index",
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        let index: VectorIndex = serde_json::from_slice(&bytes)?;

        if index.version != SNAPSHOT_VERSION {
            return Err(AppError::unavailable(
                "vector_index",
                format!("unsupported snapshot version {}", index.version),
            ));
        }
        if let Some(bad) = index
            .entries
            .iter()
            .find(|e| e.vector.len() != index.dimension)
        {
            return Err(AppError::unavailable(
                "vector_index",
                format!("entry {} has wrong dimension", bad.record.chunk_id),
            ));
        }

        tracing::info!(
            path = %path.display(),
            entries = index.len(),
            model = %index.model,
            "Vector index loaded"
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    fn record(id: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: id.to_string(),
            source: format!("{}.md", id),
            title: id.to_string(),
            content: format!("content of {}", id),
        }
    }

    #[test]
    fn test_normalize_unit_length() {
        let v = normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let v = normalize(&[0.0, 0.0, 0.0]);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let mut index = VectorIndex::new(2, "test");
        index.insert(record("a"), &[1.0, 0.0]).unwrap();
        index.insert(record("b"), &[0.0, 1.0]).unwrap();
        index.insert(record("c"), &[1.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.1], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|(p, _)| *p).collect();
        assert_eq!(order, vec![0, 2, 1]);
        assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut index = VectorIndex::new(2, "test");
        index.insert(record("first"), &[2.0, 0.0]).unwrap();
        index.insert(record("second"), &[5.0, 0.0]).unwrap();
        index.insert(record("third"), &[1.0, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_search_empty_index() {
        let index = VectorIndex::new(4, "test");
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_insert_rejects_wrong_dimension() {
        let mut index = VectorIndex::new(3, "test");
        assert_err!(index.insert(record("a"), &[1.0, 0.0]));
        assert_err!(index.insert(record("b"), &[f32::NAN, 0.0, 1.0]));
        assert!(index.is_empty());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = fingerprint([("a.md", "one")]);
        let b = fingerprint([("a.md", "two")]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, fingerprint([("a.md", "one")]));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("geoqa-index-{}", uuid::Uuid::new_v4()));
        let path = dir.join("index.json");

        let mut index = VectorIndex::new(2, "test").with_fingerprint("abc");
        index.insert(record("a"), &[1.0, 2.0]).unwrap();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.fingerprint(), Some("abc"));
        assert_eq!(loaded.get(0), Some(&record("a")));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file_is_unavailable() {
        let err = VectorIndex::load("/nonexistent/geoqa/index.json").unwrap_err();
        assert!(err.is_transient());
    }
}
