//! Knowledge retrieval
//!
//! A `Retriever` turns a query into a ranked, finite list of chunks with
//! confidences in `[0, 1]`, highest first.

mod vector;

pub use vector::VectorRetriever;

use geoqa_common::errors::Result;
use serde::{Deserialize, Serialize};

/// Retrieved chunk with relevance score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    /// Chunk ID
    pub chunk_id: String,

    /// Source document identifier (e.g. `cpt_analysis.md`)
    pub source: String,

    /// Document title
    pub title: String,

    /// Chunk content
    pub content: String,

    /// Raw cosine similarity
    pub score: f32,

    /// Similarity clamped to `[0, 1]`
    pub confidence: f32,
}

impl RetrievedChunk {
    /// Whether the chunk looks like it states a formula or a worked calculation
    pub fn has_formula(&self) -> bool {
        let content = &self.content;
        content.contains('=')
            || content.contains("Nq")
            || content.contains("Nγ")
            || content.to_lowercase().contains("formula")
    }
}

/// Map a raw similarity into a confidence in `[0, 1]`
pub fn confidence_from_similarity(similarity: f32) -> f32 {
    if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(0.0, 1.0)
    }
}

/// Common trait for all retrievers
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `top_k` chunks ordered by non-increasing confidence
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>>;

    /// Number of indexed chunks
    fn indexed_chunks(&self) -> usize;
}
