//! Vector similarity search over the in-memory index

use super::{confidence_from_similarity, RetrievedChunk, Retriever};
use crate::index::VectorIndex;
use geoqa_common::embeddings::Embedder;
use geoqa_common::errors::Result;
use std::sync::Arc;

/// Embeds the query and ranks chunks by cosine similarity
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
}

impl VectorRetriever {
    /// Create a new vector retriever
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

#[async_trait::async_trait]
impl Retriever for VectorRetriever {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if self.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        let hits = self.index.search(&embedding, top_k)?;

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter_map(|(position, similarity)| {
                self.index.get(position).map(|record| RetrievedChunk {
                    chunk_id: record.chunk_id.clone(),
                    source: record.source.clone(),
                    title: record.title.clone(),
                    content: record.content.clone(),
                    score: similarity,
                    confidence: confidence_from_similarity(similarity),
                })
            })
            .collect();

        tracing::debug!(
            top_k,
            results = chunks.len(),
            top_confidence = chunks.first().map(|c| c.confidence).unwrap_or(0.0),
            "Vector search completed"
        );

        Ok(chunks)
    }

    fn indexed_chunks(&self) -> usize {
        self.index.len()
    }
}
