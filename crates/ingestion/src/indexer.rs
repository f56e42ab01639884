//! Index build and snapshot management
//!
//! load -> chunk -> embed -> index, and the load-or-rebuild policy used at
//! gateway startup.

use crate::chunker::{chunk_documents, ChunkingConfig};
use crate::errors::IngestionError;
use crate::loader::{load_documents, Document};
use geoqa_common::config::RetrievalConfig;
use geoqa_common::embeddings::Embedder;
use geoqa_search::index::{fingerprint, ChunkRecord, VectorIndex};
use std::path::Path;
use tracing::{info, instrument, warn};

/// Fingerprint of a loaded knowledge base
pub fn knowledge_base_fingerprint(documents: &[Document]) -> String {
    fingerprint(
        documents
            .iter()
            .map(|d| (d.source.as_str(), d.content.as_str())),
    )
}

/// Chunk and embed `documents` into a fresh index
#[instrument(skip_all, fields(documents = documents.len(), model = embedder.model_name()))]
pub async fn build_index(
    documents: &[Document],
    embedder: &dyn Embedder,
    chunking: &ChunkingConfig,
) -> Result<VectorIndex, IngestionError> {
    let chunks = chunk_documents(documents, chunking);

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = embedder
        .embed_batch(&texts)
        .await
        .map_err(IngestionError::Embedding)?;

    let mut index = VectorIndex::new(embedder.dimension(), embedder.model_name())
        .with_fingerprint(knowledge_base_fingerprint(documents));

    for (chunk, vector) in chunks.into_iter().zip(vectors) {
        index
            .insert(
                ChunkRecord {
                    chunk_id: chunk.chunk_id,
                    source: chunk.source,
                    title: chunk.title,
                    content: chunk.content,
                },
                &vector,
            )
            .map_err(IngestionError::Index)?;
    }

    info!(chunks = index.len(), dimension = index.dimension(), "Vector index built");
    Ok(index)
}

/// Load the knowledge base, build the index and persist it
pub async fn rebuild(
    config: &RetrievalConfig,
    embedder: &dyn Embedder,
) -> Result<VectorIndex, IngestionError> {
    let documents = load_documents(&config.knowledge_base_dir)?;
    let index = build_index(&documents, embedder, &ChunkingConfig::from(config)).await?;
    if index.is_empty() {
        return Err(IngestionError::EmptyKnowledgeBase(
            config.knowledge_base_dir.clone(),
        ));
    }
    index.save(&config.index_path).map_err(IngestionError::Index)?;
    Ok(index)
}

/// Reuse the snapshot at `index_path` when it matches the current knowledge
/// base and embedder; otherwise rebuild it.
///
/// A snapshot that cannot be written is logged and the in-memory index is
/// still returned.
pub async fn load_or_build_index(
    config: &RetrievalConfig,
    embedder: &dyn Embedder,
) -> Result<VectorIndex, IngestionError> {
    let documents = load_documents(&config.knowledge_base_dir)?;
    let current = knowledge_base_fingerprint(&documents);

    if Path::new(&config.index_path).exists() {
        match VectorIndex::load(&config.index_path) {
            Ok(index)
                if index.fingerprint() == Some(current.as_str())
                    && index.model() == embedder.model_name()
                    && index.dimension() == embedder.dimension() =>
            {
                info!(path = %config.index_path, entries = index.len(), "Using existing index snapshot");
                return Ok(index);
            }
            Ok(_) => info!(path = %config.index_path, "Index snapshot is stale, rebuilding"),
            Err(e) => warn!(path = %config.index_path, error = %e, "Index snapshot unreadable, rebuilding"),
        }
    }

    let index = build_index(&documents, embedder, &ChunkingConfig::from(config)).await?;
    if index.is_empty() {
        return Err(IngestionError::EmptyKnowledgeBase(
            config.knowledge_base_dir.clone(),
        ));
    }
    if let Err(e) = index.save(&config.index_path) {
        warn!(path = %config.index_path, error = %e, "Failed to persist index snapshot");
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoqa_common::embeddings::HashingEmbedder;

    fn temp_config() -> (RetrievalConfig, std::path::PathBuf) {
        let root = std::env::temp_dir().join(format!("geoqa-indexer-{}", uuid::Uuid::new_v4()));
        let kb = root.join("kb");
        std::fs::create_dir_all(&kb).unwrap();
        std::fs::write(kb.join("cpt_analysis.md"), "# CPT\nCPT measures cone resistance.").unwrap();
        std::fs::write(kb.join("settlement.md"), "# Settlement\nElastic settlement is load over modulus.").unwrap();

        let config = RetrievalConfig {
            knowledge_base_dir: kb.display().to_string(),
            index_path: root.join("data/index.json").display().to_string(),
            ..Default::default()
        };
        (config, root)
    }

    #[tokio::test]
    async fn test_build_index_from_documents() {
        let (config, root) = temp_config();
        let embedder = HashingEmbedder::new(64);

        let index = rebuild(&config, &embedder).await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(0).unwrap().chunk_id, "cpt_analysis_chunk_0");
        assert!(Path::new(&config.index_path).exists());

        std::fs::remove_dir_all(root).unwrap();
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_rebuilt() {
        let (config, root) = temp_config();
        let embedder = HashingEmbedder::new(64);

        let first = load_or_build_index(&config, &embedder).await.unwrap();
        let reused = load_or_build_index(&config, &embedder).await.unwrap();
        assert_eq!(first.fingerprint(), reused.fingerprint());
        assert_eq!(first.created_at(), reused.created_at());

        std::fs::write(
            Path::new(&config.knowledge_base_dir).join("new_note.md"),
            "Another note.",
        )
        .unwrap();
        let rebuilt = load_or_build_index(&config, &embedder).await.unwrap();
        assert_eq!(rebuilt.len(), 3);
        assert_ne!(rebuilt.fingerprint(), first.fingerprint());

        std::fs::remove_dir_all(root).unwrap();
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_fails() {
        let root = std::env::temp_dir().join(format!("geoqa-empty-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        let config = RetrievalConfig {
            knowledge_base_dir: root.display().to_string(),
            index_path: root.join("index.json").display().to_string(),
            ..Default::default()
        };

        let err = load_or_build_index(&config, &HashingEmbedder::new(8)).await.unwrap_err();
        assert!(matches!(err, IngestionError::EmptyKnowledgeBase(_)));

        std::fs::remove_dir_all(root).unwrap();
    }
}
