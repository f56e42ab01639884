//! Ingestion error types

use geoqa_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Knowledge base directory not found: {0}")]
    KnowledgeBaseNotFound(String),

    #[error("No knowledge base chunks found to index in {0}")]
    EmptyKnowledgeBase(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Embedding failed: {0}")]
    Embedding(#[source] AppError),

    #[error("Index error: {0}")]
    Index(#[source] AppError),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::Embedding(inner) | IngestionError::Index(inner) => inner,
            other => AppError::unavailable("knowledge_base", other.to_string()),
        }
    }
}
