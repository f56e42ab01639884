//! Geotech Q&A Search
//!
//! In-memory vector index and the retriever built on top of it.

pub mod index;
pub mod retrieval;

pub use index::{ChunkRecord, VectorIndex};
pub use retrieval::{RetrievedChunk, Retriever, VectorRetriever};
