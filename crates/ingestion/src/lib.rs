//! Geotech Q&A Ingestion
//!
//! Turns the markdown knowledge base into a persisted vector index.

pub mod chunker;
pub mod errors;
pub mod indexer;
pub mod loader;

pub use errors::IngestionError;
pub use indexer::{build_index, load_or_build_index, rebuild};
