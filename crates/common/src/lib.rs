//! Geotech Q&A Common Library
//!
//! Shared code for every Geotech Q&A crate including:
//! - Error types and handling
//! - Configuration management
//! - Request trace identifiers
//! - Metrics and observability
//! - Embedding and language model client abstractions

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod trace;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, ErrorKind, Result, TracedError};
pub use llm::LanguageModel;
pub use metrics::MetricsRegistry;
pub use trace::TraceId;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
