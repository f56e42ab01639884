//! Geotech Q&A index builder
//!
//! Offline step run before serving:
//! 1. Loads the markdown knowledge base
//! 2. Chunks and embeds every note
//! 3. Persists the vector index snapshot
//! 4. Runs a few smoke queries against the fresh index

use geoqa_common::{config::AppConfig, embeddings::create_embedder, VERSION};
use geoqa_ingestion::rebuild;
use geoqa_search::{Retriever, VectorRetriever};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SMOKE_QUERIES: &[&str] = &[
    "What is CPT analysis?",
    "How to calculate bearing capacity?",
    "Settlement analysis methods",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(version = VERSION, "Building Geotech Q&A vector index");
    info!(config = ?config.redacted().retrieval, "Retrieval configuration");

    let embedder = create_embedder(&config.embedding)?;
    let index = Arc::new(rebuild(&config.retrieval, embedder.as_ref()).await?);

    info!(
        chunks = index.len(),
        path = %config.retrieval.index_path,
        "Index ready"
    );

    let retriever = VectorRetriever::new(embedder, index);
    for query in SMOKE_QUERIES {
        match retriever.search(query, 1).await {
            Ok(results) => match results.first() {
                Some(top) => info!(
                    query,
                    source = %top.source,
                    confidence = top.confidence,
                    "Smoke query"
                ),
                None => warn!(query, "Smoke query returned nothing"),
            },
            Err(e) => warn!(query, error = %e, "Smoke query failed"),
        }
    }

    Ok(())
}
