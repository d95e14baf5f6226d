//! Recall Gateway - Main entry point.

use anyhow::{Context, Result};
use recall_common::config::Config;
use recall_common::logging::init_logging;
use recall_common::Validate;
use recall_memory::{create_embedding_provider, Memory, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (file, then environment)
    let config = Config::load_with_env().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Recall Gateway v{}", env!("CARGO_PKG_VERSION"));

    config
        .validate()
        .map_err(recall_common::Error::from)
        .context("Invalid configuration")?;
    if config.auth.token.is_none() {
        tracing::warn!("No auth token configured, memory routes are open");
    }

    let provider = create_embedding_provider(&config.embedding, config.memory.dimension);
    let store = Arc::new(
        MemoryStore::open(&config.memory, &config.retrieval, provider)
            .await
            .context("Failed to open memory store")?
            .with_embedding_timeout(Duration::from_secs(config.embedding.timeout_secs)),
    );

    let memory: Arc<dyn Memory> = store.clone();
    let served = recall_gateway::start_server(&config, memory, recall_gateway::shutdown_signal()).await;

    // Stop the flusher and write anything still pending.
    store.shutdown().await;
    served
}
