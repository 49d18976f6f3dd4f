//! Article Forge server
//!
//! Serves the article form and the `/api/generate` relay route.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use article_forge::server::{run_server, AppState};
use article_forge::{CorpusLoader, ForgeConfig, OllamaBackend};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("article_forge=info,tower_http=info")),
        )
        .with_target(true)
        .init();

    let config = ForgeConfig::from_env();

    println!("\n{}", "═".repeat(60));
    println!("📰 Article Forge v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));
    println!("Backend: {} | Model: {}", config.backend_url, config.model);
    println!("{}\n", "═".repeat(60));

    // First run: make sure there is something to reference
    let corpus = CorpusLoader::new(config.articles_dir.clone());
    corpus.ensure_bootstrapped().await?;
    info!("Reference articles read from {:?}", corpus.dir());

    let backend = Arc::new(OllamaBackend::new(&config));
    let state = AppState::new(config, backend);

    run_server(state).await
}
