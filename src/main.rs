use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use paper_qa::api;
use paper_qa::config::Config;
use paper_qa::state::AppState;

/// Largest accepted upload. Scanned papers with embedded page images run
/// tens of megabytes.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "LLM provider: {} ({})",
        config.llm.provider,
        config.llm.base_url
    );
    tracing::info!(
        "Vector index: '{}' at {} (hybrid {:?})",
        config.index.name,
        config.index.base_url,
        config.index.hybrid_mode
    );

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        // Document lifecycle
        .route("/documents/upload", post(api::documents::upload))
        .route("/documents/list", get(api::documents::list))
        .route("/documents/remove", delete(api::documents::remove))
        // Index administration
        .route("/index/stats", get(api::admin::stats))
        .route("/index/clear", delete(api::admin::clear))
        .route("/index/delete", delete(api::admin::delete))
        .route("/index/recreate", post(api::admin::recreate))
        .route("/index/fix-metadata", post(api::admin::fix_metadata))
        // Question answering
        .route("/qa/ask", post(api::qa::ask))
        .route("/health", get(api::health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
