//! Shared application state threaded through every handler.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::index::client::IndexClient;
use crate::index::fitter::LexicalCorpus;

/// Everything a handler needs, built once at startup and cloned per
/// request. The expensive members sit behind `Arc`, so clones are cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    pub index: Arc<IndexClient>,
    pub lexical: Arc<LexicalCorpus>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(config.uploads_dir()).with_context(|| {
            format!(
                "Failed to create uploads directory {}",
                config.uploads_dir().display()
            )
        })?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;

        let index = Arc::new(IndexClient::new(
            http_client.clone(),
            config.index.clone(),
            config.llm.embedding_dim,
        ));

        Ok(Self {
            config,
            http_client,
            index,
            lexical: Arc::new(LexicalCorpus::new()),
        })
    }
}
