use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where uploaded PDFs are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Chunking parameters
    pub chunking: ChunkingConfig,
    /// Vector index service configuration
    pub index: IndexConfig,
    /// LLM provider configuration (embeddings + answer generation)
    pub llm: LlmConfig,
    /// Cross-encoder reranker configuration
    pub reranker: RerankerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Configuration for the Pinecone-compatible vector index service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Data-plane base URL of the index host (upsert/query/stats/delete)
    pub base_url: String,
    /// Control-plane base URL (index create/delete). If None, the
    /// `/index/delete` and `/index/recreate` endpoints report a
    /// configuration error.
    pub control_url: Option<String>,
    /// Index name, used by control-plane operations
    pub name: String,
    /// Namespace for all vector operations ("" = default namespace)
    pub namespace: String,
    /// API key sent as the `Api-Key` header (only for managed services)
    pub api_key: Option<String>,
    /// Distance metric used when recreating the index
    pub metric: String,
    /// Whether combined dense+sparse queries are attempted
    pub hybrid_mode: HybridMode,
}

/// How the hybrid (dense+sparse) capability of the index is decided.
///
/// `Auto` trusts a single live probe query per process. A transient failure
/// during that probe disables hybrid until restart, so operators who know
/// their index can pin the answer with `On`/`Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HybridMode {
    Auto,
    On,
    Off,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5081".to_string(),
            control_url: Some("http://localhost:5080".to_string()),
            name: "papers".to_string(),
            namespace: String::new(),
            api_key: None,
            metric: "dotproduct".to_string(),
            hybrid_mode: HybridMode::Auto,
        }
    }
}

/// Configuration for the cross-encoder reranker sidecar (e.g. llama-server
/// with a reranker model). If `base_url` is None, retrieval order is used
/// as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL for the reranker API (e.g. "http://127.0.0.1:8082")
    pub base_url: Option<String>,
    /// Model name to send in the rerank request
    pub model: Option<String>,
    /// Request timeout in seconds (capped at 30)
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answer generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension; must match the index dimension
    pub embedding_dim: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            chunking: ChunkingConfig::default(),
            index: IndexConfig::default(),
            llm: LlmConfig::default(),
            reranker: RerankerConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            embedding_dim: 768,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("PAPER_QA_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("PAPER_QA_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(val) = std::env::var("PAPER_QA_CHUNK_SIZE") {
            if let Ok(v) = val.parse() {
                config.chunking.chunk_size = v;
            }
        }
        if let Ok(val) = std::env::var("PAPER_QA_CHUNK_OVERLAP") {
            if let Ok(v) = val.parse() {
                config.chunking.chunk_overlap = v;
            }
        }

        // Vector index
        if let Ok(url) = std::env::var("INDEX_BASE_URL") {
            config.index.base_url = url;
        }
        if let Ok(url) = std::env::var("INDEX_CONTROL_URL") {
            config.index.control_url = Some(url);
        }
        if let Ok(name) = std::env::var("INDEX_NAME") {
            config.index.name = name;
        }
        if let Ok(ns) = std::env::var("INDEX_NAMESPACE") {
            config.index.namespace = ns;
        }
        if let Ok(key) = std::env::var("INDEX_API_KEY") {
            config.index.api_key = Some(key);
        }
        if let Ok(metric) = std::env::var("INDEX_METRIC") {
            config.index.metric = metric;
        }
        if let Ok(mode) = std::env::var("INDEX_HYBRID_MODE") {
            match mode.to_lowercase().as_str() {
                "auto" => config.index.hybrid_mode = HybridMode::Auto,
                "on" | "true" | "enabled" => config.index.hybrid_mode = HybridMode::On,
                "off" | "false" | "disabled" => config.index.hybrid_mode = HybridMode::Off,
                other => tracing::warn!("Ignoring unknown INDEX_HYBRID_MODE value: {other}"),
            }
        }

        // LLM provider
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("LLM_EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }

        // Reranker
        if let Ok(url) = std::env::var("RERANKER_BASE_URL") {
            config.reranker.base_url = Some(url);
        }
        if let Ok(model) = std::env::var("RERANKER_MODEL") {
            config.reranker.model = Some(model);
        }
        if let Ok(val) = std::env::var("RERANKER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.reranker.timeout_secs = v.min(30);
            }
        }

        config
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}
