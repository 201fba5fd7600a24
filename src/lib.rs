//! # paper-qa
//!
//! A Rust web service for indexing PDF papers and answering questions about
//! them with a hybrid retrieval pipeline: dense embeddings plus BM25 sparse
//! vectors in one external vector index, cross-encoder reranking, and
//! grounded LLM answer generation.
//!
//! ## Architecture
//!
//! Ingestion and question answering share the index in the middle:
//!
//! ```text
//!   ┌──────────────┐                          ┌──────────────┐
//!   │  PDF upload   │                          │   Question    │
//!   └──────┬───────┘                          └──────┬───────┘
//!          ▼                                         ▼
//!   ┌──────────────┐                          ┌──────────────┐
//!   │ Page extract  │                          │ Dual encode   │
//!   │   (lopdf)     │                          │ dense + BM25  │
//!   └──────┬───────┘                          └──────┬───────┘
//!          ▼                                         ▼
//!   ┌──────────────┐                          ┌──────────────┐
//!   │ Overlapping   │                          │ Hybrid query  │
//!   │ page chunks   │                          │  (α = 0.5)   │
//!   └──────┬───────┘                          └──────┬───────┘
//!          ▼                                         ▼
//!   ┌──────────────┐     ┌──────────────┐    ┌──────────────┐
//!   │ Dual encode   │────▶│ Vector index  │◀───│ Cross-encoder │
//!   │ dense + BM25  │     │ (batched     │    │   rerank      │
//!   └──────────────┘     │  upserts)    │    └──────┬───────┘
//!                        └──────────────┘           ▼
//!                                            ┌──────────────┐
//!                                            │ Grounded LLM  │
//!                                            │   answer      │
//!                                            └──────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, chunking, index, and LLM settings
//! - [`models`] - Shared data types: `Chunk`, `ChunkMetadata`, request/response types
//! - [`chunking`] - PDF page extraction (lopdf) and overlapping character-window chunking
//! - [`encode`] - Dual encoding of chunks and questions into dense + sparse vectors
//! - [`index`] - Vector index client (Pinecone-compatible REST) and the BM25 corpus fitter
//! - [`search`] - Retrieval pipeline: encode, query, rerank, shape sources
//! - [`llm::embeddings`] - Batch embedding generation via Ollama or OpenAI-compatible APIs
//! - [`llm::rerank`] - Cross-encoder reranking via an OpenAI-compatible `/v1/rerank` endpoint
//! - [`llm::answer`] - Grounded answer generation from retrieved excerpts
//! - [`sanitize`] - Depth-bounded metadata sanitizer for JSON responses
//! - [`api`] - Axum HTTP handlers for documents, index admin, QA, and health
//! - [`state`] - Shared application state holding config, HTTP client, index, and corpus

pub mod api;
pub mod chunking;
pub mod config;
pub mod encode;
pub mod index;
pub mod llm;
pub mod models;
pub mod sanitize;
pub mod search;
pub mod state;
