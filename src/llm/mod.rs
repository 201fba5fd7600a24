pub mod answer;
pub mod embeddings;
pub mod rerank;
