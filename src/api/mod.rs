pub mod admin;
pub mod documents;
pub mod qa;

use axum::extract::State;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// GET /health — liveness plus readiness of the pipeline pieces.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        embeddings_cached: state.lexical.is_fitted(),
        vector_store_initialized: state.index.hybrid_resolved(),
        qa_chain_initialized: !state.config.llm.chat_model.is_empty(),
    })
}
