//! Index administration endpoints.
//!
//! The destructive ones (clear, delete, recreate) also reset the fitted
//! lexical corpus: its term statistics describe data that no longer exists.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::models::{AdminResponse, FixMetadataResponse, IndexStats, RecreateRequest};
use crate::state::AppState;

/// GET /index/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<IndexStats>, (StatusCode, String)> {
    state.index.stats().await.map(Json).map_err(internal)
}

/// DELETE /index/clear — delete every vector, keep the index itself.
pub async fn clear(State(state): State<AppState>) -> Result<Json<AdminResponse>, (StatusCode, String)> {
    state.index.clear().await.map_err(internal)?;
    state.lexical.reset();
    tracing::info!("Cleared all vectors from index '{}'", state.index.name());
    Ok(Json(AdminResponse {
        success: true,
        message: format!("All vectors deleted from index '{}'", state.index.name()),
    }))
}

/// DELETE /index/delete — drop the index entirely.
pub async fn delete(State(state): State<AppState>) -> Result<Json<AdminResponse>, (StatusCode, String)> {
    state.index.drop_index().await.map_err(internal)?;
    state.lexical.reset();
    Ok(Json(AdminResponse {
        success: true,
        message: format!("Index '{}' deleted", state.index.name()),
    }))
}

/// POST /index/recreate — drop and create fresh. The optional body may
/// override the configured distance metric.
pub async fn recreate(
    State(state): State<AppState>,
    body: Option<Json<RecreateRequest>>,
) -> Result<Json<AdminResponse>, (StatusCode, String)> {
    let metric = body.and_then(|Json(req)| req.metric);

    state.index.drop_index().await.map_err(internal)?;
    state
        .index
        .create_index(metric.as_deref())
        .await
        .map_err(internal)?;
    state.lexical.reset();

    Ok(Json(AdminResponse {
        success: true,
        message: format!("Index '{}' recreated", state.index.name()),
    }))
}

/// POST /index/fix-metadata — backfill the canonical `text` metadata key on
/// records indexed before it existed.
pub async fn fix_metadata(
    State(state): State<AppState>,
) -> Result<Json<FixMetadataResponse>, (StatusCode, String)> {
    let (chunks_updated, documents_updated) =
        state.index.repair_metadata().await.map_err(internal)?;

    Ok(Json(FixMetadataResponse {
        success: true,
        message: format!(
            "Repaired text metadata on {chunks_updated} chunk(s) across {documents_updated} document(s)"
        ),
        documents_updated,
    }))
}

fn internal(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}
