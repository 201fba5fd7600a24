//! Question answering over the indexed papers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::llm::answer;
use crate::models::{AskMetadata, AskRequest, AskResponse};
use crate::search;
use crate::state::AppState;

/// POST /qa/ask — retrieval-augmented answer with ranked sources.
pub async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, String)> {
    // ── Step 1: Validate ──────────────────────────────────
    let question = req.question.trim().to_string();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question is required".to_string()));
    }
    let top_k = req.top_k.clamp(1, 100);

    // ── Step 2: Retrieve ──────────────────────────────────
    let retrieval = search::retrieve(&state, &question, top_k)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Retrieval failed: {e:#}"),
            )
        })?;

    tracing::info!(
        "Question matched {} candidate(s), kept {}{}",
        retrieval.total_candidates,
        retrieval.chunks.len(),
        if retrieval.reranked { " (reranked)" } else { "" }
    );

    // ── Step 3: Answer from the retrieved excerpts ────────
    let answer = answer::generate_answer(
        &state.http_client,
        &state.config.llm,
        &question,
        &retrieval.chunks,
    )
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Answer generation failed: {e:#}"),
        )
    })?;

    // ── Step 4: Shape the response ────────────────────────
    let sources = search::to_source_entries(&retrieval.chunks);
    let metadata = AskMetadata {
        total_sources: retrieval.total_candidates,
        model_used: state.config.llm.chat_model.clone(),
        reranked: retrieval.reranked,
    };

    Ok(Json(AskResponse {
        question,
        answer,
        sources,
        metadata,
    }))
}
