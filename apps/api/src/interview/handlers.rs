use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

use super::service::{
    EndInterviewResponse, SkipToCodeResponse, StartInterviewRequest, StartInterviewResponse,
    SubmitAnswerRequest, SubmitAnswerResponse,
};

/// POST /api/v1/interview/start
pub async fn handle_start(
    State(state): State<AppState>,
    Json(req): Json<StartInterviewRequest>,
) -> Result<Json<StartInterviewResponse>, AppError> {
    let response = state.interview.start_interview(req).await?;
    Ok(Json(response))
}

/// POST /api/v1/interview/answer
pub async fn handle_answer(
    State(state): State<AppState>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    let response = state.interview.submit_answer(req).await?;
    Ok(Json(response))
}

/// POST /api/v1/interview/:session_id/end
pub async fn handle_end(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<EndInterviewResponse>, AppError> {
    let response = state.interview.end_interview(session_id).await?;
    Ok(Json(response))
}

/// POST /api/v1/interview/:session_id/skip-to-code
pub async fn handle_skip_to_code(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SkipToCodeResponse>, AppError> {
    let response = state.interview.skip_to_code_section(session_id).await?;
    Ok(Json(response))
}
