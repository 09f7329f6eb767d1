//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use tracing::info;

use super::responses::{ApiError, HealthResponse, ModifyTimerRequest, StopResponse};
use crate::{
    error::TimerError,
    state::{message::CreateTimerRequest, AppState, Timer, TimerId},
};

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(raw: &str) -> Result<TimerId, TimerError> {
    raw.parse()
        .map_err(|_| TimerError::validation(format!("invalid timer id: {}", raw)))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, TimerError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| TimerError::validation(rejection.body_text()))
}

/// Handle POST /timer - Create a running timer
pub async fn create_timer_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateTimerRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Timer>)> {
    let request = body(payload)?;
    let timer = state
        .timers
        .create(&request.session_id, request.max_time)
        .await?;
    Ok((StatusCode::CREATED, Json(timer)))
}

/// Handle GET /timer - List every live timer
pub async fn list_timers_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Timer>>> {
    Ok(Json(state.timers.list().await?))
}

/// Handle GET /timer/:id
pub async fn get_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Timer>> {
    let id = parse_id(&id)?;
    Ok(Json(state.timers.get(id).await?))
}

/// Handle PUT /timer/:id/pause
pub async fn pause_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Timer>> {
    let id = parse_id(&id)?;
    Ok(Json(state.timers.pause(id).await?))
}

/// Handle PUT /timer/:id/resume
pub async fn resume_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Timer>> {
    let id = parse_id(&id)?;
    Ok(Json(state.timers.resume(id).await?))
}

/// Handle PUT /timer/:id/stop - Delete the timer
pub async fn stop_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StopResponse>> {
    let id = parse_id(&id)?;
    state.timers.stop(id).await?;
    info!(id, "Stop endpoint called");
    Ok(Json(StopResponse::stopped()))
}

/// Handle PUT /timer/:id/modify - Reset to a new duration
pub async fn modify_timer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ModifyTimerRequest>, JsonRejection>,
) -> ApiResult<Json<Timer>> {
    let id = parse_id(&id)?;
    let request = body(payload)?;
    Ok(Json(state.timers.modify(id, request.max_time).await?))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(state.get_uptime(), state.registry.len()))
}
