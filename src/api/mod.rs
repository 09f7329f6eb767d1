//! HTTP API module
//!
//! This module contains the HTTP endpoint handlers, the push-channel upgrade
//! endpoints and the response structures.

pub mod handlers;
pub mod responses;
pub mod ws;

use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;
use ws::{owner_socket_handler, supervisor_socket_handler};

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/timer", get(list_timers_handler).post(create_timer_handler))
        .route("/timer/:id", get(get_timer_handler))
        .route("/timer/:id/pause", put(pause_timer_handler))
        .route("/timer/:id/resume", put(resume_timer_handler))
        .route("/timer/:id/stop", put(stop_timer_handler))
        .route("/timer/:id/modify", put(modify_timer_handler))
        // Push channels
        .route("/ws/owner/:session_id", get(owner_socket_handler))
        .route("/ws/supervisor/:session_id", get(supervisor_socket_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
