//! Push-channel upgrade endpoints

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    response::Response,
};
use futures::StreamExt;

use crate::{
    realtime::{serve_channel, Role},
    state::AppState,
};

/// Handle GET /ws/owner/:session_id - Channel scoped to one session
pub async fn owner_socket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    upgrade(ws, session_id, Role::Owner, state)
}

/// Handle GET /ws/supervisor/:session_id - Channel that sees every timer
pub async fn supervisor_socket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    upgrade(ws, session_id, Role::Supervisor, state)
}

fn upgrade(ws: WebSocketUpgrade, session_id: String, role: Role, state: Arc<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        serve_channel(
            sink,
            stream,
            session_id,
            role,
            Arc::clone(&state.registry),
            Arc::clone(&state.timers),
        )
        .await;
    })
}
