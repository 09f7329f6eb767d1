//! Per-connection push channel loop
//!
//! Each connection registers on entry and runs a reader and a writer side by
//! side until either ends. The registry guard is dropped and the sink closed
//! on every exit path. Socket writes are bounded by the broadcaster's send
//! timeout, so a stalled peer ends its own channel.

use std::{fmt::Display, sync::Arc};

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::registry::{ConnectionRegistry, Role};
use crate::{
    engine::TimerService,
    error::{Result, TimerError},
    state::{ClientCommand, Timer},
};

/// Drive one push channel until the remote side closes, a read or write
/// fails, a write stalls past the send timeout, or the registry drops the
/// channel.
///
/// Inbound text frames are decoded into commands and dispatched to the timer
/// service. Decoding and command failures are logged and the frame dropped;
/// they never close the channel.
pub async fn serve_channel<W, R, E>(
    mut sink: W,
    mut stream: R,
    session_id: String,
    role: Role,
    registry: Arc<ConnectionRegistry>,
    service: Arc<TimerService>,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
    R: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: Display,
{
    let (guard, mut outbound) = registry.register(&session_id, role);
    let channel = guard.key().id;
    let write_timeout = service.broadcaster().send_timeout();
    info!(channel, session_id = %session_id, %role, "Push channel connected");

    let writer = async {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!(channel, error = %e, "Failed to encode outbound message");
                    continue;
                }
            };
            match timeout(write_timeout, sink.send(Message::Text(text))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let e = TimerError::Transport(e.to_string());
                    warn!(channel, error = %e, "Push channel write failed");
                    break;
                }
                Err(_) => {
                    warn!(
                        channel,
                        timeout_ms = write_timeout.as_millis() as u64,
                        "Push channel write timed out"
                    );
                    break;
                }
            }
        }
    };

    let reader = async {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    handle_frame(&service, channel, &session_id, &text).await;
                }
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => handle_frame(&service, channel, &session_id, text).await,
                    Err(_) => warn!(channel, "Ignoring non UTF-8 binary frame"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    let e = TimerError::Transport(e.to_string());
                    warn!(channel, error = %e, "Push channel read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => debug!(channel, "Writer finished"),
        _ = reader => debug!(channel, "Reader finished"),
    }

    drop(guard);
    match timeout(write_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(channel, error = %e, "Failed to close push channel"),
        Err(_) => debug!(channel, "Timed out closing push channel"),
    }
    info!(channel, session_id = %session_id, %role, "Push channel disconnected");
}

async fn handle_frame(service: &TimerService, channel: u64, session_id: &str, text: &str) {
    let command = match ClientCommand::decode(text) {
        Ok(command) => command,
        Err(e) if e.is_ignorable() => {
            warn!(channel, session_id, error = %e, "Ignoring message");
            return;
        }
        Err(e) => {
            error!(channel, session_id, error = %e, "Dropping undecodable message");
            return;
        }
    };

    let kind = command.message_type().as_str();
    match dispatch(service, command).await {
        Ok(Some(timer)) => debug!(channel, kind, id = timer.id, "Command applied"),
        Ok(None) => debug!(channel, kind, "Command applied"),
        Err(e) => error!(channel, session_id, kind, error = %e, "Command failed"),
    }
}

/// Run a decoded command against the service. Broadcasting is the service's
/// job, so nothing is written back here.
pub async fn dispatch(service: &TimerService, command: ClientCommand) -> Result<Option<Timer>> {
    let timer = match command {
        ClientCommand::Create(req) => service.create(&req.session_id, req.max_time).await?,
        ClientCommand::Pause(p) => service.pause(p.id).await?,
        ClientCommand::Resume(p) => service.resume(p.id).await?,
        ClientCommand::Modify(p) => service.modify(p.id, p.new_max_time).await?,
        ClientCommand::Stop(p) => {
            service.stop(p.id).await?;
            return Ok(None);
        }
    };
    Ok(Some(timer))
}
