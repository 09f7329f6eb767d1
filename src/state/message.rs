//! Push-channel wire envelope and its typed payloads
//!
//! Every frame is `{"type": MessageType, "payload": ...}`. Outbound frames are
//! modelled by [`ServerMessage`]; inbound frames are decoded into
//! [`ClientCommand`] in two steps so an unknown `type` can be told apart from
//! a malformed payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::timer::{Timer, TimerId};
use crate::error::TimerError;

/// Discriminant of the wire envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    TimerUpdate,
    TimerCreate,
    TimerPause,
    TimerResume,
    TimerStop,
    TimerModify,
}

impl MessageType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TIMER_UPDATE" => Some(Self::TimerUpdate),
            "TIMER_CREATE" => Some(Self::TimerCreate),
            "TIMER_PAUSE" => Some(Self::TimerPause),
            "TIMER_RESUME" => Some(Self::TimerResume),
            "TIMER_STOP" => Some(Self::TimerStop),
            "TIMER_MODIFY" => Some(Self::TimerModify),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimerUpdate => "TIMER_UPDATE",
            Self::TimerCreate => "TIMER_CREATE",
            Self::TimerPause => "TIMER_PAUSE",
            Self::TimerResume => "TIMER_RESUME",
            Self::TimerStop => "TIMER_STOP",
            Self::TimerModify => "TIMER_MODIFY",
        }
    }
}

/// Undecoded envelope: the tag is kept as a raw string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// Body of `POST /timer` and payload of `TIMER_CREATE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimerRequest {
    pub session_id: String,
    pub max_time: i64,
}

/// Payload of `TIMER_PAUSE`, `TIMER_RESUME` and `TIMER_STOP` (both directions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerIdPayload {
    pub id: TimerId,
}

/// Payload of `TIMER_MODIFY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyTimerPayload {
    pub id: TimerId,
    pub new_max_time: i64,
}

/// Messages the server pushes to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    TimerUpdate(Timer),
    TimerStop(TimerIdPayload),
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::TimerUpdate(_) => MessageType::TimerUpdate,
            Self::TimerStop(_) => MessageType::TimerStop,
        }
    }
}

/// Commands a channel may send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Create(CreateTimerRequest),
    Pause(TimerIdPayload),
    Resume(TimerIdPayload),
    Stop(TimerIdPayload),
    Modify(ModifyTimerPayload),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("unknown message type {0:?}")]
    UnknownType(String),

    #[error("{} is not accepted from clients", .0.as_str())]
    NotACommand(MessageType),

    #[error("malformed {} payload: {source}", .kind.as_str())]
    Payload {
        kind: MessageType,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Unknown or server-only tags are ignored rather than treated as errors
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::UnknownType(_) | Self::NotACommand(_))
    }
}

impl From<DecodeError> for TimerError {
    fn from(e: DecodeError) -> Self {
        TimerError::Validation(e.to_string())
    }
}

impl ClientCommand {
    /// Decode a text frame into a command
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: WebSocketMessage =
            serde_json::from_str(text).map_err(DecodeError::Envelope)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: WebSocketMessage) -> Result<Self, DecodeError> {
        let kind = MessageType::parse(&envelope.kind)
            .ok_or_else(|| DecodeError::UnknownType(envelope.kind.clone()))?;
        let payload = envelope.payload;

        let command = match kind {
            MessageType::TimerCreate => Self::Create(decode_payload(kind, payload)?),
            MessageType::TimerPause => Self::Pause(decode_payload(kind, payload)?),
            MessageType::TimerResume => Self::Resume(decode_payload(kind, payload)?),
            MessageType::TimerStop => Self::Stop(decode_payload(kind, payload)?),
            MessageType::TimerModify => Self::Modify(decode_payload(kind, payload)?),
            MessageType::TimerUpdate => return Err(DecodeError::NotACommand(kind)),
        };
        Ok(command)
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Create(_) => MessageType::TimerCreate,
            Self::Pause(_) => MessageType::TimerPause,
            Self::Resume(_) => MessageType::TimerResume,
            Self::Stop(_) => MessageType::TimerStop,
            Self::Modify(_) => MessageType::TimerModify,
        }
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    kind: MessageType,
    payload: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|source| DecodeError::Payload { kind, source })
}
