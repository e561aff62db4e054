//! Synthetic UI events and the event-type names of the streaming protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// First and subsequent streamed content deltas of an assistant response.
pub const ASSISTANT_MESSAGE_DELTA: &str = "assistant.message_delta";
/// Final complete assistant response.
pub const ASSISTANT_MESSAGE: &str = "assistant.message";
/// Terminal session error.
pub const SESSION_ERROR: &str = "session.error";
/// Session went idle after a turn.
pub const SESSION_IDLE: &str = "session.idle";
/// Tool execution began.
pub const TOOL_EXECUTION_START: &str = "tool.execution_start";
/// Tool execution finished.
pub const TOOL_EXECUTION_COMPLETE: &str = "tool.execution_complete";
/// Plain user message.
pub const USER_MESSAGE: &str = "user.message";

/// An event held back until the next turn boundary.
///
/// Serialized as `{"type": ..., "data": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    /// Event type string.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Arbitrary payload.
    #[serde(default)]
    pub data: Value,
}

impl QueuedEvent {
    /// Build an event from a type name and payload.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}
