//! Agent-to-agent tool results.
//!
//! A delegated session answers with a string. When that string is a JSON
//! object carrying a `response` field it also carries dispatch telemetry;
//! anything else is plain text.

use serde::{Deserialize, Serialize};

/// Telemetry-bearing reply from a delegated session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReply {
    /// Human-visible response text.
    pub response: String,
    /// Session that produced the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Correlation the reply belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Chain length at the time of the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_length: Option<usize>,
    /// Wall-clock time spent in the delegated session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// A reply string, classified.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentReply {
    /// Anything that is not a structured reply.
    PlainText(String),
    /// JSON object with a `response` field.
    Structured(StructuredReply),
}

impl AgentReply {
    /// Classify `raw`. Never fails: unparseable input is plain text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        if !trimmed.starts_with('{') {
            return Self::PlainText(raw.to_owned());
        }
        match serde_json::from_str::<StructuredReply>(trimmed) {
            Ok(reply) => Self::Structured(reply),
            Err(_) => Self::PlainText(raw.to_owned()),
        }
    }

    /// The text a user should see.
    pub fn text(&self) -> &str {
        match self {
            Self::PlainText(text) => text,
            Self::Structured(reply) => &reply.response,
        }
    }

    /// Telemetry, if any.
    pub fn structured(&self) -> Option<&StructuredReply> {
        match self {
            Self::PlainText(_) => None,
            Self::Structured(reply) => Some(reply),
        }
    }

    /// Render back to the string form it was parsed from.
    pub fn to_wire(&self) -> String {
        match self {
            Self::PlainText(text) => text.clone(),
            Self::Structured(reply) => {
                serde_json::to_string(reply).unwrap_or_else(|_| reply.response.clone())
            }
        }
    }
}
