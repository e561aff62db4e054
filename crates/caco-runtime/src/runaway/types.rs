//! Shared runaway-detection types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Accumulated state of one delegation flow, as consumed by the rules engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallMetrics {
    /// Participants in hop order, not deduplicated.
    pub chain: Vec<String>,
    /// When the flow began (epoch ms).
    pub start_time_ms: i64,
    /// One entry per recorded hop (epoch ms).
    pub call_timestamps_ms: Vec<i64>,
}

impl CallMetrics {
    /// Empty flow starting at `start_time_ms`.
    pub fn starting_at(start_time_ms: i64) -> Self {
        Self {
            chain: Vec::new(),
            start_time_ms,
            call_timestamps_ms: Vec::new(),
        }
    }
}

/// The rule that refused a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunawayRule {
    /// Chain too deep.
    Depth,
    /// Flow running too long.
    Timeout,
    /// Too many calls in the rate window.
    Rate,
}

impl RunawayRule {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::Timeout => "timeout",
            Self::Rate => "rate",
        }
    }
}

impl fmt::Display for RunawayRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a runaway check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunawayVerdict {
    /// The call may proceed.
    Allowed,
    /// The call must not proceed.
    Rejected {
        /// Which rule refused it.
        rule: RunawayRule,
        /// Human-readable reason naming the rule.
        reason: String,
    },
}

impl RunawayVerdict {
    pub(crate) fn reject(rule: RunawayRule, reason: String) -> Self {
        Self::Rejected { rule, reason }
    }

    /// Whether the call may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Rejection reason, if rejected.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Rejected { reason, .. } => Some(reason),
        }
    }

    /// Rejecting rule, if rejected.
    pub fn rule(&self) -> Option<RunawayRule> {
        match self {
            Self::Allowed => None,
            Self::Rejected { rule, .. } => Some(*rule),
        }
    }
}
