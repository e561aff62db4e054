//! Composite runaway rules: depth, duration, rate.
//!
//! The engine holds only its limits. Chain, start time and call timestamps
//! come from the caller on every check, so one engine serves every
//! correlation flow.

use caco_settings::RunawaySettings;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::chain::effective_depth_with;
use super::types::{CallMetrics, RunawayRule, RunawayVerdict};

/// Limits applied by [`RunawayRulesEngine`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunawayLimits {
    /// Maximum effective (collapsed) chain depth.
    pub max_depth: usize,
    /// Maximum flow age in seconds.
    pub max_duration_seconds: u64,
    /// Calls allowed within one rate window.
    pub max_calls_per_window: usize,
    /// Rate window in seconds.
    pub rate_window_seconds: u64,
}

impl Default for RunawayLimits {
    fn default() -> Self {
        Self::from(&RunawaySettings::default())
    }
}

impl From<&RunawaySettings> for RunawayLimits {
    fn from(s: &RunawaySettings) -> Self {
        Self {
            max_depth: s.max_depth,
            max_duration_seconds: s.max_duration_seconds,
            max_calls_per_window: s.max_calls_per_window,
            rate_window_seconds: s.rate_window_seconds,
        }
    }
}

/// Partial update for [`RunawayLimits`]; `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsPatch {
    /// New maximum depth.
    pub max_depth: Option<usize>,
    /// New maximum duration in seconds.
    pub max_duration_seconds: Option<u64>,
    /// New calls-per-window limit.
    pub max_calls_per_window: Option<usize>,
    /// New rate window in seconds.
    pub rate_window_seconds: Option<u64>,
}

/// Stateless evaluator of the runaway rules.
#[derive(Debug, Default)]
pub struct RunawayRulesEngine {
    limits: RwLock<RunawayLimits>,
}

impl RunawayRulesEngine {
    /// Engine with the given limits.
    pub fn new(limits: RunawayLimits) -> Self {
        Self {
            limits: RwLock::new(limits),
        }
    }

    /// Merge `patch` into the current limits.
    pub fn set_limits(&self, patch: &LimitsPatch) {
        let mut limits = self.limits.write();
        if let Some(v) = patch.max_depth {
            limits.max_depth = v;
        }
        if let Some(v) = patch.max_duration_seconds {
            limits.max_duration_seconds = v;
        }
        if let Some(v) = patch.max_calls_per_window {
            limits.max_calls_per_window = v;
        }
        if let Some(v) = patch.rate_window_seconds {
            limits.rate_window_seconds = v;
        }
        debug!(limits = ?*limits, "runaway limits updated");
    }

    /// Copy of the current limits.
    pub fn limits(&self) -> RunawayLimits {
        self.limits.read().clone()
    }

    /// Decide whether `new_id` may be added to the flow described by `metrics`.
    ///
    /// Rules are checked in order depth, timeout, rate; the first failure is
    /// reported. Exactly-at-limit passes every rule.
    pub fn check_call(&self, metrics: &CallMetrics, new_id: &str, now_ms: i64) -> RunawayVerdict {
        let limits = self.limits.read().clone();

        let depth = effective_depth_with(&metrics.chain, new_id);
        if depth > limits.max_depth {
            return reject(
                RunawayRule::Depth,
                format!(
                    "depth limit exceeded: calling '{new_id}' reaches effective depth {depth} \
                     (max {})",
                    limits.max_depth
                ),
            );
        }

        let elapsed_ms = now_ms.saturating_sub(metrics.start_time_ms);
        let max_duration_ms = super::secs_to_ms(limits.max_duration_seconds);
        if elapsed_ms > max_duration_ms {
            return reject(
                RunawayRule::Timeout,
                format!(
                    "timeout: delegation flow running for {elapsed_ms}ms exceeds {}s",
                    limits.max_duration_seconds
                ),
            );
        }

        let window_start = now_ms.saturating_sub(super::secs_to_ms(limits.rate_window_seconds));
        let recent = metrics
            .call_timestamps_ms
            .iter()
            .filter(|t| **t >= window_start && **t <= now_ms)
            .count();
        if recent >= limits.max_calls_per_window {
            return reject(
                RunawayRule::Rate,
                format!(
                    "rate limit exceeded: {recent} calls in the last {}s (max {})",
                    limits.rate_window_seconds, limits.max_calls_per_window
                ),
            );
        }

        RunawayVerdict::Allowed
    }
}

fn reject(rule: RunawayRule, reason: String) -> RunawayVerdict {
    debug!(rule = rule.as_str(), %reason, "runaway check rejected call");
    RunawayVerdict::reject(rule, reason)
}
