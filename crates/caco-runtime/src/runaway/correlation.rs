//! Per-correlation call tracking with a raw-depth policy.
//!
//! Simpler sibling of [`RunawayRulesEngine`](super::rules::RunawayRulesEngine):
//! depth is the raw chain length (no collapsing) and the rate limit is an
//! owned [`RateAggregator`]. Suited to single-hop delegation.

use std::sync::Arc;

use caco_core::{Clock, CorrelationId};
use caco_settings::CorrelationSettings;
use serde::{Deserialize, Serialize};

use super::rate::RateAggregator;
use super::types::{CallMetrics, RunawayRule, RunawayVerdict};

/// Limits for [`CorrelationMetrics`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationConfig {
    /// Reject once the chain has this many entries.
    pub max_depth: usize,
    /// Context expires after this many seconds.
    pub max_age_seconds: u64,
    /// Rate limit: calls per window.
    pub rate_max_calls: usize,
    /// Rate limit: window length in seconds.
    pub rate_window_seconds: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self::from(&CorrelationSettings::default())
    }
}

impl From<&CorrelationSettings> for CorrelationConfig {
    fn from(s: &CorrelationSettings) -> Self {
        Self {
            max_depth: s.max_depth,
            max_age_seconds: s.max_age_seconds,
            rate_max_calls: s.rate_limit.max_calls,
            rate_window_seconds: s.rate_limit.window_seconds,
        }
    }
}

/// Point-in-time view of a correlation context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationSnapshot {
    /// Correlation id.
    pub correlation_id: CorrelationId,
    /// Number of chain entries.
    pub chain_length: usize,
    /// Chain in hop order.
    pub chain: Vec<String>,
    /// Whole seconds since the context was created.
    pub age_seconds: u64,
}

/// Chain, timestamps and policy for one correlation id.
pub struct CorrelationMetrics {
    correlation_id: CorrelationId,
    metrics: CallMetrics,
    config: CorrelationConfig,
    rate: RateAggregator,
    clock: Arc<dyn Clock>,
}

impl CorrelationMetrics {
    /// New context starting now.
    pub fn new(
        correlation_id: CorrelationId,
        config: CorrelationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rate = RateAggregator::new(config.rate_max_calls, config.rate_window_seconds);
        Self {
            correlation_id,
            metrics: CallMetrics::starting_at(clock.now_ms()),
            config,
            rate,
            clock,
        }
    }

    /// Seed the chain with the originating participant.
    ///
    /// The origin is not a call, so no timestamp is recorded for it.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.metrics.chain.push(origin.into());
        self
    }

    /// Append a hop to the chain and stamp it.
    pub fn record_call(&mut self, id: impl Into<String>) {
        let now = self.clock.now_ms();
        self.metrics.chain.push(id.into());
        self.metrics.call_timestamps_ms.push(now);
        self.rate.record_call(now);
    }

    /// Whether a call to `id` may be added.
    pub fn is_allowed(&mut self, id: &str) -> RunawayVerdict {
        let len = self.metrics.chain.len();
        if len >= self.config.max_depth {
            return RunawayVerdict::reject(
                RunawayRule::Depth,
                format!(
                    "Max depth reached: chain length {len} >= {} (refusing call to '{id}')",
                    self.config.max_depth
                ),
            );
        }
        let recent = self.rate.call_count(self.clock.now_ms());
        if recent >= self.rate.max_calls() {
            return RunawayVerdict::reject(
                RunawayRule::Rate,
                format!(
                    "Rate limit exceeded: {recent} calls in {}s (max {}, refusing call to '{id}')",
                    self.rate.window_seconds(),
                    self.rate.max_calls()
                ),
            );
        }
        RunawayVerdict::Allowed
    }

    /// Whether the context is older than `max_age_seconds`.
    pub fn is_expired(&self) -> bool {
        self.age_ms() > super::secs_to_ms(self.config.max_age_seconds)
    }

    /// Snapshot for reporting.
    pub fn snapshot(&self) -> CorrelationSnapshot {
        CorrelationSnapshot {
            correlation_id: self.correlation_id.clone(),
            chain_length: self.metrics.chain.len(),
            chain: self.metrics.chain.clone(),
            age_seconds: (self.age_ms().max(0) / 1000) as u64,
        }
    }

    /// The raw metrics, as consumed by
    /// [`RunawayRulesEngine::check_call`](super::rules::RunawayRulesEngine::check_call).
    pub fn call_metrics(&self) -> &CallMetrics {
        &self.metrics
    }

    /// Correlation id.
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    fn age_ms(&self) -> i64 {
        self.clock.now_ms().saturating_sub(self.metrics.start_time_ms)
    }
}

impl std::fmt::Debug for CorrelationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationMetrics")
            .field("correlation_id", &self.correlation_id)
            .field("metrics", &self.metrics)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
