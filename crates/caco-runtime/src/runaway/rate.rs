//! Sliding-window call counter.

use std::collections::VecDeque;

/// Counts calls inside a trailing window of `window_seconds`.
#[derive(Clone, Debug)]
pub struct RateAggregator {
    max_calls: usize,
    window_seconds: u64,
    window_ms: i64,
    calls: VecDeque<i64>,
}

impl RateAggregator {
    /// Allow at most `max_calls` per `window_seconds`.
    pub fn new(max_calls: usize, window_seconds: u64) -> Self {
        Self {
            max_calls,
            window_seconds,
            window_ms: super::secs_to_ms(window_seconds),
            calls: VecDeque::new(),
        }
    }

    /// Record a call at `timestamp_ms`.
    pub fn record_call(&mut self, timestamp_ms: i64) {
        self.calls.push_back(timestamp_ms);
    }

    /// Calls within `[now - window, now]`. Older entries are dropped.
    pub fn call_count(&mut self, now_ms: i64) -> usize {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        self.calls.retain(|t| *t >= cutoff);
        self.calls.iter().filter(|t| **t <= now_ms).count()
    }

    /// Whether another call fits in the window.
    pub fn is_allowed(&mut self, now_ms: i64) -> bool {
        self.call_count(now_ms) < self.max_calls
    }

    /// Forget all recorded calls.
    pub fn reset(&mut self) {
        self.calls.clear();
    }

    /// Configured maximum.
    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Configured window in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }
}
