//! Which sessions are currently dispatching, and under which correlation id.

use std::sync::Arc;

use caco_core::{Clock, CorrelationId};
use dashmap::DashMap;
use metrics::gauge;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One in-flight dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    /// Flow this dispatch belongs to.
    pub correlation_id: CorrelationId,
    /// Epoch milliseconds at `start`.
    pub started_at_ms: i64,
}

/// `session -> DispatchRecord`.
///
/// A session is busy exactly when it has a record, so the busy flag and the
/// correlation id can never disagree.
pub struct DispatchState {
    records: DashMap<String, DispatchRecord>,
    clock: Arc<dyn Clock>,
}

impl DispatchState {
    /// Empty state.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Record a dispatch for `session_id`, replacing any prior record.
    pub fn start(&self, session_id: &str, correlation_id: CorrelationId) {
        let record = DispatchRecord {
            correlation_id,
            started_at_ms: self.clock.now_ms(),
        };
        debug!(session_id, correlation_id = %record.correlation_id, "dispatch started");
        let _ = self.records.insert(session_id.to_owned(), record);
        self.update_gauge();
    }

    /// Drop the record for `session_id`. No-op if absent.
    pub fn end(&self, session_id: &str) {
        if let Some((_, record)) = self.records.remove(session_id) {
            debug!(
                session_id,
                correlation_id = %record.correlation_id,
                elapsed_ms = self.clock.now_ms() - record.started_at_ms,
                "dispatch ended"
            );
            self.update_gauge();
        }
    }

    /// Whether `session_id` is dispatching.
    pub fn is_busy(&self, session_id: &str) -> bool {
        self.records.contains_key(session_id)
    }

    /// Correlation id of the active dispatch.
    pub fn correlation_id(&self, session_id: &str) -> Option<CorrelationId> {
        self.records.get(session_id).map(|r| r.correlation_id.clone())
    }

    /// Full record of the active dispatch.
    pub fn dispatch(&self, session_id: &str) -> Option<DispatchRecord> {
        self.records.get(session_id).map(|r| r.clone())
    }

    /// Whether any session is dispatching under `correlation_id`.
    pub fn has_correlation(&self, correlation_id: &CorrelationId) -> bool {
        self.records.iter().any(|r| r.correlation_id == *correlation_id)
    }

    /// Number of sessions dispatching.
    pub fn active_count(&self) -> usize {
        self.records.len()
    }

    fn update_gauge(&self) {
        gauge!(crate::metrics::DISPATCHES_ACTIVE).set(self.records.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caco_core::ManualClock;

    fn state() -> (Arc<ManualClock>, DispatchState) {
        let clock = Arc::new(ManualClock::new(5_000));
        let state = DispatchState::new(clock.clone());
        (clock, state)
    }

    #[test]
    fn start_records_correlation_and_time() {
        let (_clock, state) = state();
        state.start("A", CorrelationId::from_raw("c1"));

        assert!(state.is_busy("A"));
        assert_eq!(state.correlation_id("A").unwrap().as_str(), "c1");
        assert_eq!(
            state.dispatch("A").unwrap(),
            DispatchRecord {
                correlation_id: CorrelationId::from_raw("c1"),
                started_at_ms: 5_000,
            }
        );
    }

    #[test]
    fn start_overwrites_prior_record() {
        let (clock, state) = state();
        state.start("A", CorrelationId::from_raw("c1"));
        clock.advance(100);
        state.start("A", CorrelationId::from_raw("c2"));

        let record = state.dispatch("A").unwrap();
        assert_eq!(record.correlation_id.as_str(), "c2");
        assert_eq!(record.started_at_ms, 5_100);
        assert_eq!(state.active_count(), 1);
    }

    #[test]
    fn end_is_idempotent() {
        let (_clock, state) = state();
        state.start("A", CorrelationId::from_raw("c1"));
        state.end("A");
        state.end("A");
        state.end("never-started");
        assert!(!state.is_busy("A"));
        assert_eq!(state.active_count(), 0);
    }

    #[test]
    fn busy_iff_correlation_id() {
        let (_clock, state) = state();
        state.start("A", CorrelationId::from_raw("c1"));
        state.start("B", CorrelationId::from_raw("c2"));
        state.end("B");

        for session in ["A", "B", "C"] {
            assert_eq!(state.is_busy(session), state.correlation_id(session).is_some());
            assert_eq!(state.is_busy(session), state.dispatch(session).is_some());
        }
    }

    #[test]
    fn has_correlation_tracks_live_dispatches() {
        let (_clock, state) = state();
        let flow = CorrelationId::from_raw("c1");
        state.start("A", flow.clone());
        state.start("B", flow.clone());
        assert!(state.has_correlation(&flow));
        assert!(!state.has_correlation(&CorrelationId::from_raw("c2")));

        state.end("A");
        assert!(state.has_correlation(&flow));
        state.end("B");
        assert!(!state.has_correlation(&flow));
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = DispatchRecord {
            correlation_id: CorrelationId::from_raw("c1"),
            started_at_ms: 42,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["correlationId"], "c1");
        assert_eq!(json["startedAtMs"], 42);
    }
}
