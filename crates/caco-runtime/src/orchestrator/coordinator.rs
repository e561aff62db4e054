//! Dispatch and agent-to-agent protocols over the safety components.
//!
//! One [`DispatchCoordinator`] per process owns one instance of every
//! component. Hosts construct it explicitly from [`CacoSettings`] and share
//! it by `Arc`.
//!
//! ## Dispatch
//!
//! ```text
//! begin_dispatch ─► cwd acquire + busy ─► DispatchState.start
//!       ... prompt runs, nested agent calls read the correlation id ...
//! end_dispatch   ─► DispatchState.end ─► cwd idle ─► unobserved.mark_idle
//! ```
//!
//! ## Agent-to-agent calls
//!
//! [`DispatchCoordinator::authorize_agent_call`] checks and records the hop
//! under the correlation registry lock, so two concurrent hops cannot both
//! pass a limit only one of them fits under.

use std::sync::Arc;

use caco_core::{AgentReply, Clock, CorrelationId, LateBound, QueuedEvent, StructuredReply};
use caco_settings::{CacoSettings, DelegationPolicy};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::cwd_lock::CwdLockManager;
use super::dispatch_state::DispatchState;
use super::event_queue::SessionEventQueues;
use super::meta_store::SessionMetaStore;
use super::unobserved::UnobservedTracker;
use crate::errors::RuntimeError;
use crate::runaway::correlation::{CorrelationConfig, CorrelationSnapshot};
use crate::runaway::registry::CorrelationRegistry;
use crate::runaway::rules::{RunawayLimits, RunawayRulesEngine};
use crate::runaway::types::RunawayVerdict;

/// Who produced a prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    /// A human through a client.
    User,
    /// Another agent session.
    Agent,
}

/// Outgoing message for an authorized agent-to-agent call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEnvelope {
    /// Prompt for the target session.
    pub prompt: String,
    /// Always [`MessageSource::Agent`] for envelopes built here.
    pub source: MessageSource,
    /// Calling session.
    pub from_session: String,
    /// Flow the call belongs to; the target dispatches under the same id.
    pub correlation_id: CorrelationId,
}

/// Process-wide owner of the dispatch safety components.
pub struct DispatchCoordinator {
    policy: DelegationPolicy,
    clock: Arc<dyn Clock>,
    cwd_locks: Arc<CwdLockManager>,
    dispatch: Arc<DispatchState>,
    rules: Arc<RunawayRulesEngine>,
    correlations: Arc<CorrelationRegistry>,
    unobserved: Arc<UnobservedTracker>,
    events: Arc<SessionEventQueues>,
}

impl DispatchCoordinator {
    /// Build every component from `settings`.
    pub fn new(
        settings: &CacoSettings,
        store: Arc<dyn SessionMetaStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dispatch_settings = &settings.dispatch;
        Self {
            policy: dispatch_settings.policy,
            cwd_locks: Arc::new(CwdLockManager::new()),
            dispatch: Arc::new(DispatchState::new(Arc::clone(&clock))),
            rules: Arc::new(RunawayRulesEngine::new(RunawayLimits::from(
                &dispatch_settings.runaway,
            ))),
            correlations: Arc::new(CorrelationRegistry::new(
                CorrelationConfig::from(&dispatch_settings.correlation),
                Arc::clone(&clock),
            )),
            unobserved: Arc::new(UnobservedTracker::new(store, Arc::clone(&clock))),
            events: Arc::new(SessionEventQueues::new()),
            clock,
        }
    }

    // ── dispatch lifecycle ──────────────────────────────────────────

    /// Claim `cwd`, mark `session_id` busy and record the dispatch.
    ///
    /// Uses `correlation_id` when the prompt continues an existing flow
    /// (an agent envelope), otherwise starts a fresh one. Fails only when a
    /// different busy session holds `cwd`; nothing is recorded then.
    #[instrument(skip(self))]
    pub fn begin_dispatch(
        &self,
        session_id: &str,
        cwd: &str,
        correlation_id: Option<CorrelationId>,
    ) -> Result<CorrelationId, RuntimeError> {
        self.cwd_locks.acquire_busy(cwd, session_id)?;
        let correlation_id = correlation_id.unwrap_or_default();
        self.dispatch.start(session_id, correlation_id.clone());
        Ok(correlation_id)
    }

    /// Finish the dispatch of `session_id`. Idempotent.
    ///
    /// The cwd lock stays with the session but becomes reclaimable.
    #[instrument(skip(self))]
    pub fn end_dispatch(&self, session_id: &str) {
        self.dispatch.end(session_id);
        self.cwd_locks.mark_idle(session_id);
        let _ = self.unobserved.mark_idle(session_id);
    }

    /// Forget `session_id` entirely (session deleted).
    #[instrument(skip(self))]
    pub fn release_session(&self, session_id: &str) {
        self.cwd_locks.release(session_id);
        self.dispatch.end(session_id);
        self.unobserved.remove(session_id);
        self.events.discard(session_id);
    }

    /// A client viewed `session_id`. Returns whether it was unobserved.
    pub fn observe(&self, session_id: &str) -> bool {
        self.unobserved.mark_observed(session_id)
    }

    // ── agent-to-agent gate ─────────────────────────────────────────

    /// Authorize `caller` to send `prompt` to `target`.
    ///
    /// The caller must be dispatching. The hop is checked against the
    /// configured policy and, on success, appended to the correlation chain
    /// before the envelope is returned.
    #[instrument(skip(self, prompt))]
    pub fn authorize_agent_call(
        &self,
        caller: &str,
        target: &str,
        prompt: impl Into<String>,
    ) -> Result<AgentEnvelope, RuntimeError> {
        let Some(correlation_id) = self.dispatch.correlation_id(caller) else {
            warn!(caller, target, "agent call outside of a dispatch");
            return Err(RuntimeError::NoCorrelationContext(caller.to_owned()));
        };

        let verdict = self.correlations.with_metrics(&correlation_id, caller, |metrics| {
            let verdict = match self.policy {
                DelegationPolicy::Runaway => {
                    self.rules
                        .check_call(metrics.call_metrics(), target, self.clock.now_ms())
                }
                DelegationPolicy::Simple => metrics.is_allowed(target),
            };
            if verdict.is_allowed() {
                metrics.record_call(target);
            }
            verdict
        });

        match verdict {
            RunawayVerdict::Allowed => {
                debug!(caller, target, correlation_id = %correlation_id, "agent call authorized");
                Ok(AgentEnvelope {
                    prompt: prompt.into(),
                    source: MessageSource::Agent,
                    from_session: caller.to_owned(),
                    correlation_id,
                })
            }
            RunawayVerdict::Rejected { rule, reason } => {
                counter!(crate::metrics::RUNAWAY_REJECTIONS_TOTAL, "rule" => rule.as_str())
                    .increment(1);
                warn!(
                    caller,
                    target,
                    correlation_id = %correlation_id,
                    rule = rule.as_str(),
                    %reason,
                    "agent call rejected"
                );
                Err(RuntimeError::Runaway { rule, reason })
            }
        }
    }

    /// [`authorize_agent_call`](Self::authorize_agent_call) with the caller id
    /// read through a late-bound slot.
    pub fn authorize_from(
        &self,
        caller: &LateBound<String>,
        target: &str,
        prompt: impl Into<String>,
    ) -> Result<AgentEnvelope, RuntimeError> {
        let caller = caller.require()?;
        self.authorize_agent_call(caller, target, prompt)
    }

    /// Structured reply of `target_session` to a call in `correlation_id`,
    /// stamped with the current chain length.
    pub fn reply(
        &self,
        target_session: &str,
        correlation_id: &CorrelationId,
        response: impl Into<String>,
        duration_ms: u64,
    ) -> AgentReply {
        AgentReply::Structured(StructuredReply {
            response: response.into(),
            session_id: Some(target_session.to_owned()),
            correlation_id: Some(correlation_id.to_string()),
            chain_length: self.correlations.snapshot(correlation_id).map(|s| s.chain_length),
            duration_ms: Some(duration_ms),
        })
    }

    /// Drop expired correlation contexts of flows no session is dispatching.
    ///
    /// A context still referenced by a dispatch is kept, so its timeout and
    /// history keep applying to the running flow.
    pub fn sweep_expired(&self) -> Vec<CorrelationId> {
        self.correlations.sweep_expired_except(|id| self.dispatch.has_correlation(id))
    }

    /// Snapshot of one correlation context.
    pub fn correlation(&self, correlation_id: &CorrelationId) -> Option<CorrelationSnapshot> {
        self.correlations.snapshot(correlation_id)
    }

    // ── synthetic events ────────────────────────────────────────────

    /// Hold `event` for `session_id` until the next turn boundary.
    pub fn queue_event(&self, session_id: &str, event: QueuedEvent) {
        self.events.queue(session_id, event);
    }

    /// Events to emit immediately before an event of `event_type`.
    pub fn take_events_before(&self, session_id: &str, event_type: &str) -> Vec<QueuedEvent> {
        self.events.take_if_trigger(session_id, event_type)
    }

    // ── accessors ───────────────────────────────────────────────────

    /// Active delegation policy.
    pub fn policy(&self) -> DelegationPolicy {
        self.policy
    }

    /// Cwd lock manager.
    pub fn cwd_locks(&self) -> &Arc<CwdLockManager> {
        &self.cwd_locks
    }

    /// Dispatch state.
    pub fn dispatch_state(&self) -> &Arc<DispatchState> {
        &self.dispatch
    }

    /// Runaway rules engine.
    pub fn rules(&self) -> &Arc<RunawayRulesEngine> {
        &self.rules
    }

    /// Correlation registry.
    pub fn correlations(&self) -> &Arc<CorrelationRegistry> {
        &self.correlations
    }

    /// Unobserved tracker.
    pub fn unobserved(&self) -> &Arc<UnobservedTracker> {
        &self.unobserved
    }

    /// Per-session event queues.
    pub fn events(&self) -> &Arc<SessionEventQueues> {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CwdLockedError;
    use crate::orchestrator::meta_store::InMemorySessionMetaStore;
    use crate::runaway::types::RunawayRule;
    use assert_matches::assert_matches;
    use caco_core::ManualClock;
    use caco_core::events::{ASSISTANT_MESSAGE_DELTA, TOOL_EXECUTION_COMPLETE};
    use serde_json::json;

    fn coordinator_with(settings: &CacoSettings) -> (Arc<ManualClock>, DispatchCoordinator) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(InMemorySessionMetaStore::new());
        let coordinator = DispatchCoordinator::new(settings, store, clock.clone());
        (clock, coordinator)
    }

    fn coordinator() -> (Arc<ManualClock>, DispatchCoordinator) {
        coordinator_with(&CacoSettings::default())
    }

    #[test]
    fn begin_dispatch_marks_busy_and_records() {
        let (_clock, c) = coordinator();
        let id = c.begin_dispatch("A", "/w", None).unwrap();

        assert!(c.dispatch_state().is_busy("A"));
        assert_eq!(c.dispatch_state().correlation_id("A"), Some(id));
        assert!(c.cwd_locks().is_busy("A"));
        assert_eq!(c.cwd_locks().holder("/w").as_deref(), Some("A"));
    }

    #[test]
    fn begin_dispatch_reuses_given_correlation() {
        let (_clock, c) = coordinator();
        let given = CorrelationId::from_raw("corr_flow");
        let id = c.begin_dispatch("A", "/w", Some(given.clone())).unwrap();
        assert_eq!(id, given);
    }

    #[test]
    fn busy_cwd_rejects_second_session() {
        let (_clock, c) = coordinator();
        let _ = c.begin_dispatch("A", "/w", None).unwrap();

        let err = c.begin_dispatch("B", "/w", None).unwrap_err();
        assert_matches!(
            err,
            RuntimeError::CwdLocked(CwdLockedError { ref session_id }) if session_id == "A"
        );
        assert!(!c.dispatch_state().is_busy("B"));
        assert!(!c.cwd_locks().is_busy("B"));
    }

    #[test]
    fn end_dispatch_makes_cwd_reclaimable_and_session_unobserved() {
        let (_clock, c) = coordinator();
        let _ = c.begin_dispatch("A", "/w", None).unwrap();
        c.end_dispatch("A");
        c.end_dispatch("A");

        assert!(!c.dispatch_state().is_busy("A"));
        assert!(c.unobserved().is_unobserved("A"));
        assert_eq!(c.unobserved().count(), 1);

        let _ = c.begin_dispatch("B", "/w", None).unwrap();
        assert_eq!(c.cwd_locks().holder("/w").as_deref(), Some("B"));
    }

    #[test]
    fn observe_clears_unobserved() {
        let (_clock, c) = coordinator();
        let _ = c.begin_dispatch("A", "/w", None).unwrap();
        c.end_dispatch("A");
        assert!(c.observe("A"));
        assert!(!c.observe("A"));
    }

    #[test]
    fn release_session_forgets_everything() {
        let (_clock, c) = coordinator();
        let _ = c.begin_dispatch("A", "/w", None).unwrap();
        c.queue_event("A", QueuedEvent::new("caco.embed", json!({})));
        c.end_dispatch("A");

        c.release_session("A");
        assert!(c.cwd_locks().holder("/w").is_none());
        assert!(!c.unobserved().is_unobserved("A"));
        assert_eq!(c.events().pending("A"), 0);
        c.release_session("A");
    }

    #[test]
    fn agent_call_requires_dispatch() {
        let (_clock, c) = coordinator();
        let err = c.authorize_agent_call("A", "B", "hi").unwrap_err();
        assert_eq!(err, RuntimeError::NoCorrelationContext("A".into()));
        assert_eq!(err.category(), "no_correlation_context");
    }

    #[test]
    fn agent_call_builds_envelope_and_records_hop() {
        let (_clock, c) = coordinator();
        let id = c.begin_dispatch("A", "/a", None).unwrap();

        let envelope = c.authorize_agent_call("A", "B", "summarize").unwrap();
        assert_eq!(
            envelope,
            AgentEnvelope {
                prompt: "summarize".into(),
                source: MessageSource::Agent,
                from_session: "A".into(),
                correlation_id: id.clone(),
            }
        );
        assert_eq!(c.correlation(&id).unwrap().chain, vec!["A", "B"]);
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = AgentEnvelope {
            prompt: "p".into(),
            source: MessageSource::Agent,
            from_session: "A".into(),
            correlation_id: CorrelationId::from_raw("corr_1"),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "prompt": "p",
                "source": "agent",
                "fromSession": "A",
                "correlationId": "corr_1",
            })
        );
    }

    #[test]
    fn runaway_policy_rejects_past_depth() {
        let (_clock, c) = coordinator();
        let id = c.begin_dispatch("s1", "/1", None).unwrap();
        let sessions = ["s1", "s2", "s3", "s4", "s5"];
        for pair in sessions.windows(2) {
            let envelope = c.authorize_agent_call(pair[0], pair[1], "go").unwrap();
            let _ = c
                .begin_dispatch(pair[1], &format!("/{}", pair[1]), Some(envelope.correlation_id))
                .unwrap();
        }
        assert_eq!(c.correlation(&id).unwrap().chain_length, 5);

        let err = c.authorize_agent_call("s5", "s6", "go").unwrap_err();
        assert_matches!(
            err,
            RuntimeError::Runaway { rule: RunawayRule::Depth, ref reason } if reason.contains("s6")
        );
        assert_eq!(c.correlation(&id).unwrap().chain_length, 5, "rejected hop not recorded");
    }

    #[test]
    fn runaway_policy_rejects_after_max_duration() {
        let (clock, c) = coordinator();
        let _ = c.begin_dispatch("A", "/a", None).unwrap();
        let _ = c.authorize_agent_call("A", "B", "first").unwrap();

        let max_ms = c.rules().limits().max_duration_seconds as i64 * 1000;
        clock.advance(max_ms + 1);
        let err = c.authorize_agent_call("A", "B", "again").unwrap_err();
        assert_matches!(err, RuntimeError::Runaway { rule: RunawayRule::Timeout, .. });
    }

    #[test]
    fn simple_policy_allows_single_hop_only() {
        let mut settings = CacoSettings::default();
        settings.dispatch.policy = DelegationPolicy::Simple;
        let (_clock, c) = coordinator_with(&settings);

        let _ = c.begin_dispatch("A", "/a", None).unwrap();
        let envelope = c.authorize_agent_call("A", "B", "go").unwrap();
        let _ = c.begin_dispatch("B", "/b", Some(envelope.correlation_id)).unwrap();

        let err = c.authorize_agent_call("B", "C", "go").unwrap_err();
        assert_matches!(err, RuntimeError::Runaway { rule: RunawayRule::Depth, .. });
    }

    #[test]
    fn authorize_from_late_bound_caller() {
        let (_clock, c) = coordinator();
        let caller = Arc::new(LateBound::new("session id"));

        let err = c.authorize_from(&caller, "B", "go").unwrap_err();
        assert_eq!(err.category(), "unresolved");

        let _ = c.begin_dispatch("A", "/a", None).unwrap();
        caller.resolve("A".to_owned()).unwrap();
        let envelope = c.authorize_from(&caller, "B", "go").unwrap();
        assert_eq!(envelope.from_session, "A");
    }

    #[test]
    fn reply_carries_chain_length() {
        let (_clock, c) = coordinator();
        let id = c.begin_dispatch("A", "/a", None).unwrap();
        let _ = c.authorize_agent_call("A", "B", "go").unwrap();

        let reply = c.reply("B", &id, "done", 1_200);
        let parsed = AgentReply::parse(&reply.to_wire());
        assert_eq!(parsed, reply);
        assert_eq!(parsed.text(), "done");
        assert_eq!(parsed.structured().unwrap().chain_length, Some(2));
    }

    #[test]
    fn sweep_expired_drops_old_contexts() {
        let mut settings = CacoSettings::default();
        settings.dispatch.correlation.max_age_seconds = 10;
        let (clock, c) = coordinator_with(&settings);
        let id = c.begin_dispatch("A", "/a", None).unwrap();
        let _ = c.authorize_agent_call("A", "B", "go").unwrap();

        clock.advance(10_001);
        c.end_dispatch("A");
        assert_eq!(c.sweep_expired(), vec![id.clone()]);
        assert!(c.correlation(&id).is_none());
    }

    #[test]
    fn sweep_keeps_running_flow_and_its_timeout() {
        let (clock, c) = coordinator();
        let id = c.begin_dispatch("A", "/a", None).unwrap();
        let _ = c.authorize_agent_call("A", "B", "go").unwrap();

        clock.advance(601_000);
        let err = c.authorize_agent_call("A", "B", "again").unwrap_err();
        assert_matches!(err, RuntimeError::Runaway { rule: RunawayRule::Timeout, .. });

        clock.advance(3_600_000);
        assert!(c.sweep_expired().is_empty());
        assert_eq!(c.correlation(&id).unwrap().chain, vec!["A", "B"]);

        let err = c.authorize_agent_call("A", "B", "again").unwrap_err();
        assert_matches!(err, RuntimeError::Runaway { rule: RunawayRule::Timeout, .. });

        c.end_dispatch("A");
        assert_eq!(c.sweep_expired(), vec![id]);
    }

    #[test]
    fn unvalidated_huge_limits_do_not_panic() {
        let mut settings = CacoSettings::default();
        settings.dispatch.runaway.rate_window_seconds = 10_000_000_000_000_000;
        settings.dispatch.runaway.max_duration_seconds = u64::MAX;
        settings.dispatch.correlation.max_age_seconds = u64::MAX;
        settings.dispatch.correlation.rate_limit.window_seconds = u64::MAX;
        let (clock, c) = coordinator_with(&settings);

        let _ = c.begin_dispatch("A", "/a", None).unwrap();
        let _ = c.authorize_agent_call("A", "B", "go").unwrap();
        clock.advance(1_000_000_000);
        let _ = c.authorize_agent_call("A", "B", "go").unwrap();
        assert!(c.sweep_expired().is_empty());
    }

    #[test]
    fn events_wait_for_turn_boundary() {
        let (_clock, c) = coordinator();
        let embed = QueuedEvent::new("caco.embed", json!({ "uri": "x" }));
        c.queue_event("A", embed.clone());

        assert!(c.take_events_before("A", TOOL_EXECUTION_COMPLETE).is_empty());
        assert_eq!(c.take_events_before("A", ASSISTANT_MESSAGE_DELTA), vec![embed]);
    }
}
