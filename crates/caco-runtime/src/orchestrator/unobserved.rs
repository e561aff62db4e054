//! Sessions that went idle without a client viewing them.
//!
//! The in-memory set is a cache of the persisted `lastIdleAt` /
//! `lastObservedAt` condition. It is rebuilt from the store once per process
//! by [`UnobservedTracker::hydrate`]; after that the cache is authoritative
//! and store failures are only logged.
//!
//! State changes are applied under the lock, which is released before the
//! store write and the broadcast. A broadcast sink may therefore call back
//! into the tracker.
//!
//! Notices are delivered one at a time and each carries the count read at
//! delivery, so the last notice a sink receives matches the final state.

use std::collections::HashSet;
use std::sync::Arc;

use caco_core::Clock;
use metrics::gauge;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::meta_store::{SessionMetaPatch, SessionMetaStore};

/// Payload sent to the broadcast sink whenever the set changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnobservedNotice {
    /// Number of unobserved sessions after the change.
    pub count: usize,
}

type BroadcastFn = Arc<dyn Fn(UnobservedNotice) + Send + Sync>;

#[derive(Default)]
struct TrackerState {
    sessions: HashSet<String>,
    hydrated: bool,
}

/// Tracks unobserved sessions and notifies a sink on every change.
pub struct UnobservedTracker {
    store: Arc<dyn SessionMetaStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
    broadcast: RwLock<Option<BroadcastFn>>,
    /// Serializes count reads with their delivery. Reentrant so a sink may
    /// change the set from inside its callback.
    delivery: ReentrantMutex<()>,
}

impl UnobservedTracker {
    /// Empty, unhydrated tracker.
    pub fn new(store: Arc<dyn SessionMetaStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            state: Mutex::new(TrackerState::default()),
            broadcast: RwLock::new(None),
            delivery: ReentrantMutex::new(()),
        }
    }

    /// Install the notification sink, replacing any previous one.
    pub fn set_broadcast(&self, sink: impl Fn(UnobservedNotice) + Send + Sync + 'static) {
        *self.broadcast.write() = Some(Arc::new(sink));
    }

    /// Rebuild the set from persisted metadata. Runs once; later calls are
    /// no-ops returning the current count.
    ///
    /// Sessions whose metadata cannot be read are skipped.
    #[instrument(skip_all)]
    pub fn hydrate<I, S>(&self, session_ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        {
            let mut state = self.state.lock();
            if state.hydrated {
                return state.sessions.len();
            }
            // Claim the run before reading the store so concurrent callers
            // do not hydrate twice.
            state.hydrated = true;
        }

        let mut found = Vec::new();
        for id in session_ids {
            let id = id.as_ref();
            match self.store.get_session_meta(id) {
                Ok(Some(meta)) if meta.is_unobserved() => found.push(id.to_owned()),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        session_id = id,
                        error = %e,
                        "failed to read session meta during hydrate"
                    );
                }
            }
        }

        let count = {
            let mut state = self.state.lock();
            state.sessions.extend(found);
            state.sessions.len()
        };
        info!(count, "unobserved sessions hydrated");
        self.set_gauge(count);
        count
    }

    /// Track `session_id` as idle and unviewed.
    ///
    /// Returns `false` if it was already tracked; nothing is persisted or
    /// broadcast in that case.
    pub fn mark_idle(&self, session_id: &str) -> bool {
        let count = {
            let mut state = self.state.lock();
            if !state.sessions.insert(session_id.to_owned()) {
                return false;
            }
            state.sessions.len()
        };
        debug!(session_id, count, "session unobserved");
        self.persist(session_id, SessionMetaPatch::idle_at(self.clock.now_ms()));
        self.notify();
        true
    }

    /// Untrack `session_id` because a client viewed it.
    ///
    /// Returns `false` if it was not tracked.
    pub fn mark_observed(&self, session_id: &str) -> bool {
        let count = {
            let mut state = self.state.lock();
            if !state.sessions.remove(session_id) {
                return false;
            }
            state.sessions.len()
        };
        debug!(session_id, count, "session observed");
        self.persist(session_id, SessionMetaPatch::observed_at(self.clock.now_ms()));
        self.notify();
        true
    }

    /// Untrack `session_id` without persisting anything (session deletion).
    pub fn remove(&self, session_id: &str) {
        let count = {
            let mut state = self.state.lock();
            if !state.sessions.remove(session_id) {
                return;
            }
            state.sessions.len()
        };
        debug!(session_id, count, "session removed from unobserved set");
        self.notify();
    }

    /// Number of unobserved sessions.
    pub fn count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Whether `session_id` is unobserved.
    pub fn is_unobserved(&self, session_id: &str) -> bool {
        self.state.lock().sessions.contains(session_id)
    }

    fn persist(&self, session_id: &str, patch: SessionMetaPatch) {
        if let Err(e) = self.store.set_session_meta(session_id, patch) {
            warn!(session_id, error = %e, "failed to persist session meta");
        }
    }

    fn notify(&self) {
        let _delivery = self.delivery.lock();
        let count = self.count();
        self.set_gauge(count);
        let sink = self.broadcast.read().clone();
        if let Some(sink) = sink {
            sink(UnobservedNotice { count });
        }
    }

    fn set_gauge(&self, count: usize) {
        gauge!(crate::metrics::SESSIONS_UNOBSERVED).set(count as f64);
    }
}
