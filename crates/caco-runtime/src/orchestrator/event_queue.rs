//! Per-session queues of synthetic events, drained at turn boundaries.
//!
//! Events produced during tool execution (an embeddable resource, say) are
//! held here and handed back right before the turn's visible content, so the
//! client sees them in a stable position whether it is following a live
//! stream or replaying history.

use std::collections::HashMap;

use caco_core::QueuedEvent;
use caco_core::events::{ASSISTANT_MESSAGE, ASSISTANT_MESSAGE_DELTA, SESSION_ERROR};
use parking_lot::Mutex;
use tracing::debug;

/// Whether `event_type` marks a turn boundary at which queues drain.
///
/// True for streamed content deltas, the final assistant message and
/// terminal errors. Tool lifecycle, user messages and idle notices are not
/// boundaries.
pub fn is_flush_trigger(event_type: &str) -> bool {
    matches!(
        event_type,
        ASSISTANT_MESSAGE_DELTA | ASSISTANT_MESSAGE | SESSION_ERROR
    )
}

/// FIFO of [`QueuedEvent`]s for one session.
#[derive(Clone, Debug, Default)]
pub struct CacoEventQueue {
    events: Vec<QueuedEvent>,
}

impl CacoEventQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn queue(&mut self, event: QueuedEvent) {
        self.events.push(event);
    }

    /// Take every pending event in insertion order, leaving the queue empty.
    pub fn flush(&mut self) -> Vec<QueuedEvent> {
        std::mem::take(&mut self.events)
    }

    /// Whether anything is queued.
    pub fn has_pending(&self) -> bool {
        !self.events.is_empty()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// `session -> CacoEventQueue`.
#[derive(Default)]
pub struct SessionEventQueues {
    queues: Mutex<HashMap<String, CacoEventQueue>>,
}

impl SessionEventQueues {
    /// No queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event` to the queue of `session_id`.
    pub fn queue(&self, session_id: &str, event: QueuedEvent) {
        debug!(session_id, event_type = %event.event_type, "event queued");
        self.queues
            .lock()
            .entry(session_id.to_owned())
            .or_default()
            .queue(event);
    }

    /// Drain the queue of `session_id`.
    pub fn flush(&self, session_id: &str) -> Vec<QueuedEvent> {
        self.queues
            .lock()
            .remove(session_id)
            .map(|mut q| q.flush())
            .unwrap_or_default()
    }

    /// Drain the queue of `session_id` if `event_type` is a flush trigger.
    ///
    /// Returns an empty list for non-trigger events and for empty queues, so
    /// callers can emit the result unconditionally before `event_type`.
    pub fn take_if_trigger(&self, session_id: &str, event_type: &str) -> Vec<QueuedEvent> {
        if !is_flush_trigger(event_type) {
            return Vec::new();
        }
        let events = self.flush(session_id);
        if !events.is_empty() {
            debug!(session_id, event_type, count = events.len(), "queued events flushed");
        }
        events
    }

    /// Number of events pending for `session_id`.
    pub fn pending(&self, session_id: &str) -> usize {
        self.queues.lock().get(session_id).map_or(0, CacoEventQueue::len)
    }

    /// Drop the queue of `session_id` without returning it.
    pub fn discard(&self, session_id: &str) {
        if let Some(q) = self.queues.lock().remove(session_id) {
            if q.has_pending() {
                debug!(session_id, dropped = q.len(), "queued events discarded");
            }
        }
    }
}
