//! Correlation contexts keyed by correlation id.

use std::collections::HashMap;
use std::sync::Arc;

use caco_core::{Clock, CorrelationId};
use metrics::gauge;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::correlation::{CorrelationConfig, CorrelationMetrics, CorrelationSnapshot};

/// Owns every live [`CorrelationMetrics`].
pub struct CorrelationRegistry {
    config: CorrelationConfig,
    clock: Arc<dyn Clock>,
    contexts: Mutex<HashMap<CorrelationId, CorrelationMetrics>>,
}

impl CorrelationRegistry {
    /// Empty registry; new contexts use `config`.
    pub fn new(config: CorrelationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` on the context for `id`, creating it seeded with `origin` if absent.
    ///
    /// The map lock is held for the whole call, so a check followed by a
    /// record inside `f` is atomic with respect to other callers.
    pub fn with_metrics<R>(
        &self,
        id: &CorrelationId,
        origin: &str,
        f: impl FnOnce(&mut CorrelationMetrics) -> R,
    ) -> R {
        let mut contexts = self.contexts.lock();
        let before = contexts.len();
        let metrics = contexts.entry(id.clone()).or_insert_with(|| {
            debug!(correlation_id = %id, origin, "correlation context created");
            CorrelationMetrics::new(id.clone(), self.config.clone(), Arc::clone(&self.clock))
                .with_origin(origin)
        });
        let result = f(metrics);
        if contexts.len() != before {
            gauge!(crate::metrics::CORRELATIONS_ACTIVE).set(contexts.len() as f64);
        }
        result
    }

    /// Ensure a context exists for `id` and return its snapshot.
    pub fn get_or_create(&self, id: &CorrelationId, origin: &str) -> CorrelationSnapshot {
        self.with_metrics(id, origin, |m| m.snapshot())
    }

    /// Snapshot of the context for `id`.
    pub fn snapshot(&self, id: &CorrelationId) -> Option<CorrelationSnapshot> {
        self.contexts.lock().get(id).map(CorrelationMetrics::snapshot)
    }

    /// Whether a context exists for `id`.
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.contexts.lock().contains_key(id)
    }

    /// Drop the context for `id`. Returns whether one existed.
    pub fn remove(&self, id: &CorrelationId) -> bool {
        let mut contexts = self.contexts.lock();
        let removed = contexts.remove(id).is_some();
        if removed {
            gauge!(crate::metrics::CORRELATIONS_ACTIVE).set(contexts.len() as f64);
        }
        removed
    }

    /// Drop every expired context, returning their ids.
    pub fn sweep_expired(&self) -> Vec<CorrelationId> {
        self.sweep_expired_except(|_| false)
    }

    /// Drop every expired context for which `keep` is false.
    ///
    /// A kept context retains its chain, start time and timestamps, so a
    /// flow that is still running stays subject to its accumulated limits.
    pub fn sweep_expired_except(
        &self,
        keep: impl Fn(&CorrelationId) -> bool,
    ) -> Vec<CorrelationId> {
        let mut contexts = self.contexts.lock();
        let expired: Vec<CorrelationId> = contexts
            .iter()
            .filter(|(id, m)| m.is_expired() && !keep(id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            let _ = contexts.remove(id);
        }
        if !expired.is_empty() {
            info!(
                count = expired.len(),
                remaining = contexts.len(),
                "expired correlation contexts swept"
            );
            gauge!(crate::metrics::CORRELATIONS_ACTIVE).set(contexts.len() as f64);
        }
        expired
    }

    /// Number of live contexts.
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Whether no contexts are live.
    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }
}
