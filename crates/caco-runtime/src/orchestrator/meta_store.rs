//! Persistence collaborator for per-session idle/observed timestamps.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::errors::MetaStoreError;

/// Persisted view-tracking fields of one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    /// Epoch ms the session last went idle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_idle_at: Option<i64>,
    /// Epoch ms a client last viewed the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observed_at: Option<i64>,
}

impl SessionMeta {
    /// Idle since it was last viewed, or idle and never viewed.
    pub fn is_unobserved(&self) -> bool {
        match (self.last_idle_at, self.last_observed_at) {
            (Some(_), None) => true,
            (Some(idle), Some(observed)) => idle > observed,
            (None, _) => false,
        }
    }

    fn apply(&mut self, patch: SessionMetaPatch) {
        if let Some(v) = patch.last_idle_at {
            self.last_idle_at = Some(v);
        }
        if let Some(v) = patch.last_observed_at {
            self.last_observed_at = Some(v);
        }
    }
}

/// Partial update; `None` fields are left alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetaPatch {
    /// Set `lastIdleAt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_idle_at: Option<i64>,
    /// Set `lastObservedAt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observed_at: Option<i64>,
}

impl SessionMetaPatch {
    /// Patch setting only `lastIdleAt`.
    pub fn idle_at(ms: i64) -> Self {
        Self {
            last_idle_at: Some(ms),
            last_observed_at: None,
        }
    }

    /// Patch setting only `lastObservedAt`.
    pub fn observed_at(ms: i64) -> Self {
        Self {
            last_idle_at: None,
            last_observed_at: Some(ms),
        }
    }
}

/// Storage for [`SessionMeta`], consumed by the unobserved tracker.
pub trait SessionMetaStore: Send + Sync {
    /// Stored fields for `session_id`, `None` if nothing was ever written.
    fn get_session_meta(&self, session_id: &str) -> Result<Option<SessionMeta>, MetaStoreError>;

    /// Merge `patch` into the stored fields for `session_id`.
    fn set_session_meta(
        &self,
        session_id: &str,
        patch: SessionMetaPatch,
    ) -> Result<(), MetaStoreError>;
}

/// Process-local [`SessionMetaStore`].
#[derive(Debug, Default)]
pub struct InMemorySessionMetaStore {
    entries: DashMap<String, SessionMeta>,
}

impl InMemorySessionMetaStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionMetaStore for InMemorySessionMetaStore {
    fn get_session_meta(&self, session_id: &str) -> Result<Option<SessionMeta>, MetaStoreError> {
        Ok(self.entries.get(session_id).map(|m| *m))
    }

    fn set_session_meta(
        &self,
        session_id: &str,
        patch: SessionMetaPatch,
    ) -> Result<(), MetaStoreError> {
        self.entries.entry(session_id.to_owned()).or_default().apply(patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unobserved_condition() {
        let meta = |idle, observed| SessionMeta {
            last_idle_at: idle,
            last_observed_at: observed,
        };
        assert!(!meta(None, None).is_unobserved());
        assert!(!meta(None, Some(5)).is_unobserved());
        assert!(meta(Some(5), None).is_unobserved());
        assert!(meta(Some(6), Some(5)).is_unobserved());
        assert!(!meta(Some(5), Some(5)).is_unobserved());
        assert!(!meta(Some(4), Some(5)).is_unobserved());
    }

    #[test]
    fn in_memory_store_merges_patches() {
        let store = InMemorySessionMetaStore::new();
        assert_eq!(store.get_session_meta("A").unwrap(), None);

        store.set_session_meta("A", SessionMetaPatch::idle_at(10)).unwrap();
        store.set_session_meta("A", SessionMetaPatch::observed_at(20)).unwrap();
        store.set_session_meta("A", SessionMetaPatch::idle_at(30)).unwrap();

        assert_eq!(
            store.get_session_meta("A").unwrap(),
            Some(SessionMeta {
                last_idle_at: Some(30),
                last_observed_at: Some(20),
            })
        );
    }

    #[test]
    fn meta_wire_shape() {
        let json = serde_json::to_value(SessionMeta {
            last_idle_at: Some(1),
            last_observed_at: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "lastIdleAt": 1 }));

        let parsed: SessionMeta = serde_json::from_str(r#"{"lastObservedAt": 2}"#).unwrap();
        assert_eq!(parsed.last_observed_at, Some(2));
        assert_eq!(parsed.last_idle_at, None);
    }
}
