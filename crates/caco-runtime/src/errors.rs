//! Runtime error types.

use caco_core::LateBoundError;

use crate::runaway::types::RunawayRule;

/// A working directory is held by another session that is still busy.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("working directory is locked by session {session_id}")]
pub struct CwdLockedError {
    /// The session currently holding the lock.
    pub session_id: String,
}

/// Errors surfaced by the dispatch coordinator.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Target cwd is locked by a busy session.
    #[error(transparent)]
    CwdLocked(#[from] CwdLockedError),

    /// The calling session is not dispatching, so there is no flow to extend.
    #[error("no correlation context for session {0}")]
    NoCorrelationContext(String),

    /// An agent-to-agent call was refused by the runaway policy.
    #[error("delegation rejected ({rule}): {reason}")]
    Runaway {
        /// Which rule refused the call.
        rule: RunawayRule,
        /// Human-readable reason.
        reason: String,
    },

    /// A late-bound value was read before it was resolved.
    #[error(transparent)]
    Unresolved(#[from] LateBoundError),
}

impl RuntimeError {
    /// Short classification string for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::CwdLocked(_) => "cwd_locked",
            Self::NoCorrelationContext(_) => "no_correlation_context",
            Self::Runaway { .. } => "runaway",
            Self::Unresolved(_) => "unresolved",
        }
    }
}

/// Failure reported by a [`SessionMetaStore`](crate::SessionMetaStore).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MetaStoreError {
    /// The backing store could not complete the operation.
    #[error("session meta store error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn cwd_locked_display_names_holder() {
        let err = CwdLockedError {
            session_id: "A".into(),
        };
        assert_eq!(err.to_string(), "working directory is locked by session A");
    }

    #[test]
    fn cwd_locked_converts_into_runtime_error() {
        let err: RuntimeError = CwdLockedError {
            session_id: "A".into(),
        }
        .into();
        assert_matches!(&err, RuntimeError::CwdLocked(e) if e.session_id == "A");
        assert_eq!(err.category(), "cwd_locked");
        assert!(err.to_string().contains("session A"));
    }

    #[test]
    fn runaway_display_includes_rule() {
        let err = RuntimeError::Runaway {
            rule: RunawayRule::Rate,
            reason: "too many".into(),
        };
        assert_eq!(err.to_string(), "delegation rejected (rate): too many");
        assert_eq!(err.category(), "runaway");
    }

    #[test]
    fn unresolved_from_late_bound() {
        let err: RuntimeError = LateBoundError::Unresolved("session id").into();
        assert_eq!(err.category(), "unresolved");
        assert_eq!(err.to_string(), "session id not yet resolved");
    }
}
