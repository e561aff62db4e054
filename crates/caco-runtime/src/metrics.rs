//! Metric names recorded through the `metrics` facade.
//!
//! No exporter is installed here; the host decides where metrics go.

/// Sessions currently dispatching (gauge).
pub const DISPATCHES_ACTIVE: &str = "dispatches_active";
/// Working directories with a lock entry (gauge).
pub const CWD_LOCKS_HELD: &str = "cwd_locks_held";
/// Acquire attempts refused because a busy session holds the cwd (counter).
pub const CWD_LOCK_CONFLICTS_TOTAL: &str = "cwd_lock_conflicts_total";
/// Stale locks taken over by a new session (counter).
pub const CWD_LOCK_RECLAIMS_TOTAL: &str = "cwd_lock_reclaims_total";
/// Agent-to-agent calls refused (counter, labels: rule).
pub const RUNAWAY_REJECTIONS_TOTAL: &str = "runaway_rejections_total";
/// Sessions idle and not yet viewed (gauge).
pub const SESSIONS_UNOBSERVED: &str = "sessions_unobserved";
/// Correlation contexts currently tracked (gauge).
pub const CORRELATIONS_ACTIVE: &str = "correlations_active";
