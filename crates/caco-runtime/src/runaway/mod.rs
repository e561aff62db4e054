//! Runaway delegation detection.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `chain` | Collapse delegate-and-return oscillations, effective depth |
//! | `rate` | Sliding-window call counter |
//! | `rules` | Composite depth/duration/rate evaluator over caller-supplied metrics |
//! | `correlation` | Per-correlation chain + timestamps with a simpler raw-depth policy |
//! | `registry` | `correlationId -> CorrelationMetrics` map with expiry sweep |
//! | `types` | `CallMetrics`, `RunawayRule`, `RunawayVerdict` |
//!
//! Rejections are values, not errors: callers decide whether to deny the
//! nested call or log and continue.

pub mod chain;
pub mod correlation;
pub mod rate;
pub mod registry;
pub mod rules;
pub mod types;

/// Seconds to milliseconds, saturating at `i64::MAX`.
pub(crate) fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000)
}
