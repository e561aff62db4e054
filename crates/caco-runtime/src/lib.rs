//! # caco-runtime
//!
//! Multi-agent dispatch safety core.
//!
//! - **Runaway detection**: chain collapsing, sliding-window rate counting,
//!   the composite [`RunawayRulesEngine`], and per-correlation
//!   [`CorrelationMetrics`] held in a [`CorrelationRegistry`]
//! - **Cwd locks**: [`CwdLockManager`]: per-directory exclusion enforced
//!   only while the holder is busy
//! - **Dispatch state**: [`DispatchState`]: which session is in flight and
//!   under which correlation id
//! - **Event queue**: [`CacoEventQueue`] and [`is_flush_trigger`]: synthetic
//!   UI events held until the next turn boundary
//! - **Unobserved tracking**: [`UnobservedTracker`]: sessions that went idle
//!   without a client seeing the result
//! - **Coordinator**: [`DispatchCoordinator`] wires the above into the
//!   dispatch and agent-to-agent protocols
//!
//! Everything here is synchronous and in-memory. Shared state sits behind
//! `parking_lot` locks scoped to each whole read-then-write sequence.
//!
//! ## Crate Position
//!
//! Depends on: caco-core, caco-settings.

#![deny(unsafe_code)]

pub mod errors;
pub mod metrics;
pub mod orchestrator;
pub mod runaway;

pub use errors::{CwdLockedError, MetaStoreError, RuntimeError};
pub use orchestrator::coordinator::{AgentEnvelope, DispatchCoordinator, MessageSource};
pub use orchestrator::cwd_lock::CwdLockManager;
pub use orchestrator::dispatch_state::{DispatchRecord, DispatchState};
pub use orchestrator::event_queue::{CacoEventQueue, SessionEventQueues, is_flush_trigger};
pub use orchestrator::meta_store::{
    InMemorySessionMetaStore, SessionMeta, SessionMetaPatch, SessionMetaStore,
};
pub use orchestrator::unobserved::{UnobservedNotice, UnobservedTracker};
pub use runaway::chain::{collapse_chain, effective_depth, unique_session_count};
pub use runaway::correlation::{CorrelationConfig, CorrelationMetrics, CorrelationSnapshot};
pub use runaway::rate::RateAggregator;
pub use runaway::registry::CorrelationRegistry;
pub use runaway::rules::{LimitsPatch, RunawayLimits, RunawayRulesEngine};
pub use runaway::types::{CallMetrics, RunawayRule, RunawayVerdict};
