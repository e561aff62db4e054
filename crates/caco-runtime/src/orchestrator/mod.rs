//! Session-level coordination.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `cwd_lock` | Per-directory exclusion keyed by busy/idle session state |
//! | `dispatch_state` | Busy flag paired atomically with the correlation id |
//! | `event_queue` | Synthetic UI events held until a turn boundary |
//! | `meta_store` | Persistence collaborator for idle/observed timestamps |
//! | `unobserved` | Sessions that went idle without being viewed |
//! | `coordinator` | Dispatch and agent-to-agent protocols over the above |
//!
//! ## Dispatch Ordering
//!
//! `begin_dispatch` records the correlation id before the prompt is sent, so
//! any nested agent call issued during the turn can read it. `end_dispatch`
//! must come only after all nested work attributable to the turn has been
//! issued.

pub mod coordinator;
pub mod cwd_lock;
pub mod dispatch_state;
pub mod event_queue;
pub mod meta_store;
pub mod unobserved;
