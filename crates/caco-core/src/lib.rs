//! # caco-core
//!
//! Foundation types shared by the caco dispatch crates.
//!
//! - **Branded IDs**: [`ids::CorrelationId`] as a newtype. Session ids are
//!   opaque strings owned by the host session layer
//! - **Clock**: [`clock::Clock`] with [`clock::SystemClock`] and [`clock::ManualClock`]
//! - **Events**: [`events::QueuedEvent`] and the event-type names the flush trigger knows
//! - **Replies**: [`reply::AgentReply`] parsed from agent-to-agent tool results
//! - **Late binding**: [`late_bound::LateBound`] for values resolved after construction
//! - **Logging**: [`logging::init_subscriber`] and test log capture
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by caco-runtime.

#![deny(unsafe_code)]

pub mod clock;
pub mod events;
pub mod ids;
pub mod late_bound;
pub mod logging;
pub mod reply;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::QueuedEvent;
pub use ids::CorrelationId;
pub use late_bound::{LateBound, LateBoundError};
pub use reply::{AgentReply, StructuredReply};
