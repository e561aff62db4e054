//! # caco-settings
//!
//! Configuration for the caco dispatch core.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CacoSettings::default()`]
//! 2. **Settings file**: a JSON file deep-merged over defaults
//! 3. **Environment variables**: `CACO_*` overrides (highest priority)
//!
//! There is no process-wide cache: the host loads a [`CacoSettings`] once
//! and passes it to whatever it constructs.
//!
//! ## Crate Position
//!
//! Leaf crate. Depended on by caco-runtime.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, apply_overrides, deep_merge, load_settings_from_path};
pub use types::*;
