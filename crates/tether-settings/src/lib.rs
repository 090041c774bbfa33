//! # tether-settings
//!
//! Layered configuration for the Tether server.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. **Compiled defaults** ([`TetherSettings::default()`])
//! 2. **Settings file** (`~/.tether/settings.json` unless another path is
//!    given), deep-merged over defaults
//! 3. **Environment variables** (`TETHER_*` overrides, highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings_from_path, settings_path,
};
pub use types::*;
