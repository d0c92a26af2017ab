//! # gait-settings
//!
//! Configuration for the live dashboard channel, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`LiveSettings::default()`]
//! 2. **User file**: `~/.gait/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `GAIT_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! let settings = gait_settings::load_settings().unwrap_or_default();
//! println!("push endpoint path: {}", settings.endpoint.path);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
