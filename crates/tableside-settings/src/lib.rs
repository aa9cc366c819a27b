//! # tableside-settings
//!
//! Layered configuration for the tableside hub.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** : [`TablesideSettings::default()`]
//! 2. **User file** : `~/.tableside/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** : `TABLESIDE_*` overrides (highest priority)
//!
//! The merged result is validated before it is returned, so a caller never
//! sees a keepalive triad that would time out healthy connections.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
