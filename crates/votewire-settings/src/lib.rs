//! # votewire-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`VotewireSettings::default()`]
//! 2. **User file**: `~/.votewire/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `VOTEWIRE_*` overrides (highest priority)
//!
//! The client never reads settings on its own: callers resolve the API base
//! with [`resolve_api_base`] and pass the result in at construction.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{ClientSettings, LoggingSettings, VotewireSettings, resolve_api_base};
