//! # ambient-settings
//!
//! Configuration for the API server, the controller and the content service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AmbientSettings::default()`]
//! 2. **Settings file**: `~/.ambient/settings.json` or an explicit path
//! 3. **Environment variables**: `AMBIENT_*` overrides (highest priority)
//!
//! The loaded value is validated once and then passed by value into the
//! process state; there is no global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let settings = AmbientSettings::default();
        assert!(settings.validate().is_ok());
        assert!(settings_path().ends_with("settings.json"));
    }
}
