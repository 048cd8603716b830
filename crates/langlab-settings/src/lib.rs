//! # langlab-settings
//!
//! Configuration with layered sources for the language lab service.
//!
//! Settings are resolved from (lowest to highest priority):
//! 1. **Compiled defaults**: [`LabSettings::default()`]
//! 2. **User file**: `~/.langlab/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `LANGLAB_*` (plus `PORT` / `JWT_SECRET`)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_dir, settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = LabSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_match_classroom_deployment() {
        let settings = LabSettings::default();
        assert_eq!(settings.server.port, 4000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.liveness.interval_ms, 30_000);
        assert_eq!(settings.auth.on_invalid_token, InvalidTokenPolicy::Ignore);
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }
}
