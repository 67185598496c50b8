//! Configuration loading using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables (prefixed with `OPHYD_FIELD_`)
//!
//! The field defaults here are the explicit home for what used to be an
//! environment-sourced global: the default significant-figures setting that
//! every controller falls back to when its options carry no override.
//!
//! # Example
//! ```no_run
//! use ophyd_field::config::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AppResult, FieldError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Field controller defaults.
    #[serde(default)]
    pub field: FieldDefaults,
}

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

/// Global defaults threaded into every [`crate::field::TextFieldController`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldDefaults {
    /// Default significant figures for numeric display values. Absent means
    /// no rounding (full precision); a per-field override always wins.
    #[serde(default)]
    pub default_signif_figures: Option<i32>,
}

fn default_name() -> String {
    "ophyd-field".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from `config/config.toml` and environment
    /// variables.
    ///
    /// Environment variables override file values with the `OPHYD_FIELD_`
    /// prefix and `__` between sections, e.g.
    /// `OPHYD_FIELD_APPLICATION__LOG_LEVEL=debug`.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        // The section separator is doubled so key names containing an
        // underscore (log_level, default_signif_figures) survive the split.
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("OPHYD_FIELD_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(FieldError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // figment::Jail sandboxes the working directory and the process
    // environment, so tests touching OPHYD_FIELD_* variables cannot leak
    // into each other.

    #[test]
    fn missing_file_falls_back_to_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = AppConfig::load_from("does/not/exist.toml").unwrap();
            assert_eq!(config.application.name, "ophyd-field");
            assert_eq!(config.application.log_level, "info");
            assert_eq!(config.field.default_signif_figures, None);
            Ok(())
        });
    }

    #[test]
    fn file_values_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[application]\nname = \"beamline\"\nlog_level = \"debug\"\n\n\
                 [field]\ndefault_signif_figures = 3\n",
            )?;
            let config = AppConfig::load_from("config.toml").unwrap();
            assert_eq!(config.application.name, "beamline");
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.field.default_signif_figures, Some(3));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[application]\nlog_level = \"warn\"\n")?;
            jail.set_env("OPHYD_FIELD_APPLICATION__LOG_LEVEL", "debug");
            jail.set_env("OPHYD_FIELD_FIELD__DEFAULT_SIGNIF_FIGURES", "5");

            let config = AppConfig::load_from("config.toml").unwrap();
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.field.default_signif_figures, Some(5));
            Ok(())
        });
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[application]\nlog_level = \"loud\"\n")?;
            assert!(AppConfig::load_from("config.toml").is_err());
            Ok(())
        });
    }
}
