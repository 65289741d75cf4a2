//! Configuration using Figment
//!
//! Configuration is layered, lowest to highest precedence:
//! 1. Built-in defaults ([`Settings::default`])
//! 2. A TOML file (`config/apogeefpi.toml` unless another path is given)
//! 3. Environment variables prefixed with `APOGEEFPI_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore, since many keys contain a
//! single one:
//!
//! ```text
//! APOGEEFPI_ACTOR__LOG_LEVEL=debug
//! APOGEEFPI_SHUTTER__OPEN_COMMAND=fpiopenshutter
//! APOGEEFPI_CALBOX__ENABLED=false
//! ```
//!
//! # Example
//!
//! ```no_run
//! use apogee_fpi::config::Settings;
//!
//! let settings = Settings::load().unwrap();
//! println!("Actor: {}", settings.actor.name);
//! ```

use crate::error::{FpiError, FpiResult};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/apogeefpi.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "APOGEEFPI_";

/// Placeholders accepted in `calbox.args`.
pub const CALBOX_PLACEHOLDERS: [&str; 2] = ["actor", "command"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Actor identity and logging
    #[serde(default)]
    pub actor: ActorSettings,
    /// Local shutter hardware commands
    #[serde(default)]
    pub shutter: ShutterSettings,
    /// Calibration-box shutter relay
    #[serde(default)]
    pub calbox: CalboxSettings,
}

/// Actor identity and logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSettings {
    /// Name used in every reply line
    #[serde(default = "default_actor_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Shell commands that drive the FPI shutter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutterSettings {
    /// Shell command that opens the shutter
    #[serde(default = "default_open_command")]
    pub open_command: String,
    /// Shell command that closes the shutter
    #[serde(default = "default_close_command")]
    pub close_command: String,
}

/// How to reach the calibration-box shutter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalboxSettings {
    /// Whether open/close also command the calibration box
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Name of the calibration-box actor
    #[serde(default = "default_calbox_actor")]
    pub actor: String,
    /// Relay program invoked without a shell
    #[serde(default = "default_calbox_program")]
    pub program: String,
    /// Argument templates; `{actor}` and `{command}` are substituted
    #[serde(default = "default_calbox_args")]
    pub args: Vec<String>,
    /// Command sent to open the calibration-box shutter
    #[serde(default = "default_calbox_open")]
    pub open_command: String,
    /// Command sent to close the calibration-box shutter
    #[serde(default = "default_calbox_close")]
    pub close_command: String,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_actor_name() -> String {
    "apogeefpi".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_open_command() -> String {
    "open-shutter".to_string()
}

fn default_close_command() -> String {
    "close-shutter".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_calbox_actor() -> String {
    "apogeecal".to_string()
}

fn default_calbox_program() -> String {
    "send-command".to_string()
}

fn default_calbox_args() -> Vec<String> {
    vec!["{actor}".to_string(), "{command}".to_string()]
}

fn default_calbox_open() -> String {
    "shutterOpen".to_string()
}

fn default_calbox_close() -> String {
    "shutterClose".to_string()
}

impl Default for ActorSettings {
    fn default() -> Self {
        Self {
            name: default_actor_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ShutterSettings {
    fn default() -> Self {
        Self {
            open_command: default_open_command(),
            close_command: default_close_command(),
        }
    }
}

impl Default for CalboxSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            actor: default_calbox_actor(),
            program: default_calbox_program(),
            args: default_calbox_args(),
            open_command: default_calbox_open(),
            close_command: default_calbox_close(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl Settings {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load() -> FpiResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment, then validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> FpiResult<Self> {
        let settings: Self = Self::figment(path.as_ref()).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Shutter commands are non-empty
    /// - When the calibration box is enabled, its program and commands are
    ///   non-empty and `args` only uses known placeholders
    pub fn validate(&self) -> FpiResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.actor.log_level.as_str()) {
            return Err(FpiError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.actor.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.actor.name.trim().is_empty() {
            return Err(FpiError::Configuration(
                "actor.name cannot be empty".to_string(),
            ));
        }

        for (key, value) in [
            ("shutter.open_command", &self.shutter.open_command),
            ("shutter.close_command", &self.shutter.close_command),
        ] {
            if value.trim().is_empty() {
                return Err(FpiError::Configuration(format!("{key} cannot be empty")));
            }
        }

        if self.calbox.enabled {
            for (key, value) in [
                ("calbox.program", &self.calbox.program),
                ("calbox.open_command", &self.calbox.open_command),
                ("calbox.close_command", &self.calbox.close_command),
            ] {
                if value.trim().is_empty() {
                    return Err(FpiError::Configuration(format!(
                        "{key} cannot be empty while the calibration box is enabled"
                    )));
                }
            }

            for template in &self.calbox.args {
                for name in placeholders(template) {
                    if !CALBOX_PLACEHOLDERS.contains(&name) {
                        return Err(FpiError::Configuration(format!(
                            "Unknown placeholder '{{{name}}}' in calbox.args. Must be one of: {}",
                            CALBOX_PLACEHOLDERS.join(", ")
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Names between single braces, skipping `{{`/`}}` escapes.
fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        if let Some(escaped) = after.strip_prefix('{') {
            rest = escaped;
            continue;
        }
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.actor.name, "apogeefpi");
        assert_eq!(settings.shutter.open_command, "open-shutter");
        assert_eq!(settings.calbox.actor, "apogeecal");
        assert!(settings.calbox.enabled);
    }

    #[test]
    #[serial]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    #[serial]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[shutter]
open_command = "fpiopenshutter"

[calbox]
enabled = false
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.shutter.open_command, "fpiopenshutter");
        assert_eq!(settings.shutter.close_command, "close-shutter");
        assert!(!settings.calbox.enabled);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("APOGEEFPI_SHUTTER__CLOSE_COMMAND", "fpicloseshutter");
        let result = Settings::load_from(dir.path().join("absent.toml"));
        std::env::remove_var("APOGEEFPI_SHUTTER__CLOSE_COMMAND");

        assert_eq!(result.unwrap().shutter.close_command, "fpicloseshutter");
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut settings = Settings::default();
        settings.actor.log_level = "verbose".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    fn test_empty_shutter_command_rejected() {
        let mut settings = Settings::default();
        settings.shutter.close_command = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let mut settings = Settings::default();
        settings.calbox.args = vec!["{host}".to_string()];
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("{host}"));

        settings.calbox.enabled = false;
        settings.validate().unwrap();
    }

    #[test]
    fn test_placeholder_scan_skips_escapes() {
        assert_eq!(placeholders("{actor} {{literal}} {command}"), vec!["actor", "command"]);
        assert!(placeholders("plain").is_empty());
    }
}
