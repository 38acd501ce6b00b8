//! Application configuration: TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::accessory::AccessoryIdentity;
use crate::protocol::{ACCESSORY_INTERFACE, REENUMERATE_TIMEOUT_MS};

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# ligo configuration. Changes made outside `ligo config` may be overwritten.\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Interface claimed for the byte stream. Default: 0.
    #[serde(default = "default_interface")]
    pub interface: u8,

    /// Bulk read timeout in milliseconds. 0 = block until data arrives.
    ///
    /// `ligo read` polls in short slices and stops once no data has arrived
    /// for this long, unless `--idle-timeout` overrides it.
    #[serde(default)]
    pub read_timeout_ms: u64,

    /// Bulk write timeout in milliseconds. 0 = block. Default: 1000.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Send SET_CONFIGURATION(1) before the handshake.
    #[serde(default)]
    pub set_configuration: bool,

    /// How long to wait for the device to re-enumerate after a switch.
    #[serde(default = "default_reenumerate_timeout_ms")]
    pub reenumerate_timeout_ms: u64,

    /// Strings sent to the device during the handshake.
    #[serde(default)]
    pub identity: AccessoryIdentity,
}

fn default_interface() -> u8 {
    ACCESSORY_INTERFACE
}
fn default_write_timeout_ms() -> u64 {
    1000
}
fn default_reenumerate_timeout_ms() -> u64 {
    REENUMERATE_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            interface: default_interface(),
            read_timeout_ms: 0,
            write_timeout_ms: default_write_timeout_ms(),
            set_configuration: false,
            reenumerate_timeout_ms: default_reenumerate_timeout_ms(),
            identity: AccessoryIdentity::default(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// An identity string cannot be sent as-is.
    InvalidIdentity(String),
    /// A timeout that must be positive is zero.
    ZeroTimeout { field: &'static str },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidIdentity(e) => write!(f, "Invalid identity: {e}"),
            ValidationError::ZeroTimeout { field } => write!(f, "{field} must be greater than 0"),
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ligo"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    ///
    /// A header comment is prepended to warn that manual edits may be overwritten.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    pub fn reenumerate_timeout(&self) -> Duration {
        Duration::from_millis(self.reenumerate_timeout_ms)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors: Vec<ValidationError> = self
            .identity
            .problems()
            .into_iter()
            .map(ValidationError::InvalidIdentity)
            .collect();

        if self.reenumerate_timeout_ms == 0 {
            errors.push(ValidationError::ZeroTimeout {
                field: "reenumerate_timeout_ms",
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ──

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.interface, 0);
        assert_eq!(c.read_timeout_ms, 0);
        assert_eq!(c.write_timeout_ms, 1000);
        assert!(!c.set_configuration);
        assert_eq!(c.reenumerate_timeout_ms, 5000);
        assert_eq!(c.identity, AccessoryIdentity::default());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = "write_timeout_ms = 250\n\n[identity]\nmodel = \"Dock\"\n";
        let c: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(c.write_timeout_ms, 250);
        assert_eq!(c.identity.model, "Dock");
        // Missing fields get defaults
        assert_eq!(c.identity.manufacturer, AccessoryIdentity::default().manufacturer);
        assert_eq!(c.reenumerate_timeout_ms, 5000);
        assert_eq!(c.interface, 0);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn wrong_type_toml_is_rejected() {
        let result: std::result::Result<Config, _> =
            toml::from_str("set_configuration = \"yes\"");
        assert!(result.is_err());
    }

    #[test]
    fn config_path_ends_with_toml() {
        if let Some(path) = Config::path() {
            assert_eq!(path.file_name().unwrap(), "config.toml");
            assert_eq!(path.parent().unwrap().file_name().unwrap(), "ligo");
        }
    }

    #[test]
    fn reenumerate_timeout_as_duration() {
        let c = Config {
            reenumerate_timeout_ms: 1500,
            ..Config::default()
        };
        assert_eq!(c.reenumerate_timeout(), Duration::from_millis(1500));
    }

    // ── validate ──

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut c = Config::default();
        c.identity.manufacturer.clear();
        c.identity.serial = "a\0b".into();
        c.reenumerate_timeout_ms = 0;
        let errors = c.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::InvalidIdentity(
            "manufacturer string is empty".into()
        )));
        assert!(errors.contains(&ValidationError::ZeroTimeout {
            field: "reenumerate_timeout_ms"
        }));
    }

    #[test]
    fn validation_error_display() {
        let e = ValidationError::InvalidIdentity("model string is empty".into());
        assert_eq!(e.to_string(), "Invalid identity: model string is empty");
        let e = ValidationError::ZeroTimeout {
            field: "reenumerate_timeout_ms",
        };
        assert_eq!(e.to_string(), "reenumerate_timeout_ms must be greater than 0");
    }

    // ── save_to / load_from ──

    #[test]
    fn save_to_load_from_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            interface: 1,
            read_timeout_ms: 200,
            write_timeout_ms: 0,
            set_configuration: true,
            reenumerate_timeout_ms: 8000,
            identity: AccessoryIdentity {
                manufacturer: "Acme".into(),
                model: "Dock".into(),
                description: "Car dock".into(),
                version: "3.0".into(),
                uri: "https://example.com/dock".into(),
                serial: "D0C4".into(),
            },
        };
        config.save_to(&path).unwrap();

        let (loaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded, config);
    }

    #[test]
    fn save_to_includes_header_comment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Config::default().save_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(
            contents.starts_with("# ligo configuration"),
            "saved file should start with header comment"
        );
        assert!(contents.contains("[identity]"));
    }

    #[test]
    fn save_to_creates_parent_dirs_and_cleans_up_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::default().save_to(&path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = Config::load_from(&dir.path().join("nonexistent.toml"));
        assert!(warnings.is_empty());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_from_invalid_toml_returns_defaults_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is { not valid toml").unwrap();

        let (config, warnings) = Config::load_from(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"));
        assert_eq!(config, Config::default());
    }
}
