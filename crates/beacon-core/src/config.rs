//! Application configuration management.
//!
//! Handles loading, saving, and validating beacon-logger configuration:
//! - Region to monitor (proximity UUID and optional major/minor)
//! - Session log directory and timezone of the written timestamps
//! - Identity of this device in the log
//! - Scan timing of the radio layer
//! - Control server settings
//!
//! Values come from a TOML file, overridden by `BEACON_`-prefixed
//! environment variables (`BEACON_REGION__NAME=desk`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::scanner::Region;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "BEACON";

/// Proximity UUID of the deployed beacon fleet.
pub const DEFAULT_PROXIMITY_UUID: Uuid = Uuid::from_u128(0x20CA_E8A0_A9CF_11E3_A5E2_0800_200C_9A66);

/// Name of the monitored region.
pub const DEFAULT_REGION_NAME: &str = "myBeacon";

static REGION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").expect("region name regex is valid"));

static DEVICE_IDENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^;\r\n]{1,128}$").expect("device identity regex is valid"));

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The sources could not be read or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Monitored region.
    pub region: RegionConfig,

    /// Session log output.
    pub logging: LoggingConfig,

    /// Identity of this device.
    pub device: DeviceConfig,

    /// Radio scan timing.
    pub scan: ScanConfig,

    /// Control server.
    pub server: ServerConfig,
}

/// Region to monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Region name.
    pub name: String,

    /// Proximity UUID shared by the region's beacons.
    pub proximity_uuid: Uuid,

    /// Only log beacons with this major value.
    pub major: Option<u16>,

    /// Only log beacons with this minor value.
    pub minor: Option<u16>,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_REGION_NAME.to_string(),
            proximity_uuid: DEFAULT_PROXIMITY_UUID,
            major: None,
            minor: None,
        }
    }
}

impl RegionConfig {
    /// The scanner region described by this section.
    #[must_use]
    pub fn to_region(&self) -> Region {
        Region {
            name: self.name.clone(),
            proximity_uuid: self.proximity_uuid,
            major: self.major,
            minor: self.minor,
        }
    }
}

/// Session log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory session files are written to.
    pub directory: PathBuf,

    /// Timezone of the DATE/TIME columns and file names.
    #[serde(with = "timezone_serde")]
    pub timezone: Tz,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
            timezone: chrono_tz::UTC,
        }
    }
}

/// Identity of this device in the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Fixed identity; the radio adapter name is used when unset.
    pub identity: Option<String>,
}

/// Radio scan timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Interval between ranging snapshots.
    pub scan_period_ms: u64,

    /// Age after which an RSSI sample no longer counts.
    pub sample_expiration_ms: u64,

    /// Time without sightings before a region counts as exited.
    pub region_exit_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_period_ms: 2000,
            sample_expiration_ms: 2000,
            region_exit_ms: 10_000,
        }
    }
}

impl ScanConfig {
    /// Interval between ranging snapshots.
    #[must_use]
    pub const fn scan_period(&self) -> Duration {
        Duration::from_millis(self.scan_period_ms)
    }

    /// Age after which an RSSI sample no longer counts.
    #[must_use]
    pub const fn sample_expiration(&self) -> Duration {
        Duration::from_millis(self.sample_expiration_ms)
    }

    /// Time without sightings before a region counts as exited.
    #[must_use]
    pub const fn region_exit(&self) -> Duration {
        Duration::from_millis(self.region_exit_ms)
    }
}

/// Control server settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP control API binds to.
    pub bind_address: SocketAddr,

    /// Activate monitoring as soon as the server starts.
    pub activate_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            activate_on_start: true,
        }
    }
}

impl Config {
    /// Load configuration from `path`, applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or fails
    /// validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::build(Some(path))
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    ///
    /// Environment overrides apply in both cases.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed, or the result
    /// fails validation.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::build(Some(path))
        } else {
            tracing::info!(path = %path.display(), "No configuration file, using defaults");
            Self::build(None)
        }
    }

    fn build(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Toml),
            );
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be serialized or written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let write_error = |source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)?;
        Ok(())
    }

    /// Check every field, reporting all violations at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single violation and
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: String| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message,
            });
        };

        if !is_valid_region_name(&self.region.name) {
            invalid(
                "region.name",
                format!(
                    "'{}' must be 1-64 letters, digits, '.', '_' or '-'",
                    self.region.name
                ),
            );
        }
        if let Some(identity) = &self.device.identity {
            if !is_valid_device_identity(identity) {
                invalid(
                    "device.identity",
                    "must be 1-128 characters without ';' or line breaks".to_string(),
                );
            }
        }
        if self.scan.scan_period_ms == 0 {
            invalid("scan.scan_period_ms", "must be greater than 0".to_string());
        }
        if self.scan.sample_expiration_ms == 0 {
            invalid(
                "scan.sample_expiration_ms",
                "must be greater than 0".to_string(),
            );
        }
        if self.scan.region_exit_ms < self.scan.scan_period_ms {
            invalid(
                "scan.region_exit_ms",
                format!(
                    "must be at least the scan period ({} ms)",
                    self.scan.scan_period_ms
                ),
            );
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Whether `name` is usable as a region name.
#[must_use]
pub fn is_valid_region_name(name: &str) -> bool {
    REGION_NAME_RE.is_match(name)
}

/// Whether `identity` can be written to the PHONE column as is.
#[must_use]
pub fn is_valid_device_identity(identity: &str) -> bool {
    DEVICE_IDENTITY_RE.is_match(identity)
}

/// Default configuration file location.
///
/// On Linux: `/etc/beacon-logger/config.toml`
/// Elsewhere: the platform config directory.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/beacon-logger/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "beacon-logger")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }
}

/// Default session log directory: `beacon` inside the user's downloads.
#[must_use]
pub fn default_log_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|d| d.join("beacon")))
        .or_else(|| {
            directories::ProjectDirs::from("", "", "beacon-logger")
                .map(|dirs| dirs.data_dir().join("beacon"))
        })
        .unwrap_or_else(|| PathBuf::from("./beacon"))
}

mod timezone_serde {
    use chrono_tz::Tz;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Tz, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.region.name, "myBeacon");
        assert_eq!(
            config.region.proximity_uuid.to_string(),
            "20cae8a0-a9cf-11e3-a5e2-0800200c9a66"
        );
        assert_eq!(config.scan.scan_period(), Duration::from_secs(2));
        assert_eq!(config.scan.region_exit(), Duration::from_secs(10));
        assert!(config.server.activate_on_start);
    }

    #[test]
    fn test_region_conversion() {
        let config = RegionConfig {
            major: Some(4),
            ..RegionConfig::default()
        };
        let region = config.to_region();
        assert_eq!(region.name, "myBeacon");
        assert_eq!(region.major, Some(4));
        assert_eq!(region.minor, None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.region.name, DEFAULT_REGION_NAME);
    }

    #[test]
    fn test_environment_overrides_apply() {
        // only keys no other test asserts on, env is process-wide
        std::env::set_var("BEACON_DEVICE__IDENTITY", "bench-pi");
        std::env::set_var("BEACON_SERVER__ACTIVATE_ON_START", "false");

        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_or_default(dir.path().join("missing.toml"));

        std::env::remove_var("BEACON_DEVICE__IDENTITY");
        std::env::remove_var("BEACON_SERVER__ACTIVATE_ON_START");

        let config = result.unwrap();
        assert_eq!(config.device.identity.as_deref(), Some("bench-pi"));
        assert!(!config.server.activate_on_start);
        assert_eq!(config.region.name, DEFAULT_REGION_NAME);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[region]
name = "lab"
major = 7

[logging]
directory = "/tmp/beacon-test"
timezone = "Europe/Berlin"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.region.name, "lab");
        assert_eq!(config.region.major, Some(7));
        assert_eq!(config.region.proximity_uuid, DEFAULT_PROXIMITY_UUID);
        assert_eq!(config.logging.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(config.logging.directory, PathBuf::from("/tmp/beacon-test"));
        assert_eq!(config.scan, ScanConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.region.name = "hallway".to_string();
        config.logging.timezone = chrono_tz::America::New_York;
        config.scan.scan_period_ms = 1000;

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.region, config.region);
        assert_eq!(loaded.logging.timezone, chrono_tz::America::New_York);
        assert_eq!(loaded.scan.scan_period_ms, 1000);
    }

    #[test]
    fn test_invalid_timezone_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\ntimezone = \"Mars/Olympus\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.region.name = "bad name!".to_string();
        config.device.identity = Some("a;b".to_string());
        config.scan.scan_period_ms = 0;

        match config.validate().unwrap_err() {
            ConfigError::MultipleValidationErrors(errors) => {
                let text: Vec<String> = errors.iter().map(ToString::to_string).collect();
                assert_eq!(errors.len(), 3, "{text:?}");
                assert!(text.iter().any(|e| e.contains("region.name")));
                assert!(text.iter().any(|e| e.contains("device.identity")));
                assert!(text.iter().any(|e| e.contains("scan.scan_period_ms")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_single_validation_error() {
        let mut config = Config::default();
        config.scan.region_exit_ms = 500;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "scan.region_exit_ms"
        ));
    }

    #[test]
    fn test_region_name_format() {
        assert!(is_valid_region_name("myBeacon"));
        assert!(is_valid_region_name("floor-2.room_3"));
        assert!(!is_valid_region_name(""));
        assert!(!is_valid_region_name("has space"));
        assert!(!is_valid_region_name(&"x".repeat(65)));
    }

    #[test]
    fn test_device_identity_format() {
        assert!(is_valid_device_identity("Galaxy S8"));
        assert!(!is_valid_device_identity("a;b"));
        assert!(!is_valid_device_identity("line\nbreak"));
        assert!(!is_valid_device_identity(""));
    }
}
