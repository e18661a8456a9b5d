//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `greenhouse.toml` in the working directory unless a path is
//! given on the command line. Every field has a sensible default so the file
//! is optional. Environment variables take precedence over file values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use greenhouse_adapter_gpio_sysfs::DEFAULT_ROOT;
use greenhouse_domain::device::Device;
use greenhouse_domain::error::ConfigurationError;
use greenhouse_domain::registry::DeviceRegistry;

/// Config file read when no path is given.
pub const DEFAULT_PATH: &str = "greenhouse.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Signal backend settings.
    pub gpio: GpioConfig,
    /// Device catalogue; empty means the built-in greenhouse catalogue.
    pub devices: Vec<DeviceConfig>,
    /// Extra alias → canonical id entries.
    pub aliases: BTreeMap<String, String>,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Which signal backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Detect sysfs GPIO; fall back to the virtual backend if allowed.
    #[default]
    Auto,
    /// Real GPIO is required.
    Sysfs,
    /// Always use the in-memory backend.
    Mock,
}

impl FromStr for BackendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sysfs" => Ok(Self::Sysfs),
            "mock" | "virtual" => Ok(Self::Mock),
            other => Err(ConfigError::Validation(format!(
                "unknown gpio backend '{other}' (expected auto, sysfs or mock)"
            ))),
        }
    }
}

/// Signal backend configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub backend: BackendMode,
    /// In `auto` mode, use the virtual backend when sysfs GPIO is missing.
    pub allow_mock_fallback: bool,
    /// Root of the sysfs GPIO tree.
    pub sysfs_root: PathBuf,
    /// Delay between a write and its debug readback, in milliseconds.
    pub settle_ms: u64,
    /// Let the virtual backend report written levels back.
    pub mock_readback: bool,
}

impl GpioConfig {
    #[must_use]
    pub fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    /// BCM pin number.
    pub pin: u32,
    #[serde(default = "default_active_low")]
    pub active_low: bool,
}

fn default_active_low() -> bool {
    true
}

impl Config {
    /// Load configuration from `path` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path.as_ref())?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(val) = var("GREENHOUSE_HOST") {
            self.server.host = val;
        }
        if let Some(val) = var("GREENHOUSE_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = var("GREENHOUSE_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Some(val) = var("GREENHOUSE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("GREENHOUSE_GPIO_BACKEND") {
            self.gpio.backend = val.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.gpio.settle_ms > 1_000 {
            return Err(ConfigError::Validation(
                "gpio.settle_ms must not exceed 1000".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Build the device catalogue.
    ///
    /// Without `[[devices]]` the built-in catalogue is used; `[aliases]` are
    /// added on top either way.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for any catalogue invariant violation
    /// (duplicate pin, conflicting alias, ...).
    pub fn registry(&self) -> Result<DeviceRegistry, ConfigurationError> {
        let mut builder = if self.devices.is_empty() {
            DeviceRegistry::greenhouse_default_builder()?
        } else {
            let mut builder = DeviceRegistry::builder();
            for device in &self.devices {
                builder = builder.device(
                    Device::builder()
                        .id(&device.id)
                        .pin(device.pin)
                        .active_low(device.active_low)
                        .build()?,
                );
            }
            builder
        };
        for (alias, target) in &self.aliases {
            builder = builder.alias(alias, target);
        }
        builder.build()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "greenhoused=info,greenhouse=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            backend: BackendMode::Auto,
            allow_mock_fallback: true,
            sysfs_root: PathBuf::from(DEFAULT_ROOT),
            settle_ms: 20,
            mock_readback: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
