//! Configuration management for Squish.
//!
//! This module handles loading, saving, and managing Squish configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/squish/config.toml` |
//! | macOS | `~/Library/Application Support/app.squish.Squish/config.toml` |
//! | Windows | `%APPDATA%\Squish\Squish\config\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use squish_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Listening on port {}", config.server.port);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for Squish.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Where uploads and results live
    pub storage: StorageConfig,
    /// Compression engine settings
    pub compression: CompressionConfig,
    /// Job store settings
    pub jobs: JobsConfig,
    /// Account and token settings
    pub auth: AuthConfig,
}

/// HTTP server configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind to localhost only
    pub localhost_only: bool,
    /// Public base URL used in download links (e.g. `https://squish.example.com`)
    pub public_url: Option<String>,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: u64,
    /// Allow cross-origin requests
    pub cors: bool,
    /// Allow self-service account registration
    pub allow_registration: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            localhost_only: false,
            public_url: None,
            max_upload_bytes: crate::DEFAULT_MAX_UPLOAD_BYTES,
            cors: false,
            allow_registration: true,
        }
    }
}

/// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory (None = platform default)
    pub data_dir: Option<PathBuf>,
    /// How long results stay downloadable
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            retention: Duration::from_secs(crate::DEFAULT_RETENTION_SECS),
        }
    }
}

impl StorageConfig {
    /// Resolve the data directory, falling back to the platform default.
    #[must_use]
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(Config::data_dir)
            .unwrap_or_else(|| PathBuf::from("squish-data"))
    }
}

/// Compression engine configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Minimum savings ratio (0.0-1.0) below which the original may be kept
    pub min_savings: f64,
    /// Inputs larger than this use the most aggressive tier
    pub large_threshold: u64,
    /// Inputs larger than this use the middle tier
    pub medium_threshold: u64,
    /// ffmpeg binary (name on PATH or absolute path)
    pub ffmpeg_path: PathBuf,
    /// Time budget for a single external encoder run
    #[serde(with = "humantime_serde")]
    pub tool_timeout: Duration,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            min_savings: crate::DEFAULT_MIN_SAVINGS,
            large_threshold: crate::DEFAULT_LARGE_THRESHOLD,
            medium_threshold: crate::DEFAULT_MEDIUM_THRESHOLD,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            tool_timeout: Duration::from_secs(crate::DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

/// Job store configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Maximum jobs kept in the store
    pub max_entries: usize,
    /// Interval between sweeps for expired jobs
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            sweep_interval: Duration::from_secs(10 * 60),
        }
    }
}

/// Authentication configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token signing secret (None = random per process)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    /// Lifetime of issued tokens
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl: Duration::from_secs(12 * 60 * 60),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// A missing file yields the default configuration.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check values that would make the service misbehave.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.compression.min_savings) {
            return Err(Error::InvalidConfig {
                key: "compression.min_savings".to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }

        if self.compression.medium_threshold > self.compression.large_threshold {
            return Err(Error::InvalidConfig {
                key: "compression.medium_threshold".to_string(),
                reason: "must not exceed large_threshold".to_string(),
            });
        }

        if self.server.max_upload_bytes == 0 {
            return Err(Error::InvalidConfig {
                key: "server.max_upload_bytes".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.jobs.max_entries == 0 {
            return Err(Error::InvalidConfig {
                key: "jobs.max_entries".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.compression.tool_timeout.is_zero() {
            return Err(Error::InvalidConfig {
                key: "compression.tool_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.jobs.sweep_interval.is_zero() {
            return Err(Error::InvalidConfig {
                key: "jobs.sweep_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("app", "squish", "Squish")
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn data_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

/// Serde helpers for human-readable durations (`"90s"`, `"5m"`, `"24h"`).
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a duration as whole seconds with an `s` suffix.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize a duration with an `s`, `m` or `h` suffix.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{s}'")))
    }

    /// Parse a duration string like `"30s"`, `"5m"` or `"24h"`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Duration> {
        let s = s.trim();
        let (num, unit) = s.split_at(s.char_indices().last()?.0);
        let num: u64 = num.parse().ok()?;
        let secs = match unit {
            "s" => num,
            "m" => num.checked_mul(60)?,
            "h" => num.checked_mul(60 * 60)?,
            _ => return None,
        };
        Some(Duration::from_secs(secs))
    }
}
