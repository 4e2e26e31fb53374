//! Error types for Squish.
//!
//! This module provides a unified error type for all Squish operations,
//! with specific error variants for different failure modes.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A specialized `Result` type for Squish operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Squish.
#[derive(Error, Debug)]
pub enum Error {
    /// File type is not one of the supported media kinds (E001)
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// External encoder binary is not installed (E002)
    #[error("required tool '{0}' was not found")]
    ToolMissing(String),

    /// Job does not exist (E003)
    #[error("job '{0}' not found")]
    JobNotFound(String),

    /// Job output was purged after its retention window (E004)
    #[error("job '{0}' has expired")]
    JobExpired(String),

    /// Encoder ran but failed (E005)
    #[error("{tool} failed: {reason}")]
    EncoderFailed {
        /// Tool or library that failed
        tool: String,
        /// Failure detail (stderr tail or library message)
        reason: String,
    },

    /// Missing or invalid credentials (E006)
    #[error("authentication required: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (E007)
    #[error("permission denied: {0}")]
    Forbidden(String),

    /// Upload exceeds the configured limit (E008)
    #[error("upload too large: {size} bytes exceeds limit of {limit} bytes")]
    UploadTooLarge {
        /// Bytes received
        size: u64,
        /// Configured limit
        limit: u64,
    },

    /// Username already registered (E009)
    #[error("user '{0}' already exists")]
    UserExists(String),

    /// User does not exist (E010)
    #[error("user '{0}' not found")]
    UserNotFound(String),

    /// Rejected input value (E011)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// File not found
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Persistent store could not be read or written
    #[error("store error: {0}")]
    StoreError(String),

    /// External encoder exceeded its time budget (E012)
    #[error("{tool} timed out after {secs} seconds")]
    Timeout {
        /// Tool that was killed
        tool: String,
        /// Time budget in seconds
        secs: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedMedia(_) => Some("E001"),
            Self::ToolMissing(_) => Some("E002"),
            Self::JobNotFound(_) => Some("E003"),
            Self::JobExpired(_) => Some("E004"),
            Self::EncoderFailed { .. } => Some("E005"),
            Self::Unauthorized(_) => Some("E006"),
            Self::Forbidden(_) => Some("E007"),
            Self::UploadTooLarge { .. } => Some("E008"),
            Self::UserExists(_) => Some("E009"),
            Self::UserNotFound(_) => Some("E010"),
            Self::InvalidInput(_) => Some("E011"),
            Self::Timeout { .. } => Some("E012"),
            _ => None,
        }
    }

    /// Returns whether this error was caused by the caller's input rather
    /// than by the service.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMedia(_)
                | Self::JobNotFound(_)
                | Self::JobExpired(_)
                | Self::Unauthorized(_)
                | Self::Forbidden(_)
                | Self::UploadTooLarge { .. }
                | Self::UserExists(_)
                | Self::UserNotFound(_)
                | Self::InvalidInput(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ToolMissing(_) => Some(
                "Install ffmpeg and make sure it is on PATH,\n\
                 or point [compression] ffmpeg_path at the binary in config.toml",
            ),
            Self::UnsupportedMedia(_) => Some(
                "Supported inputs: JPEG, PNG, WebP, GIF images,\n\
                 common video and audio containers, and PDF documents",
            ),
            Self::ConfigError(_) => Some(
                "Check the file reported by:\n\
                   squish config path",
            ),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::EncoderFailed {
            tool: "image".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Self::EncoderFailed {
            tool: "lopdf".to_string(),
            reason: err.to_string(),
        }
    }
}
