//! # Squish Core Library
//!
//! `squish-core` provides the core functionality for Squish, a self-hosted
//! service that shrinks images, video, audio and PDF files.
//!
//! ## Features
//!
//! - **Adaptive parameters**: quality, CRF and bitrate are picked from the input size
//! - **Savings guard**: results that do not pay off fall back to the original file
//! - **Existing codecs**: the `image`/`webp` crates, ffmpeg and `lopdf` do the encoding
//! - **Web service**: upload, download links, accounts and an admin dashboard
//!
//! ## Modules
//!
//! - [`auth`] - User accounts, password hashing and access tokens
//! - [`compress`] - Media classification, size tiers and the per-media compressors
//! - [`config`] - Configuration management
//! - [`jobs`] - Persistent store of compression jobs and their outputs
//! - [`web`] - Embedded web server (feature `web`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use squish_core::compress::Engine;
//! use squish_core::config::CompressionConfig;
//!
//! let engine = Engine::new(CompressionConfig::default());
//! let report = engine.compress_file("photo.jpg".as_ref(), "out".as_ref()).await?;
//! println!("saved {:.1}%", report.savings_percent());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod auth;
pub mod compress;
pub mod config;
pub mod error;
pub mod jobs;

#[cfg(feature = "web")]
pub mod web;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One megabyte, the unit the size tiers are expressed in.
pub const MB: u64 = 1024 * 1024;

/// Default web server port
pub const DEFAULT_PORT: u16 = 8080;

/// Default size above which the most aggressive tier applies (5 MB)
pub const DEFAULT_LARGE_THRESHOLD: u64 = 5 * MB;

/// Default size above which the middle tier applies (2 MB)
pub const DEFAULT_MEDIUM_THRESHOLD: u64 = 2 * MB;

/// Default minimum savings ratio for a compressed result to be kept
pub const DEFAULT_MIN_SAVINGS: f64 = 0.40;

/// Default upload limit (100 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * MB;

/// Default time an external encoder may run before it is killed (10 minutes)
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 600;

/// Default retention of job outputs (24 hours)
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;
