//! Adaptive compression engine.
//!
//! The engine classifies an input, asks the matching [`Compressor`] for the
//! encoder parameter its size tier calls for, runs the encoder into a
//! partial file and then measures the result. A result that is both short
//! of the minimum savings and not smaller than the input is discarded in
//! favour of a copy of the original.
//!
//! ## Parameters by size tier
//!
//! | Media | > large | > medium | otherwise |
//! |-------|---------|----------|-----------|
//! | Image | quality 70 | quality 75 | quality 80 |
//! | Video | CRF 28 | CRF 25 | CRF 23 |
//! | Audio | 96 kbps | 112 kbps | 128 kbps |
//! | PDF | stream compression | | |

mod av;
mod media;
mod pdf;
mod process;
mod raster;
mod tiers;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use crate::config::CompressionConfig;
use crate::error::{Error, Result};

pub use av::{audio_args, video_args, AudioCompressor, FfmpegSettings, VideoCompressor};
pub use media::{classify, classify_name, sniff, ImageFormat, Media, MediaKind};
pub use pdf::PdfCompressor;
pub use process::ToolCommand;
pub use raster::{encode as encode_image, ImageCompressor};
pub use tiers::{SizeTiers, Tier};

/// Bytes read from the start of a file for content sniffing.
const SNIFF_LEN: usize = 512;

/// The encoder setting chosen for one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Parameter {
    /// Image quality (1-100)
    Quality(u8),
    /// x264 constant rate factor
    Crf(u8),
    /// Audio bitrate in kbps
    BitrateKbps(u32),
    /// PDF stream compression (no tunable)
    StreamCompression,
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quality(q) => write!(f, "quality {q}"),
            Self::Crf(crf) => write!(f, "crf {crf}"),
            Self::BitrateKbps(kbps) => write!(f, "{kbps} kbps"),
            Self::StreamCompression => write!(f, "stream compression"),
        }
    }
}

/// A per-media compressor.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Parameter to use for an input of `size` bytes.
    fn parameter(&self, size: u64) -> Parameter;

    /// Extension of the produced file, without the dot.
    fn output_extension(&self, input: &Path) -> String;

    /// Compress `input` into `output`.
    async fn compress(&self, input: &Path, output: &Path, parameter: Parameter) -> Result<()>;
}

/// What the engine kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionOutcome {
    /// The encoder output was kept
    Compressed,
    /// The encoder output did not pay off; the original was copied through
    KeptOriginal,
}

/// Result of compressing one file.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionReport {
    /// Media category
    pub kind: MediaKind,
    /// Format label (`jpg`, `video`, `pdf`...)
    pub format: String,
    /// Input size in bytes
    pub original_size: u64,
    /// Size of the file at `output_path`
    pub output_size: u64,
    /// Encoder parameter that was used
    pub parameter: Parameter,
    /// Whether the encoder output or the original was kept
    pub outcome: CompressionOutcome,
    /// Where the result was written
    pub output_path: PathBuf,
    /// Wall time spent
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl CompressionReport {
    /// Bytes saved as a percentage of the original size.
    #[must_use]
    pub fn savings_percent(&self) -> f64 {
        savings_ratio(self.original_size, self.output_size) * 100.0
    }

    /// Bytes saved (zero when the output is not smaller).
    #[must_use]
    pub const fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.output_size)
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// `(original - output) / original`, negative when the output grew.
#[must_use]
pub fn savings_ratio(original: u64, output: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - output as f64) / original as f64
}

/// Whether an encoder result should be discarded for the original.
///
/// Both conditions must hold: savings below `min_savings` and an output
/// no smaller than the input.
#[must_use]
pub fn should_keep_original(original: u64, output: u64, min_savings: f64) -> bool {
    savings_ratio(original, output) < min_savings && output >= original
}

/// Drives classification, compression and the savings check.
#[derive(Debug, Clone)]
pub struct Engine {
    config: CompressionConfig,
}

impl Engine {
    /// Create an engine from compression settings.
    #[must_use]
    pub const fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// The settings this engine runs with.
    #[must_use]
    pub const fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// The compressor responsible for `media`.
    #[must_use]
    pub fn compressor_for(&self, media: Media) -> Box<dyn Compressor> {
        let tiers = SizeTiers::from(&self.config);
        match media {
            Media::Image(format) => Box::new(ImageCompressor::new(format, tiers)),
            Media::Video => Box::new(VideoCompressor::new(
                FfmpegSettings::from(&self.config),
                tiers,
            )),
            Media::Audio => Box::new(AudioCompressor::new(
                FfmpegSettings::from(&self.config),
                tiers,
            )),
            Media::Pdf => Box::new(PdfCompressor),
        }
    }

    /// Classify `input` (named `original_name` by its uploader) and
    /// compress it into `output_dir/output_stem.<ext>`.
    pub async fn compress(
        &self,
        input: &Path,
        original_name: &str,
        output_dir: &Path,
        output_stem: &str,
    ) -> Result<CompressionReport> {
        let head = read_head(input).await?;
        let media = classify(original_name, &head)?;
        let compressor = self.compressor_for(media);

        self.compress_with(
            compressor.as_ref(),
            media,
            input,
            original_name,
            output_dir,
            output_stem,
        )
        .await
    }

    /// Compress a local file into `output_dir`, keeping its file stem.
    pub async fn compress_file(&self, input: &Path, output_dir: &Path) -> Result<CompressionReport> {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidInput(format!("bad file name: {}", input.display())))?;
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);

        self.compress(input, name, output_dir, stem).await
    }

    /// Run a specific compressor and apply the savings check.
    pub async fn compress_with(
        &self,
        compressor: &dyn Compressor,
        media: Media,
        input: &Path,
        original_name: &str,
        output_dir: &Path,
        output_stem: &str,
    ) -> Result<CompressionReport> {
        let started = Instant::now();

        let original_size = match tokio::fs::metadata(input).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound(input.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        if original_size == 0 {
            return Err(Error::InvalidInput("file is empty".to_string()));
        }

        let parameter = compressor.parameter(original_size);
        let extension = compressor.output_extension(Path::new(original_name));

        tokio::fs::create_dir_all(output_dir).await?;
        let partial = output_dir.join(format!(".{output_stem}.partial.{extension}"));

        tracing::info!(
            compressor = compressor.name(),
            file = %original_name,
            size = original_size,
            %parameter,
            "Compressing"
        );

        if let Err(e) = compressor.compress(input, &partial, parameter).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        let output_size = match tokio::fs::metadata(&partial).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                return Err(Error::EncoderFailed {
                    tool: compressor.name().to_string(),
                    reason: format!("no output produced: {e}"),
                });
            }
        };

        let (outcome, output_path, output_size) =
            if should_keep_original(original_size, output_size, self.config.min_savings) {
                tokio::fs::remove_file(&partial).await?;
                let original_ext = original_extension(original_name)
                    .unwrap_or_else(|| media.label().to_string());
                let kept = output_dir.join(format!("{output_stem}.{original_ext}"));
                if !same_file(input, &kept).await {
                    tokio::fs::copy(input, &kept).await?;
                }
                tracing::info!(
                    file = %original_name,
                    original_size,
                    output_size,
                    "Compression did not pay off, keeping original"
                );
                (CompressionOutcome::KeptOriginal, kept, original_size)
            } else {
                let path = output_dir.join(format!("{output_stem}.{extension}"));
                tokio::fs::rename(&partial, &path).await?;
                (CompressionOutcome::Compressed, path, output_size)
            };

        let report = CompressionReport {
            kind: media.kind(),
            format: media.label().to_string(),
            original_size,
            output_size,
            parameter,
            outcome,
            output_path,
            duration: started.elapsed(),
        };

        tracing::info!(
            file = %original_name,
            outcome = ?report.outcome,
            savings_percent = format_args!("{:.1}", report.savings_percent()),
            elapsed_ms = report.duration.as_millis(),
            "Compression finished"
        );

        Ok(report)
    }
}

fn original_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Whether both paths resolve to the same existing file.
async fn same_file(a: &Path, b: &Path) -> bool {
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn read_head(path: &Path) -> Result<Vec<u8>> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(head)
}
