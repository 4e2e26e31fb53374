//! Video and audio compression through ffmpeg.
//!
//! Video is re-encoded to H.264/AAC in an MP4 container with a
//! size-dependent CRF; audio is re-encoded to MP3 at a size-dependent
//! bitrate. Codec and preset are fixed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::process::ToolCommand;
use super::tiers::SizeTiers;
use super::{Compressor, Parameter};
use crate::config::CompressionConfig;
use crate::error::{Error, Result};

/// Video codec passed to ffmpeg.
pub const VIDEO_CODEC: &str = "libx264";

/// x264 preset passed to ffmpeg.
pub const VIDEO_PRESET: &str = "medium";

/// Audio track bitrate inside compressed video.
pub const VIDEO_AUDIO_BITRATE: &str = "128k";

/// Audio codec passed to ffmpeg for audio-only inputs.
pub const AUDIO_CODEC: &str = "libmp3lame";

/// Where ffmpeg lives and how long it may run.
#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    /// Binary name or path
    pub program: PathBuf,
    /// Time budget per run
    pub timeout: Duration,
}

impl From<&CompressionConfig> for FfmpegSettings {
    fn from(config: &CompressionConfig) -> Self {
        Self {
            program: config.ffmpeg_path.clone(),
            timeout: config.tool_timeout,
        }
    }
}

/// ffmpeg arguments for a video re-encode at `crf`.
#[must_use]
pub fn video_args(input: &Path, output: &Path, crf: u8) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.into());
    args.extend(
        [
            "-c:v",
            VIDEO_CODEC,
            "-preset",
            VIDEO_PRESET,
            "-crf",
            crf.to_string().as_str(),
            "-c:a",
            "aac",
            "-b:a",
            VIDEO_AUDIO_BITRATE,
            "-movflags",
            "+faststart",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(output.into());
    args
}

/// ffmpeg arguments for an audio re-encode at `kbps`.
#[must_use]
pub fn audio_args(input: &Path, output: &Path, kbps: u32) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.into());
    args.extend(
        ["-vn", "-c:a", AUDIO_CODEC, "-b:a", format!("{kbps}k").as_str()]
            .into_iter()
            .map(OsString::from),
    );
    args.push(output.into());
    args
}

/// Re-encodes video with a size-dependent CRF.
#[derive(Debug, Clone)]
pub struct VideoCompressor {
    ffmpeg: FfmpegSettings,
    tiers: SizeTiers,
}

impl VideoCompressor {
    /// Create a video compressor.
    #[must_use]
    pub const fn new(ffmpeg: FfmpegSettings, tiers: SizeTiers) -> Self {
        Self { ffmpeg, tiers }
    }
}

#[async_trait]
impl Compressor for VideoCompressor {
    fn name(&self) -> &'static str {
        "video"
    }

    fn parameter(&self, size: u64) -> Parameter {
        Parameter::Crf(self.tiers.tier(size).video_crf())
    }

    fn output_extension(&self, _input: &Path) -> String {
        "mp4".to_string()
    }

    async fn compress(&self, input: &Path, output: &Path, parameter: Parameter) -> Result<()> {
        let Parameter::Crf(crf) = parameter else {
            return Err(Error::Internal(format!(
                "video compressor cannot use {parameter}"
            )));
        };

        ToolCommand::new(&self.ffmpeg.program, self.ffmpeg.timeout)
            .args(video_args(input, output, crf))
            .run()
            .await
    }
}

/// Re-encodes audio with a size-dependent bitrate.
#[derive(Debug, Clone)]
pub struct AudioCompressor {
    ffmpeg: FfmpegSettings,
    tiers: SizeTiers,
}

impl AudioCompressor {
    /// Create an audio compressor.
    #[must_use]
    pub const fn new(ffmpeg: FfmpegSettings, tiers: SizeTiers) -> Self {
        Self { ffmpeg, tiers }
    }
}

#[async_trait]
impl Compressor for AudioCompressor {
    fn name(&self) -> &'static str {
        "audio"
    }

    fn parameter(&self, size: u64) -> Parameter {
        Parameter::BitrateKbps(self.tiers.tier(size).audio_kbps())
    }

    fn output_extension(&self, _input: &Path) -> String {
        "mp3".to_string()
    }

    async fn compress(&self, input: &Path, output: &Path, parameter: Parameter) -> Result<()> {
        let Parameter::BitrateKbps(kbps) = parameter else {
            return Err(Error::Internal(format!(
                "audio compressor cannot use {parameter}"
            )));
        };

        ToolCommand::new(&self.ffmpeg.program, self.ffmpeg.timeout)
            .args(audio_args(input, output, kbps))
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MB;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn missing_ffmpeg() -> FfmpegSettings {
        FfmpegSettings {
            program: PathBuf::from("squish-test-missing-ffmpeg"),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_video_args() {
        let args = strings(&video_args(Path::new("in.mov"), Path::new("out.mp4"), 25));
        assert_eq!(
            args,
            [
                "-hide_banner", "-nostdin", "-y", "-i", "in.mov", "-c:v", "libx264", "-preset",
                "medium", "-crf", "25", "-c:a", "aac", "-b:a", "128k", "-movflags", "+faststart",
                "out.mp4",
            ]
        );
    }

    #[test]
    fn test_audio_args() {
        let args = strings(&audio_args(Path::new("in.wav"), Path::new("out.mp3"), 96));
        assert_eq!(
            args,
            [
                "-hide_banner", "-nostdin", "-y", "-i", "in.wav", "-vn", "-c:a", "libmp3lame",
                "-b:a", "96k", "out.mp3",
            ]
        );
    }

    #[test]
    fn test_parameters_follow_tiers() {
        let video = VideoCompressor::new(missing_ffmpeg(), SizeTiers::default());
        assert_eq!(video.parameter(MB), Parameter::Crf(23));
        assert_eq!(video.parameter(3 * MB), Parameter::Crf(25));
        assert_eq!(video.parameter(10 * MB), Parameter::Crf(28));

        let audio = AudioCompressor::new(missing_ffmpeg(), SizeTiers::default());
        assert_eq!(audio.parameter(MB), Parameter::BitrateKbps(128));
        assert_eq!(audio.parameter(3 * MB), Parameter::BitrateKbps(112));
        assert_eq!(audio.parameter(10 * MB), Parameter::BitrateKbps(96));
    }

    #[test]
    fn test_output_extensions() {
        let video = VideoCompressor::new(missing_ffmpeg(), SizeTiers::default());
        let audio = AudioCompressor::new(missing_ffmpeg(), SizeTiers::default());
        assert_eq!(video.output_extension(Path::new("clip.mkv")), "mp4");
        assert_eq!(audio.output_extension(Path::new("song.flac")), "mp3");
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_reported() {
        let video = VideoCompressor::new(missing_ffmpeg(), SizeTiers::default());
        let err = video
            .compress(Path::new("in.mp4"), Path::new("out.mp4"), Parameter::Crf(23))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolMissing(_)));
    }

    #[tokio::test]
    async fn test_wrong_parameter_kind() {
        let audio = AudioCompressor::new(missing_ffmpeg(), SizeTiers::default());
        let err = audio
            .compress(Path::new("in.wav"), Path::new("out.mp3"), Parameter::Crf(23))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
