//! Image compression with the `image` and `webp` crates.

use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{AnimationDecoder, DynamicImage};

use super::media::ImageFormat;
use super::tiers::SizeTiers;
use super::{Compressor, Parameter};
use crate::error::{Error, Result};

/// PNG has no quality knob; at or below this quality the slowest deflate is used.
const PNG_BEST_COMPRESSION_QUALITY: u8 = 75;

/// Re-encodes an image in its own format at a size-dependent quality.
#[derive(Debug, Clone, Copy)]
pub struct ImageCompressor {
    format: ImageFormat,
    tiers: SizeTiers,
}

impl ImageCompressor {
    /// Create a compressor for one image format.
    #[must_use]
    pub const fn new(format: ImageFormat, tiers: SizeTiers) -> Self {
        Self { format, tiers }
    }
}

#[async_trait]
impl Compressor for ImageCompressor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn parameter(&self, size: u64) -> Parameter {
        Parameter::Quality(self.tiers.tier(size).image_quality())
    }

    fn output_extension(&self, _input: &Path) -> String {
        self.format.extension().to_string()
    }

    async fn compress(&self, input: &Path, output: &Path, parameter: Parameter) -> Result<()> {
        let Parameter::Quality(quality) = parameter else {
            return Err(Error::Internal(format!(
                "image compressor cannot use {parameter}"
            )));
        };

        let format = self.format;
        let input = input.to_path_buf();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let data = std::fs::read(&input)?;
            let encoded = encode(&data, format, quality)?;
            std::fs::write(&output, encoded)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("image task failed: {e}")))?
    }
}

/// Decode `data` and re-encode it as `format` at `quality` (1-100).
pub fn encode(data: &[u8], format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    // Animated GIFs are re-encoded frame by frame.
    match format {
        ImageFormat::Gif => encode_gif(data, quality),
        ImageFormat::Jpeg => encode_jpeg(&image::load_from_memory(data)?, quality),
        ImageFormat::Png => encode_png(&image::load_from_memory(data)?, quality),
        ImageFormat::WebP => encode_webp(&image::load_from_memory(data)?, quality),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
    Ok(out)
}

fn encode_png(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let compression = if quality <= PNG_BEST_COMPRESSION_QUALITY {
        CompressionType::Best
    } else {
        CompressionType::Default
    };

    let mut out = Vec::new();
    img.write_with_encoder(PngEncoder::new_with_quality(
        &mut out,
        compression,
        FilterType::Adaptive,
    ))?;
    Ok(out)
}

fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    // libwebp only accepts 8-bit RGB or RGBA buffers.
    let img = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    let encoder = webp::Encoder::from_image(&img).map_err(|e| Error::EncoderFailed {
        tool: "webp".to_string(),
        reason: e.to_string(),
    })?;

    Ok(encoder.encode(f32::from(quality)).to_vec())
}

fn encode_gif(data: &[u8], quality: u8) -> Result<Vec<u8>> {
    let frames = GifDecoder::new(Cursor::new(data))?
        .into_frames()
        .collect_frames()?;

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, gif_speed(quality));
        encoder.set_repeat(Repeat::Infinite)?;
        encoder.encode_frames(frames)?;
    }
    Ok(out)
}

/// Map quality to the GIF quantizer speed (1 = best, 30 = fastest).
fn gif_speed(quality: u8) -> i32 {
    (i32::from(100 - quality.min(100)) / 2).clamp(1, 30)
}
