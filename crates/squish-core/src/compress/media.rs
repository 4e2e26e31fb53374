//! Media classification.
//!
//! Uploads are classified from their file name first (extension, then the
//! MIME type `mime_guess` derives from it) and, when the name says nothing
//! useful, from the leading bytes of the content.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Broad media category, which decides the compressor used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still or animated image
    Image,
    /// Video container
    Video,
    /// Audio file
    Audio,
    /// PDF document
    Pdf,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "Image"),
            Self::Video => write!(f, "Video"),
            Self::Audio => write!(f, "Audio"),
            Self::Pdf => write!(f, "PDF"),
        }
    }
}

/// Image formats with a dedicated encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG
    Jpeg,
    /// PNG
    Png,
    /// WebP
    WebP,
    /// GIF (possibly animated)
    Gif,
}

impl ImageFormat {
    /// Canonical file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Gif => "gif",
        }
    }

    /// MIME type of the format.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    fn from_image_crate(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }
}

/// A classified input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Media {
    /// Image in one of the supported formats
    Image(ImageFormat),
    /// Video
    Video,
    /// Audio
    Audio,
    /// PDF
    Pdf,
}

impl Media {
    /// The broad category of this media.
    #[must_use]
    pub const fn kind(self) -> MediaKind {
        match self {
            Self::Image(_) => MediaKind::Image,
            Self::Video => MediaKind::Video,
            Self::Audio => MediaKind::Audio,
            Self::Pdf => MediaKind::Pdf,
        }
    }

    /// Short format label used in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Image(format) => format.extension(),
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Pdf => "pdf",
        }
    }
}

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "mkv", "webm", "avi", "wmv", "flv", "3gp", "mpg", "mpeg", "ts", "ogv",
];

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "m4a", "ogg", "oga", "opus", "wma", "aif", "aiff",
];

/// Classify a file by its name.
///
/// Returns `Ok(None)` when the name carries no usable hint, and
/// `Err(UnsupportedMedia)` when it names a type Squish cannot handle.
pub fn classify_name(name: &str) -> Result<Option<Media>> {
    let Some(ext) = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
    else {
        return Ok(None);
    };

    let media = match ext.as_str() {
        "jpg" | "jpeg" | "jpe" | "jfif" => Some(Media::Image(ImageFormat::Jpeg)),
        "png" => Some(Media::Image(ImageFormat::Png)),
        "webp" => Some(Media::Image(ImageFormat::WebP)),
        "gif" => Some(Media::Image(ImageFormat::Gif)),
        "pdf" => Some(Media::Pdf),
        e if VIDEO_EXTENSIONS.contains(&e) => Some(Media::Video),
        e if AUDIO_EXTENSIONS.contains(&e) => Some(Media::Audio),
        _ => None,
    };

    if media.is_some() {
        return Ok(media);
    }

    match mime_guess::from_ext(&ext).first() {
        Some(mime) if mime.type_() == mime_guess::mime::VIDEO => Ok(Some(Media::Video)),
        Some(mime) if mime.type_() == mime_guess::mime::AUDIO => Ok(Some(Media::Audio)),
        Some(mime) => Err(Error::UnsupportedMedia(mime.essence_str().to_string())),
        None => Ok(None),
    }
}

/// Classify content from its leading bytes.
#[must_use]
pub fn sniff(head: &[u8]) -> Option<Media> {
    if head.starts_with(b"%PDF-") {
        return Some(Media::Pdf);
    }

    image::guess_format(head)
        .ok()
        .and_then(ImageFormat::from_image_crate)
        .map(Media::Image)
}

/// Classify an input from its name, falling back to its content.
pub fn classify(name: &str, head: &[u8]) -> Result<Media> {
    if let Some(media) = classify_name(name)? {
        return Ok(media);
    }

    sniff(head).ok_or_else(|| Error::UnsupportedMedia(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_images() {
        assert_eq!(
            classify_name("Photo.JPG").unwrap(),
            Some(Media::Image(ImageFormat::Jpeg))
        );
        assert_eq!(
            classify_name("logo.png").unwrap(),
            Some(Media::Image(ImageFormat::Png))
        );
        assert_eq!(
            classify_name("a.webp").unwrap(),
            Some(Media::Image(ImageFormat::WebP))
        );
        assert_eq!(
            classify_name("loop.gif").unwrap(),
            Some(Media::Image(ImageFormat::Gif))
        );
    }

    #[test]
    fn test_classify_av_and_pdf() {
        assert_eq!(classify_name("clip.mov").unwrap(), Some(Media::Video));
        assert_eq!(classify_name("song.flac").unwrap(), Some(Media::Audio));
        assert_eq!(classify_name("report.pdf").unwrap(), Some(Media::Pdf));
    }

    #[test]
    fn test_classify_unsupported_image() {
        let err = classify_name("scan.tiff").unwrap_err();
        assert!(matches!(err, Error::UnsupportedMedia(ref m) if m == "image/tiff"));
    }

    #[test]
    fn test_classify_without_extension() {
        assert_eq!(classify_name("README").unwrap(), None);
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(b"%PDF-1.7\n%..."), Some(Media::Pdf));
        assert_eq!(
            sniff(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"),
            Some(Media::Image(ImageFormat::Png))
        );
        assert_eq!(sniff(b"GIF89a\x01\0\x01\0"), Some(Media::Image(ImageFormat::Gif)));
        assert_eq!(sniff(b"hello world"), None);
    }

    #[test]
    fn test_classify_falls_back_to_content() {
        assert_eq!(classify("upload", b"%PDF-1.4").unwrap(), Media::Pdf);
        assert!(matches!(
            classify("notes", b"plain text"),
            Err(Error::UnsupportedMedia(_))
        ));
    }

    #[test]
    fn test_media_kind() {
        assert_eq!(Media::Image(ImageFormat::Png).kind(), MediaKind::Image);
        assert_eq!(Media::Pdf.kind(), MediaKind::Pdf);
        assert_eq!(Media::Image(ImageFormat::WebP).label(), "webp");
        assert_eq!(format!("{}", MediaKind::Pdf), "PDF");
    }
}
