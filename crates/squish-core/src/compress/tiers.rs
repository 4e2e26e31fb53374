//! Size tiers and the encoder parameters they select.

use serde::{Deserialize, Serialize};

use crate::config::CompressionConfig;

/// Size bracket of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Above the large threshold
    Large,
    /// Above the medium threshold
    Medium,
    /// Everything else
    Small,
}

impl Tier {
    /// Encoder quality (1-100) for images.
    #[must_use]
    pub const fn image_quality(self) -> u8 {
        match self {
            Self::Large => 70,
            Self::Medium => 75,
            Self::Small => 80,
        }
    }

    /// x264 constant rate factor for video.
    #[must_use]
    pub const fn video_crf(self) -> u8 {
        match self {
            Self::Large => 28,
            Self::Medium => 25,
            Self::Small => 23,
        }
    }

    /// Audio bitrate in kbps.
    #[must_use]
    pub const fn audio_kbps(self) -> u32 {
        match self {
            Self::Large => 96,
            Self::Medium => 112,
            Self::Small => 128,
        }
    }
}

/// Thresholds separating the tiers. Comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeTiers {
    /// Inputs strictly larger than this are [`Tier::Large`]
    pub large: u64,
    /// Inputs strictly larger than this are at least [`Tier::Medium`]
    pub medium: u64,
}

impl Default for SizeTiers {
    fn default() -> Self {
        Self {
            large: crate::DEFAULT_LARGE_THRESHOLD,
            medium: crate::DEFAULT_MEDIUM_THRESHOLD,
        }
    }
}

impl From<&CompressionConfig> for SizeTiers {
    fn from(config: &CompressionConfig) -> Self {
        Self {
            large: config.large_threshold,
            medium: config.medium_threshold,
        }
    }
}

impl SizeTiers {
    /// Pick the tier for an input of `size` bytes.
    #[must_use]
    pub const fn tier(&self, size: u64) -> Tier {
        if size > self.large {
            Tier::Large
        } else if size > self.medium {
            Tier::Medium
        } else {
            Tier::Small
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MB;

    #[test]
    fn test_tier_boundaries_are_strict() {
        let tiers = SizeTiers::default();

        assert_eq!(tiers.tier(0), Tier::Small);
        assert_eq!(tiers.tier(2 * MB), Tier::Small);
        assert_eq!(tiers.tier(2 * MB + 1), Tier::Medium);
        assert_eq!(tiers.tier(5 * MB), Tier::Medium);
        assert_eq!(tiers.tier(5 * MB + 1), Tier::Large);
        assert_eq!(tiers.tier(u64::MAX), Tier::Large);
    }

    #[test]
    fn test_tier_parameters() {
        assert_eq!(
            [Tier::Large, Tier::Medium, Tier::Small].map(Tier::image_quality),
            [70, 75, 80]
        );
        assert_eq!(
            [Tier::Large, Tier::Medium, Tier::Small].map(Tier::video_crf),
            [28, 25, 23]
        );
        assert_eq!(
            [Tier::Large, Tier::Medium, Tier::Small].map(Tier::audio_kbps),
            [96, 112, 128]
        );
    }

    #[test]
    fn test_tiers_from_config() {
        let config = CompressionConfig {
            large_threshold: 1000,
            medium_threshold: 100,
            ..CompressionConfig::default()
        };
        let tiers = SizeTiers::from(&config);

        assert_eq!(tiers.tier(50), Tier::Small);
        assert_eq!(tiers.tier(500), Tier::Medium);
        assert_eq!(tiers.tier(5000), Tier::Large);
    }
}
