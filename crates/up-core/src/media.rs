//! Media-domain enums for output containers and quality presets.
//!
//! All enums serialize in lowercase and implement `Display` / `FromStr` with
//! the same spelling, so config files and CLI flags agree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Output container formats an export can produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Mov,
    M4v,
}

impl Container {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::M4v => "m4v",
        }
    }

    /// Muxer name understood by ffmpeg's `-f` flag.
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::M4v => "ipod",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "mov" => Ok(Self::Mov),
            "m4v" => Ok(Self::M4v),
            other => Err(format!("unknown container '{other}' (expected mp4, mov, m4v)")),
        }
    }
}

// ---------------------------------------------------------------------------
// QualityPreset
// ---------------------------------------------------------------------------

/// Quality presets for an export.
///
/// `Passthrough` copies streams without re-encoding. Its output size cannot be
/// estimated up front, which makes the disk-space admission check best-effort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    #[default]
    Passthrough,
    Low,
    Medium,
    Highest,
    Hd720,
    Hd1080,
    Uhd2160,
}

impl QualityPreset {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough)
    }

    /// Target combined audio + video bitrate in bits per second, used to
    /// estimate the output size. `None` when no estimate is possible.
    pub fn target_bitrate(&self) -> Option<u64> {
        match self {
            Self::Passthrough => None,
            Self::Low => Some(700_000),
            Self::Medium => Some(2_500_000),
            Self::Highest => Some(12_000_000),
            Self::Hd720 => Some(5_000_000),
            Self::Hd1080 => Some(8_000_000),
            Self::Uhd2160 => Some(35_000_000),
        }
    }

    /// Maximum output height in pixels, if the preset scales.
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::Passthrough | Self::Highest => None,
            Self::Low => Some(360),
            Self::Medium => Some(480),
            Self::Hd720 => Some(720),
            Self::Hd1080 => Some(1080),
            Self::Uhd2160 => Some(2160),
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passthrough => write!(f, "passthrough"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::Highest => write!(f, "highest"),
            Self::Hd720 => write!(f, "hd720"),
            Self::Hd1080 => write!(f, "hd1080"),
            Self::Uhd2160 => write!(f, "uhd2160"),
        }
    }
}

impl FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passthrough" => Ok(Self::Passthrough),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "highest" => Ok(Self::Highest),
            "hd720" => Ok(Self::Hd720),
            "hd1080" => Ok(Self::Hd1080),
            "uhd2160" => Ok(Self::Uhd2160),
            other => Err(format!("unknown quality preset '{other}'")),
        }
    }
}
