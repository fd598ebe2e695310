//! Camera settings, status snapshots and stored file records.

use std::fmt;
use std::str::FromStr;

use camfleet_core::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest still the camera module can capture.
pub const MAX_WIDTH: u32 = 2592;
pub const MAX_HEIGHT: u32 = 1944;

/// Capture resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Validation(format!(
                "resolution must be positive, got {self}"
            )));
        }
        if self.width > MAX_WIDTH || self.height > MAX_HEIGHT {
            return Err(Error::Validation(format!(
                "resolution {self} exceeds {MAX_WIDTH}x{MAX_HEIGHT}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| Error::Validation(format!("expected WIDTHxHEIGHT, got {s:?}")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| Error::Validation(format!("invalid resolution {s:?}")))
        };
        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

/// Automatic gain control (exposure) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgcMode {
    Off,
    Auto,
    Night,
    NightPreview,
    Backlight,
    Spotlight,
    Sports,
    Snow,
    Beach,
    VeryLong,
    FixedFps,
    AntiShake,
    Fireworks,
}

impl AgcMode {
    pub fn all() -> &'static [AgcMode] {
        &[
            Self::Off,
            Self::Auto,
            Self::Night,
            Self::NightPreview,
            Self::Backlight,
            Self::Spotlight,
            Self::Sports,
            Self::Snow,
            Self::Beach,
            Self::VeryLong,
            Self::FixedFps,
            Self::AntiShake,
            Self::Fireworks,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Auto => "auto",
            Self::Night => "night",
            Self::NightPreview => "nightpreview",
            Self::Backlight => "backlight",
            Self::Spotlight => "spotlight",
            Self::Sports => "sports",
            Self::Snow => "snow",
            Self::Beach => "beach",
            Self::VeryLong => "verylong",
            Self::FixedFps => "fixedfps",
            Self::AntiShake => "antishake",
            Self::Fireworks => "fireworks",
        }
    }
}

/// Automatic white balance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AwbMode {
    Off,
    Auto,
    Sunlight,
    Cloudy,
    Shade,
    Tungsten,
    Fluorescent,
    Incandescent,
    Flash,
    Horizon,
}

impl AwbMode {
    pub fn all() -> &'static [AwbMode] {
        &[
            Self::Off,
            Self::Auto,
            Self::Sunlight,
            Self::Cloudy,
            Self::Shade,
            Self::Tungsten,
            Self::Fluorescent,
            Self::Incandescent,
            Self::Flash,
            Self::Horizon,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Auto => "auto",
            Self::Sunlight => "sunlight",
            Self::Cloudy => "cloudy",
            Self::Shade => "shade",
            Self::Tungsten => "tungsten",
            Self::Fluorescent => "fluorescent",
            Self::Incandescent => "incandescent",
            Self::Flash => "flash",
            Self::Horizon => "horizon",
        }
    }
}

/// Light metering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeteringMode {
    Average,
    Spot,
    Backlit,
    Matrix,
}

impl MeteringMode {
    pub fn all() -> &'static [MeteringMode] {
        &[Self::Average, Self::Spot, Self::Backlit, Self::Matrix]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Spot => "spot",
            Self::Backlit => "backlit",
            Self::Matrix => "matrix",
        }
    }
}

/// Implements `Display` and case-insensitive `FromStr` over `all()`/`name()`.
macro_rules! named_mode {
    ($ty:ident, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let wanted = s.trim().to_ascii_lowercase();
                Self::all()
                    .iter()
                    .copied()
                    .find(|m| m.name() == wanted)
                    .ok_or_else(|| Error::Validation(format!("unknown {} mode {s:?}", $what)))
            }
        }
    };
}

named_mode!(AgcMode, "agc");
named_mode!(AwbMode, "awb");
named_mode!(MeteringMode, "metering");

/// Snapshot of one server's configuration and state at reply time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub resolution: Resolution,
    pub framerate: f64,
    pub agc_mode: AgcMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agc_gain: Option<f64>,
    pub awb_mode: AwbMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awb_red: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awb_blue: Option<f64>,
    pub iso: u32,
    pub metering_mode: MeteringMode,
    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
    #[serde(default)]
    pub ev: i32,
    pub denoise: bool,
    /// Server clock when the reply was produced.
    pub timestamp: DateTime<Utc>,
    /// Number of captures currently stored on the server.
    pub files: usize,
}

/// Kind of stored capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// One capture held on a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_type: FileType,
    /// 1-based, increasing until the server is cleared.
    pub index: u32,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
}
