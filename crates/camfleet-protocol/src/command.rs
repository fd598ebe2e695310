//! Commands sent to camera servers and their local validation.

use camfleet_core::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgcMode, AwbMode, MeteringMode, Resolution};

pub const MAX_FRAMERATE: f64 = 90.0;
pub const ISO_VALUES: &[u32] = &[0, 100, 200, 320, 400, 500, 640, 800];
pub const AGC_GAIN_RANGE: (f64, f64) = (1.0, 16.0);
pub const AWB_GAIN_RANGE: (f64, f64) = (0.0, 8.0);
pub const EV_RANGE: (i32, i32) = (-24, 24);

/// One logical command, routed through the same encode/send/decode path
/// regardless of kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Discovery probe.
    Hello,
    Status,
    List,
    Clear,
    /// Blink the server's indicator so it can be located physically.
    Identify,
    Resolution {
        width: u32,
        height: u32,
    },
    Framerate {
        rate: f64,
    },
    Agc {
        mode: AgcMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gain: Option<f64>,
    },
    Awb {
        mode: AwbMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        red: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blue: Option<f64>,
    },
    Iso {
        iso: u32,
    },
    Metering {
        mode: MeteringMode,
    },
    Brightness {
        value: i32,
    },
    Contrast {
        value: i32,
    },
    Saturation {
        value: i32,
    },
    Ev {
        value: i32,
    },
    Denoise {
        enabled: bool,
    },
    Capture {
        count: u32,
        video_port: bool,
        /// Absolute trigger time; immediate when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<DateTime<Utc>>,
    },
}

impl Command {
    pub fn resolution(resolution: Resolution) -> Self {
        Self::Resolution {
            width: resolution.width,
            height: resolution.height,
        }
    }

    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Status => "status",
            Self::List => "list",
            Self::Clear => "clear",
            Self::Identify => "identify",
            Self::Resolution { .. } => "resolution",
            Self::Framerate { .. } => "framerate",
            Self::Agc { .. } => "agc",
            Self::Awb { .. } => "awb",
            Self::Iso { .. } => "iso",
            Self::Metering { .. } => "metering",
            Self::Brightness { .. } => "brightness",
            Self::Contrast { .. } => "contrast",
            Self::Saturation { .. } => "saturation",
            Self::Ev { .. } => "ev",
            Self::Denoise { .. } => "denoise",
            Self::Capture { .. } => "capture",
        }
    }

    /// Whether re-sending the command cannot change server state.
    /// Only these are retried on a missing reply.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            Self::Hello | Self::Status | Self::List | Self::Identify
        )
    }

    /// Reject parameters outside the documented legal ranges.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Hello | Self::Status | Self::List | Self::Clear | Self::Identify => Ok(()),
            Self::Resolution { width, height } => Resolution::new(*width, *height).validate(),
            Self::Framerate { rate } => {
                if rate.is_finite() && *rate > 0.0 && *rate <= MAX_FRAMERATE {
                    Ok(())
                } else {
                    Err(invalid(format!(
                        "framerate must be in (0, {MAX_FRAMERATE}], got {rate}"
                    )))
                }
            }
            Self::Agc { mode, gain } => match (mode, gain) {
                (_, None) => Ok(()),
                (AgcMode::Off, Some(gain)) => check_range("agc gain", *gain, AGC_GAIN_RANGE),
                (mode, Some(_)) => Err(invalid(format!(
                    "agc gain can only be set with mode off, not {mode}"
                ))),
            },
            Self::Awb { mode, red, blue } => match (mode, red, blue) {
                (AwbMode::Off, Some(red), Some(blue)) => {
                    check_range("awb red gain", *red, AWB_GAIN_RANGE)?;
                    check_range("awb blue gain", *blue, AWB_GAIN_RANGE)
                }
                (AwbMode::Off, _, _) => Err(invalid(
                    "awb mode off requires both red and blue gains".into(),
                )),
                (_, None, None) => Ok(()),
                (mode, _, _) => Err(invalid(format!(
                    "awb gains can only be set with mode off, not {mode}"
                ))),
            },
            Self::Iso { iso } => {
                if ISO_VALUES.contains(iso) {
                    Ok(())
                } else {
                    Err(invalid(format!(
                        "iso must be one of {ISO_VALUES:?}, got {iso}"
                    )))
                }
            }
            Self::Metering { .. } | Self::Denoise { .. } => Ok(()),
            Self::Brightness { value } => check_int("brightness", *value, (0, 100)),
            Self::Contrast { value } => check_int("contrast", *value, (-100, 100)),
            Self::Saturation { value } => check_int("saturation", *value, (-100, 100)),
            Self::Ev { value } => check_int("ev", *value, EV_RANGE),
            Self::Capture { count, .. } => {
                if *count == 0 {
                    Err(invalid("capture count must be positive".into()))
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn invalid(message: String) -> Error {
    Error::Validation(message)
}

fn check_range(what: &str, value: f64, (lo, hi): (f64, f64)) -> Result<()> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(invalid(format!("{what} must be in {lo}..={hi}, got {value}")))
    }
}

fn check_int(what: &str, value: i32, (lo, hi): (i32, i32)) -> Result<()> {
    if (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{what} must be in {lo}..={hi}, got {value}")))
    }
}
