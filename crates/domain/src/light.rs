//! Light state as reported by a lighting controller.

use serde::{Deserialize, Serialize};

pub const MIN_BRIGHTNESS_PCT: u8 = 1;
pub const MAX_BRIGHTNESS_PCT: u8 = 100;
pub const MIN_COLOR_TEMP_KELVIN: u32 = 1800;
pub const MAX_COLOR_TEMP_KELVIN: u32 = 6500;

/// Color temperature in whichever unit the light reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum ColorTemperature {
    Kelvin(u32),
    Mired(u32),
}

impl ColorTemperature {
    /// Value in kelvin, converting mireds with `round(1_000_000 / mired)`.
    ///
    /// A zero mired reading has no kelvin equivalent.
    #[must_use]
    pub fn kelvin(self) -> Option<u32> {
        match self {
            Self::Kelvin(kelvin) => Some(kelvin),
            Self::Mired(0) => None,
            Self::Mired(mired) => Some(mired_to_kelvin(mired)),
        }
    }
}

/// Snapshot of one light.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub on: bool,
    pub brightness_pct: Option<u8>,
    pub color_temp: Option<ColorTemperature>,
}

impl LightState {
    #[must_use]
    pub fn color_temp_kelvin(&self) -> Option<u32> {
        self.color_temp.and_then(ColorTemperature::kelvin)
    }
}

/// `round(1_000_000 / mired)`; `mired` must be non-zero.
#[must_use]
pub fn mired_to_kelvin(mired: u32) -> u32 {
    let quotient = 1_000_000 / mired;
    let remainder = 1_000_000 % mired;
    if remainder * 2 >= mired {
        quotient + 1
    } else {
        quotient
    }
}

/// Clamp a brightness percentage into `[1, 100]`.
#[must_use]
pub fn clamp_brightness(value: i32) -> u8 {
    let clamped = value.clamp(
        i32::from(MIN_BRIGHTNESS_PCT),
        i32::from(MAX_BRIGHTNESS_PCT),
    );
    u8::try_from(clamped).unwrap_or(MAX_BRIGHTNESS_PCT)
}

/// Clamp a color temperature into `[1800, 6500]` kelvin.
#[must_use]
pub fn clamp_color_temp(value: i64) -> u32 {
    let clamped = value.clamp(
        i64::from(MIN_COLOR_TEMP_KELVIN),
        i64::from(MAX_COLOR_TEMP_KELVIN),
    );
    u32::try_from(clamped).unwrap_or(MAX_COLOR_TEMP_KELVIN)
}
