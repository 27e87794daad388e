//! Virtual light — an adaptive baseline shifted by the applied deltas.

use lumen_app::ports::ApplyTarget;
use lumen_domain::light::{ColorTemperature, LightState, clamp_brightness, clamp_color_temp};

/// Brightness an adaptive light sits at with no delta applied.
pub const BASELINE_BRIGHTNESS_PCT: u8 = 70;
/// Color temperature an adaptive light sits at with no delta applied.
pub const BASELINE_COLOR_TEMP_KELVIN: u32 = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VirtualLight {
    state: LightState,
}

impl Default for VirtualLight {
    fn default() -> Self {
        Self {
            state: LightState {
                on: true,
                brightness_pct: Some(BASELINE_BRIGHTNESS_PCT),
                color_temp: Some(ColorTemperature::Kelvin(BASELINE_COLOR_TEMP_KELVIN)),
            },
        }
    }
}

impl VirtualLight {
    pub(crate) fn from_state(state: LightState) -> Self {
        Self { state }
    }

    pub(crate) fn state(&self) -> LightState {
        self.state
    }

    pub(crate) fn apply(&mut self, target: &ApplyTarget) {
        self.state.on = true;
        match target {
            ApplyTarget::Adaptive(adjustment) => {
                self.state.brightness_pct = Some(clamp_brightness(
                    i32::from(BASELINE_BRIGHTNESS_PCT).saturating_add(adjustment.brightness),
                ));
                self.state.color_temp = Some(ColorTemperature::Kelvin(clamp_color_temp(
                    i64::from(BASELINE_COLOR_TEMP_KELVIN) + i64::from(adjustment.warmth),
                )));
            }
            ApplyTarget::Explicit {
                brightness_pct,
                color_temp_kelvin,
            } => {
                if let Some(pct) = brightness_pct {
                    self.state.brightness_pct = Some(clamp_brightness(i32::from(*pct)));
                }
                if let Some(kelvin) = color_temp_kelvin {
                    self.state.color_temp = Some(ColorTemperature::Kelvin(clamp_color_temp(
                        i64::from(*kelvin),
                    )));
                }
            }
        }
    }
}
