//! Adjustment composition.
//!
//! The net brightness/warmth delta applied to a zone is the sum of four
//! contributions: the user's manual totals, the active scene's offsets, the
//! environmental boost and the sunset boost. [`AdjustmentComponents`] is an
//! immutable value recomputed wholesale by [`AdjustmentComponents::compose`]
//! whenever any input changes.
//!
//! Warmth is expressed as a signed kelvin delta: positive values push the
//! color temperature up (cooler), negative values pull it down (warmer).

use serde::{Deserialize, Serialize};

use crate::mode::Mode;
use crate::zone::ZoneConfig;

/// Bound for the accumulated manual brightness delta, in percentage points.
pub const MANUAL_BRIGHTNESS_LIMIT: i32 = 100;

/// Bound for the accumulated manual warmth delta, in kelvin.
pub const MANUAL_WARMTH_LIMIT: i32 = 4000;

/// Accumulated manual adjustments, clamped to their domain ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualTotals {
    brightness: i32,
    warmth: i32,
}

impl ManualTotals {
    #[must_use]
    pub fn new(brightness: i32, warmth: i32) -> Self {
        Self {
            brightness: brightness.clamp(-MANUAL_BRIGHTNESS_LIMIT, MANUAL_BRIGHTNESS_LIMIT),
            warmth: warmth.clamp(-MANUAL_WARMTH_LIMIT, MANUAL_WARMTH_LIMIT),
        }
    }

    /// Add a step on each axis, saturating at the limits.
    #[must_use]
    pub fn add(self, brightness_step: i32, warmth_step: i32) -> Self {
        Self::new(
            self.brightness.saturating_add(brightness_step),
            self.warmth.saturating_add(warmth_step),
        )
    }

    #[must_use]
    pub fn brightness(self) -> i32 {
        self.brightness
    }

    #[must_use]
    pub fn warmth(self) -> i32 {
        self.warmth
    }
}

/// Offsets contributed by the active scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneOffsets {
    pub brightness: i32,
    pub warmth: i32,
}

/// Environmental boost as last reported by the environmental observer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentalInput {
    pub active: bool,
    pub boost_pct: i32,
}

/// Composed adjustment record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentComponents {
    manual_brightness: i32,
    manual_warmth: i32,
    scene_brightness: i32,
    scene_warmth: i32,
    environmental_boost: i32,
    sunset_boost: i32,
    final_brightness: i32,
    final_warmth: i32,
}

impl AdjustmentComponents {
    /// Compose the four input aggregates into a new record.
    ///
    /// Scene offsets and both boosts only contribute while `mode` is
    /// automatic; boosts are never negative.
    #[must_use]
    pub fn compose(
        manual: ManualTotals,
        scene: SceneOffsets,
        environmental: EnvironmentalInput,
        sunset_boost_pct: i32,
        mode: Mode,
    ) -> Self {
        let automatic = mode.is_automatic();
        let scene = if automatic { scene } else { SceneOffsets::default() };
        let environmental_boost = if automatic && environmental.active {
            environmental.boost_pct.max(0)
        } else {
            0
        };
        let sunset_boost = if automatic { sunset_boost_pct.max(0) } else { 0 };

        Self {
            manual_brightness: manual.brightness(),
            manual_warmth: manual.warmth(),
            scene_brightness: scene.brightness,
            scene_warmth: scene.warmth,
            environmental_boost,
            sunset_boost,
            final_brightness: manual.brightness()
                + scene.brightness
                + environmental_boost
                + sunset_boost,
            final_warmth: manual.warmth() + scene.warmth,
        }
    }

    /// Per-zone deltas, dropping boosts the zone does not participate in.
    #[must_use]
    pub fn for_zone(&self, zone: &ZoneConfig) -> ZoneAdjustment {
        let mut brightness = self.manual_brightness + self.scene_brightness;
        if zone.environmental_boost {
            brightness += self.environmental_boost;
        }
        if zone.sunset_boost {
            brightness += self.sunset_boost;
        }
        ZoneAdjustment {
            brightness,
            warmth: self.final_warmth,
        }
    }

    #[must_use]
    pub fn manual_brightness(&self) -> i32 {
        self.manual_brightness
    }

    #[must_use]
    pub fn manual_warmth(&self) -> i32 {
        self.manual_warmth
    }

    #[must_use]
    pub fn scene_brightness(&self) -> i32 {
        self.scene_brightness
    }

    #[must_use]
    pub fn scene_warmth(&self) -> i32 {
        self.scene_warmth
    }

    #[must_use]
    pub fn environmental_boost(&self) -> i32 {
        self.environmental_boost
    }

    #[must_use]
    pub fn sunset_boost(&self) -> i32 {
        self.sunset_boost
    }

    #[must_use]
    pub fn final_brightness(&self) -> i32 {
        self.final_brightness
    }

    #[must_use]
    pub fn final_warmth(&self) -> i32 {
        self.final_warmth
    }
}

/// Deltas handed to one zone's controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneAdjustment {
    pub brightness: i32,
    pub warmth: i32,
}

/// Direction of the most recent unresolved manual adjustment per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualActionFlags {
    pub brighter: bool,
    pub dimmer: bool,
    pub warmer: bool,
    pub cooler: bool,
}

impl ManualActionFlags {
    /// Record the direction of a step. An axis without a step keeps its flags.
    pub fn record(&mut self, brightness_step: Option<i32>, color_temp_step: Option<i32>) {
        if let Some(step) = brightness_step.filter(|s| *s != 0) {
            self.brighter = step > 0;
            self.dimmer = step < 0;
        }
        if let Some(step) = color_temp_step.filter(|s| *s != 0) {
            self.cooler = step > 0;
            self.warmer = step < 0;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.brighter || self.dimmer || self.warmer || self.cooler
    }
}
