//! Zone — a named group of lights governed by one lighting controller.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ValidationError};
use crate::id::{ControllerId, LightId, ZoneId};
use crate::time::{Timestamp, seconds_until};

/// Static configuration of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub id: ZoneId,
    pub controller: ControllerId,
    /// Ordered, duplicate-free.
    #[serde(default)]
    pub lights: Vec<LightId>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Scales manual-override durations for this zone.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub sunrise_offset_minutes: i32,
    #[serde(default)]
    pub environmental_boost: bool,
    #[serde(default)]
    pub sunset_boost: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_multiplier() -> f64 {
    1.0
}

impl ZoneConfig {
    /// An enabled zone with no lights and neutral tunables.
    #[must_use]
    pub fn new(id: ZoneId, controller: ControllerId) -> Self {
        Self {
            id,
            controller,
            lights: Vec::new(),
            enabled: true,
            multiplier: 1.0,
            sunrise_offset_minutes: 0,
            environmental_boost: false,
            sunset_boost: false,
        }
    }

    /// Replace the light list, dropping duplicates while keeping order.
    #[must_use]
    pub fn with_lights(mut self, lights: impl IntoIterator<Item = LightId>) -> Self {
        self.lights.clear();
        for light in lights {
            if !self.lights.contains(&light) {
                self.lights.push(light);
            }
        }
        self
    }

    /// Check the zone invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidMultiplier`] for a negative or
    /// non-finite multiplier.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_multiplier(self.multiplier)
    }
}

fn validate_multiplier(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidMultiplier(value))
    }
}

/// Partial update of a zone's tunables. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub sunrise_offset_minutes: Option<i32>,
    #[serde(default)]
    pub environmental_boost: Option<bool>,
    #[serde(default)]
    pub sunset_boost: Option<bool>,
}

impl ZoneUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply onto `config`. Nothing is written when validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidMultiplier`] for a bad multiplier.
    pub fn apply_to(&self, config: &mut ZoneConfig) -> Result<(), ValidationError> {
        if let Some(multiplier) = self.multiplier {
            validate_multiplier(multiplier)?;
            config.multiplier = multiplier;
        }
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(offset) = self.sunrise_offset_minutes {
            config.sunrise_offset_minutes = offset;
        }
        if let Some(environmental) = self.environmental_boost {
            config.environmental_boost = environmental;
        }
        if let Some(sunset) = self.sunset_boost {
            config.sunset_boost = sunset;
        }
        Ok(())
    }
}

/// Runtime state of a zone.
///
/// `manual_active == false` implies both timestamps are unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneState {
    pub manual_active: bool,
    pub manual_duration_secs: u64,
    pub manual_started: Option<Timestamp>,
    pub manual_expires: Option<Timestamp>,
    pub last_sync_ms: Option<u64>,
    pub last_error: Option<ErrorCode>,
}

impl ZoneState {
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.manual_active
    }

    pub fn enter_manual(&mut self, started: Timestamp, duration_secs: u64, expires: Timestamp) {
        self.manual_active = true;
        self.manual_duration_secs = duration_secs;
        self.manual_started = Some(started);
        self.manual_expires = Some(expires);
    }

    /// Return to automatic control. Returns `true` if the zone was manual.
    pub fn clear_manual(&mut self) -> bool {
        let was_manual = self.manual_active;
        self.manual_active = false;
        self.manual_duration_secs = 0;
        self.manual_started = None;
        self.manual_expires = None;
        was_manual
    }

    /// Seconds left on the override according to the recorded expiry.
    #[must_use]
    pub fn remaining_secs(&self, now: Timestamp) -> u64 {
        match (self.manual_active, self.manual_expires) {
            (true, Some(expires)) => seconds_until(expires, now),
            _ => 0,
        }
    }
}
