//! Event — an immutable record of something that happened.
//!
//! Inbound events are posted by external observers (manual-detection,
//! environmental, scene-controller, alarm-anchor); the orchestrator emits
//! [`Event::CalculationCompleted`] after every recomposition.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::adjustment::AdjustmentComponents;
use crate::error::ValidationError;
use crate::id::{EventId, LightId, ZoneId};
use crate::time::{Timestamp, now};

/// Discriminant of [`Event`], used to route subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ManualDetected,
    ManualReleased,
    TimerExpired,
    EnvironmentalChanged,
    ButtonPressed,
    AnchorChanged,
    CalculationCompleted,
}

impl EventKind {
    pub const ALL: [Self; 7] = [
        Self::ManualDetected,
        Self::ManualReleased,
        Self::TimerExpired,
        Self::EnvironmentalChanged,
        Self::ButtonPressed,
        Self::AnchorChanged,
        Self::CalculationCompleted,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManualDetected => "manual_detected",
            Self::ManualReleased => "manual_released",
            Self::TimerExpired => "timer_expired",
            Self::EnvironmentalChanged => "environmental_changed",
            Self::ButtonPressed => "button_pressed",
            Self::AnchorChanged => "anchor_changed",
            Self::CalculationCompleted => "calculation_completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that travels over the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A human changed a zone; `duration_secs` overrides the computed duration.
    ManualDetected {
        zone: ZoneId,
        #[serde(default)]
        duration_secs: Option<u64>,
    },
    /// A manual override was released before its timer fired.
    ManualReleased {
        zone: ZoneId,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        previous_lights: Option<Vec<LightId>>,
    },
    /// A zone's manual-override timer fired.
    TimerExpired { zone: ZoneId },
    EnvironmentalChanged(EnvironmentalReport),
    /// Canonical scene-controller button event.
    ButtonPressed {
        device: String,
        button: String,
        action: String,
    },
    /// The next alarm time used to align sunrise synchronisation.
    AnchorChanged {
        #[serde(default)]
        anchor: Option<Timestamp>,
    },
    CalculationCompleted(CalculationReport),
}

impl Event {
    /// A manual-detected event with a computed duration.
    #[must_use]
    pub fn manual_detected(zone: ZoneId) -> Self {
        Self::ManualDetected {
            zone,
            duration_secs: None,
        }
    }

    #[must_use]
    pub fn timer_expired(zone: ZoneId) -> Self {
        Self::TimerExpired { zone }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ManualDetected { .. } => EventKind::ManualDetected,
            Self::ManualReleased { .. } => EventKind::ManualReleased,
            Self::TimerExpired { .. } => EventKind::TimerExpired,
            Self::EnvironmentalChanged(_) => EventKind::EnvironmentalChanged,
            Self::ButtonPressed { .. } => EventKind::ButtonPressed,
            Self::AnchorChanged { .. } => EventKind::AnchorChanged,
            Self::CalculationCompleted(_) => EventKind::CalculationCompleted,
        }
    }

    /// The zone this event is about, if any.
    #[must_use]
    pub fn zone(&self) -> Option<&ZoneId> {
        match self {
            Self::ManualDetected { zone, .. }
            | Self::ManualReleased { zone, .. }
            | Self::TimerExpired { zone } => Some(zone),
            _ => None,
        }
    }

    /// Check payload invariants of inbound events.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NegativeBoost`] when an environmental
    /// report carries a negative boost.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::EnvironmentalChanged(report) => report.validate(),
            _ => Ok(()),
        }
    }
}

/// Signal posted by the environmental observer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalReport {
    pub boost_active: bool,
    #[serde(default)]
    pub lux: Option<f64>,
    #[serde(default)]
    pub cloud_coverage: Option<f64>,
    /// Solar elevation in degrees; `>= 0` is daytime.
    #[serde(default)]
    pub elevation: Option<f64>,
    /// Replaces the configured duration boost factor when present.
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub boost_pct: Option<i32>,
    #[serde(default)]
    pub sunset_boost_pct: Option<i32>,
}

impl EnvironmentalReport {
    fn validate(&self) -> Result<(), ValidationError> {
        for value in [self.boost_pct, self.sunset_boost_pct].into_iter().flatten() {
            if value < 0 {
                return Err(ValidationError::NegativeBoost(value));
            }
        }
        Ok(())
    }
}

/// What caused a recomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationTrigger {
    Manual,
    Scene,
    Mode,
    Environmental,
    Sunset,
    ZoneConfig,
    Reset,
    Restore,
}

/// Payload of the calculation-completed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationReport {
    pub id: EventId,
    pub trigger: CalculationTrigger,
    pub components: AdjustmentComponents,
    pub zones: Vec<ZoneId>,
    pub timestamp: Timestamp,
}

impl CalculationReport {
    #[must_use]
    pub fn new(
        trigger: CalculationTrigger,
        components: AdjustmentComponents,
        zones: Vec<ZoneId>,
    ) -> Self {
        Self {
            id: EventId::new(),
            trigger,
            components,
            zones,
            timestamp: now(),
        }
    }
}
