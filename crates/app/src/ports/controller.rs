//! Lighting controller port — the outbound side of every control call.
//!
//! Implementations translate requests into whatever protocol drives the
//! lights. The core never calls a controller directly for writes; every
//! write goes through the [`Executor`](crate::executor::Executor).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lumen_domain::adjustment::ZoneAdjustment;
use lumen_domain::error::ErrorCode;
use lumen_domain::id::{ControllerId, LightId, ZoneId};
use lumen_domain::light::LightState;

/// What an apply call asks the controller to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyTarget {
    /// Resume adaptive control, shifted by the composed deltas.
    Adaptive(ZoneAdjustment),
    /// Set absolute values, outside of adaptive control.
    Explicit {
        brightness_pct: Option<u8>,
        color_temp_kelvin: Option<u32>,
    },
}

/// A single apply call for one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub zone: ZoneId,
    pub controller: ControllerId,
    pub lights: Vec<LightId>,
    pub target: ApplyTarget,
    pub transition: Duration,
}

/// Failure of one outbound call attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("controller call timed out after {0:?}")]
    Timeout(Duration),
    #[error("controller unavailable: {0}")]
    Unavailable(String),
    #[error("controller rejected the command: {0}")]
    Rejected(String),
}

impl ControllerError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Unavailable(_) => ErrorCode::ControllerUnavailable,
            Self::Rejected(_) => ErrorCode::ControllerRejected,
        }
    }
}

/// A lighting controller able to apply adjustments to zones.
pub trait LightController: Send + Sync {
    /// Apply an adaptive or explicit target to the zone's lights.
    fn apply(
        &self,
        request: ApplyRequest,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send;

    /// Raise or lower the controller's own manual-control flag for a zone.
    fn set_manual_control(
        &self,
        zone: ZoneId,
        lights: Vec<LightId>,
        manual: bool,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send;

    /// Current state of a light, `None` when the light is unknown.
    fn light_state(
        &self,
        light: LightId,
    ) -> impl Future<Output = Result<Option<LightState>, ControllerError>> + Send;
}

impl<T: LightController> LightController for Arc<T> {
    fn apply(
        &self,
        request: ApplyRequest,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send {
        (**self).apply(request)
    }

    fn set_manual_control(
        &self,
        zone: ZoneId,
        lights: Vec<LightId>,
        manual: bool,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send {
        (**self).set_manual_control(zone, lights, manual)
    }

    fn light_state(
        &self,
        light: LightId,
    ) -> impl Future<Output = Result<Option<LightState>, ControllerError>> + Send {
        (**self).light_state(light)
    }
}
