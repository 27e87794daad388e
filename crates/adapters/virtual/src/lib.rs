//! # lumen-adapter-virtual
//!
//! Virtual lighting controller that simulates lights for demos and tests.
//!
//! ## Behaviour
//!
//! | Call | Effect |
//! |------|--------|
//! | `apply` (adaptive) | each light sits at 70 % / 4000 K shifted by the zone deltas |
//! | `apply` (explicit) | each light takes the given absolute values |
//! | `set_manual_control` | records the zone's manual flag |
//! | `light_state` | current state of a known light |
//!
//! Lights become known when registered with [`VirtualController::with_lights`]
//! or on the first apply that targets them. Failures and latency can be
//! injected to exercise the executor's retry and timeout paths.
//!
//! ## Dependency rule
//!
//! Depends on `lumen-app` (port traits) and `lumen-domain` only.

mod light;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lumen_app::ports::{ApplyRequest, ControllerError, LightController};
use lumen_domain::id::{LightId, ZoneId};
use lumen_domain::light::LightState;

pub use light::{BASELINE_BRIGHTNESS_PCT, BASELINE_COLOR_TEMP_KELVIN};
use light::VirtualLight;

#[derive(Debug, Default)]
struct Inner {
    lights: HashMap<LightId, VirtualLight>,
    applied: Vec<ApplyRequest>,
    manual: HashMap<ZoneId, bool>,
    failures_left: u32,
    latency: Duration,
}

/// Simulated lighting controller.
#[derive(Debug, Default)]
pub struct VirtualController {
    inner: Mutex<Inner>,
}

impl VirtualController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register lights at the adaptive baseline.
    #[must_use]
    pub fn with_lights(self, lights: impl IntoIterator<Item = LightId>) -> Self {
        {
            let mut inner = self.lock();
            for light in lights {
                inner.lights.entry(light).or_default();
            }
        }
        self
    }

    /// Overwrite a light's state, as if someone changed it by hand.
    pub fn set_light(&self, light: LightId, state: LightState) {
        self.lock().lights.insert(light, VirtualLight::from_state(state));
    }

    /// Make the next `count` calls fail as unavailable.
    pub fn fail_next(&self, count: u32) {
        self.lock().failures_left = count;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Every successful apply, in order.
    #[must_use]
    pub fn applied(&self) -> Vec<ApplyRequest> {
        self.lock().applied.clone()
    }

    /// Last manual flag set for `zone`.
    #[must_use]
    pub fn manual_flag(&self, zone: &ZoneId) -> Option<bool> {
        self.lock().manual.get(zone).copied()
    }

    #[must_use]
    pub fn light(&self, light: &LightId) -> Option<LightState> {
        self.lock().lights.get(light).map(VirtualLight::state)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait the configured latency, then consume one injected failure.
    async fn admit(&self, call: &'static str) -> Result<(), ControllerError> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut inner = self.lock();
        if inner.failures_left > 0 {
            inner.failures_left -= 1;
            tracing::debug!(call, failures_left = inner.failures_left, "injected failure");
            return Err(ControllerError::Unavailable(
                "virtual controller failure injected".into(),
            ));
        }
        Ok(())
    }
}

impl LightController for VirtualController {
    async fn apply(&self, request: ApplyRequest) -> Result<(), ControllerError> {
        self.admit("apply").await?;
        let mut inner = self.lock();
        for light in &request.lights {
            inner
                .lights
                .entry(light.clone())
                .or_default()
                .apply(&request.target);
        }
        tracing::debug!(
            zone = %request.zone,
            controller = %request.controller,
            lights = request.lights.len(),
            target = ?request.target,
            "virtual apply"
        );
        inner.applied.push(request);
        Ok(())
    }

    async fn set_manual_control(
        &self,
        zone: ZoneId,
        lights: Vec<LightId>,
        manual: bool,
    ) -> Result<(), ControllerError> {
        self.admit("set_manual_control").await?;
        tracing::debug!(zone = %zone, lights = lights.len(), manual, "virtual manual flag");
        self.lock().manual.insert(zone, manual);
        Ok(())
    }

    async fn light_state(&self, light: LightId) -> Result<Option<LightState>, ControllerError> {
        self.admit("light_state").await?;
        Ok(self.light(&light))
    }
}
