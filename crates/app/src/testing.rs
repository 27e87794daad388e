//! In-memory fakes shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lumen_domain::id::{ControllerId, LightId, ZoneId};
use lumen_domain::light::{ColorTemperature, LightState};
use lumen_domain::zone::ZoneConfig;

use crate::lock;
use crate::ports::{ApplyRequest, ControllerError, LightController};

#[derive(Debug, Default)]
struct SpyState {
    applies: Vec<ApplyRequest>,
    manual_flags: Vec<(ZoneId, bool)>,
    states: HashMap<LightId, LightState>,
    failures_left: u32,
    failing_zones: HashSet<ZoneId>,
    latency: Duration,
}

impl SpyState {
    fn outcome(&mut self, zone: &ZoneId) -> Result<(), ControllerError> {
        if self.failing_zones.contains(zone) {
            return Err(ControllerError::Unavailable(format!("{zone} is offline")));
        }
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(ControllerError::Unavailable("transient failure".into()));
        }
        Ok(())
    }
}

/// Records every call; failures and latency are scripted by the test.
#[derive(Debug, Default)]
pub struct SpyController {
    state: Mutex<SpyState>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl SpyController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_light(self, light: &str, brightness_pct: u8, kelvin: u32) -> Self {
        lock(&self.state).states.insert(
            LightId::new(light).unwrap(),
            LightState {
                on: true,
                brightness_pct: Some(brightness_pct),
                color_temp: Some(ColorTemperature::Kelvin(kelvin)),
            },
        );
        self
    }

    pub fn set_light(&self, light: &str, state: LightState) {
        lock(&self.state)
            .states
            .insert(LightId::new(light).unwrap(), state);
    }

    pub fn fail_next(&self, count: u32) {
        lock(&self.state).failures_left = count;
    }

    pub fn fail_zone(&self, zone: &str) {
        lock(&self.state)
            .failing_zones
            .insert(ZoneId::new(zone).unwrap());
    }

    pub fn set_latency(&self, latency: Duration) {
        lock(&self.state).latency = latency;
    }

    pub fn applies(&self) -> Vec<ApplyRequest> {
        lock(&self.state).applies.clone()
    }

    pub fn applied_zones(&self) -> Vec<ZoneId> {
        let mut zones: Vec<ZoneId> = self.applies().into_iter().map(|r| r.zone).collect();
        zones.sort();
        zones
    }

    pub fn manual_flags(&self) -> Vec<(ZoneId, bool)> {
        lock(&self.state).manual_flags.clone()
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.applies.clear();
        state.manual_flags.clear();
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn call(
        &self,
        result: Result<(), ControllerError>,
        latency: Duration,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send + use<> {
        let in_flight = Arc::clone(&self.in_flight);
        let peak = Arc::clone(&self.peak);
        async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }
}

impl LightController for SpyController {
    fn apply(
        &self,
        request: ApplyRequest,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send {
        let (result, latency) = {
            let mut state = lock(&self.state);
            let result = state.outcome(&request.zone);
            state.applies.push(request);
            (result, state.latency)
        };
        self.call(result, latency)
    }

    fn set_manual_control(
        &self,
        zone: ZoneId,
        _lights: Vec<LightId>,
        manual: bool,
    ) -> impl Future<Output = Result<(), ControllerError>> + Send {
        lock(&self.state).manual_flags.push((zone, manual));
        async { Ok(()) }
    }

    fn light_state(
        &self,
        light: LightId,
    ) -> impl Future<Output = Result<Option<LightState>, ControllerError>> + Send {
        let state = lock(&self.state).states.get(&light).copied();
        async move { Ok(state) }
    }
}

pub fn zone_config(name: &str) -> ZoneConfig {
    ZoneConfig::new(
        ZoneId::new(name).unwrap(),
        ControllerId::new(format!("switch.{name}")).unwrap(),
    )
    .with_lights([LightId::new(format!("light.{name}")).unwrap()])
}
