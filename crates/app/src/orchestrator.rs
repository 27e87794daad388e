//! Runtime orchestrator — the central state machine.
//!
//! The orchestrator subscribes to every inbound event on the bus, mutates
//! zone and timer state through the [`ZoneRegistry`], recomposes the
//! [`AdjustmentComponents`] and issues every outbound call through the
//! [`Executor`]. It exclusively owns the global mode, the scene selection
//! and the composed adjustment.
//!
//! Handlers run as independent tasks and may interleave at await points.
//! Every mutation of [`RuntimeState`] happens inside one short critical
//! section that never spans an await; anything read before an await is
//! re-read afterwards.

mod anchor;
mod commands;
mod handlers;
mod persistence;

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lumen_domain::adjustment::{
    AdjustmentComponents, EnvironmentalInput, ManualActionFlags, ManualTotals,
};
use lumen_domain::error::LumenError;
use lumen_domain::event::{
    CalculationReport, CalculationTrigger, EnvironmentalReport, Event, EventKind,
};
use lumen_domain::id::ZoneId;
use lumen_domain::mode::Mode;
use lumen_domain::scene::Scene;
use lumen_domain::time::{Timestamp, now};
use lumen_domain::zone::{ZoneConfig, ZoneState};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::event_bus::{EventBus, Subscription};
use crate::executor::{Executor, ExecutorSettings};
use crate::health::{HealthMonitor, HealthReport};
use crate::lock;
use crate::metrics::{DailyCounter, DailyCounts, DailyCounters, MetricsRegistry, MetricsSnapshot};
use crate::ports::{LightController, SnapshotStore};
use crate::resilience::Watchdog;
use crate::timer_manager::{TimerManager, TimerSettings};
use crate::zone_registry::ZoneRegistry;

pub use anchor::{AnchorSchedule, ScheduledSync};
pub use commands::{
    AdjustReport, ModeChange, SceneChange, SyncReport, ZoneAdjustResult, ZoneSyncResult,
};
pub use persistence::{RestoreReport, RestoredZone};

/// Tunables that are not owned by a sub-component.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Pending snapshot saves are superseded within this window.
    pub save_debounce: Duration,
    pub transition: Duration,
    pub button_brightness_step: i32,
    pub button_color_temp_step: i32,
    /// Whether the alarm-anchor integration schedules sunrise syncs.
    pub anchor_enabled: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            save_debounce: Duration::from_millis(500),
            transition: Duration::from_secs(1),
            button_brightness_step: 10,
            button_color_temp_step: 500,
            anchor_enabled: false,
        }
    }
}

/// Per-zone tunables captured by a preferences backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonePreferences {
    pub multiplier: f64,
    pub sunrise_offset_minutes: i32,
    pub environmental_boost: bool,
    pub sunset_boost: bool,
}

impl From<&ZoneConfig> for ZonePreferences {
    fn from(config: &ZoneConfig) -> Self {
        Self {
            multiplier: config.multiplier,
            sunrise_offset_minutes: config.sunrise_offset_minutes,
            environmental_boost: config.environmental_boost,
            sunset_boost: config.sunset_boost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferencesBackup {
    pub mode: Mode,
    pub scene: Scene,
    pub zones: BTreeMap<ZoneId, ZonePreferences>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default)]
struct RuntimeState {
    mode: Mode,
    remembered_mode: Option<Mode>,
    scene: Scene,
    manual: ManualTotals,
    flags: ManualActionFlags,
    environmental: EnvironmentalInput,
    environmental_report: Option<EnvironmentalReport>,
    sunset_boost_pct: i32,
    components: AdjustmentComponents,
    paused: bool,
    /// Zones whose manual state came from `adjust`; they stay adjustable.
    adjusted_zones: HashSet<ZoneId>,
    backup: Option<PreferencesBackup>,
    anchor: Option<Timestamp>,
}

#[derive(Default)]
struct Tasks {
    subscriptions: Vec<Subscription>,
    background: Vec<AbortHandle>,
    pending_save: Option<AbortHandle>,
    anchor: Vec<AbortHandle>,
}

/// Per-zone view exposed by [`Orchestrator::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStatus {
    #[serde(flatten)]
    pub config: ZoneConfig,
    pub state: ZoneState,
    pub remaining_secs: u64,
}

/// Runtime snapshot for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeStatus {
    pub mode: Mode,
    pub remembered_mode: Option<Mode>,
    pub scene: Scene,
    pub paused: bool,
    pub components: AdjustmentComponents,
    pub manual_flags: ManualActionFlags,
    pub environmental: Option<EnvironmentalReport>,
    pub sunset_boost_pct: i32,
    pub anchor: Option<Timestamp>,
    pub zones: Vec<ZoneStatus>,
    pub health: HealthReport,
    pub metrics: MetricsSnapshot,
    pub today: DailyCounts,
    pub rate_limiter_load: f64,
}

pub struct Orchestrator<C, S> {
    bus: EventBus,
    timers: Arc<TimerManager>,
    zones: ZoneRegistry,
    executor: Executor<C>,
    store: S,
    metrics: Arc<MetricsRegistry>,
    counters: Arc<DailyCounters>,
    health: HealthMonitor,
    watchdog: Arc<Watchdog>,
    settings: OrchestratorSettings,
    state: Mutex<RuntimeState>,
    tasks: Mutex<Tasks>,
    resync: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder<C, S> {
    controller: C,
    store: S,
    zones: Vec<ZoneConfig>,
    bus: Option<EventBus>,
    settings: OrchestratorSettings,
    timer_settings: TimerSettings,
    executor_settings: ExecutorSettings,
    watchdog_interval: Duration,
}

impl<C, S> OrchestratorBuilder<C, S>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    #[must_use]
    pub fn zones(mut self, zones: Vec<ZoneConfig>) -> Self {
        self.zones = zones;
        self
    }

    /// Share an existing bus instead of creating one.
    #[must_use]
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn timer_settings(mut self, settings: TimerSettings) -> Self {
        self.timer_settings = settings;
        self
    }

    #[must_use]
    pub fn executor_settings(mut self, settings: ExecutorSettings) -> Self {
        self.executor_settings = settings;
        self
    }

    #[must_use]
    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    /// Wire every sub-component. Nothing runs until [`Orchestrator::start`].
    ///
    /// # Errors
    ///
    /// Returns [`LumenError::Validation`] when the zone configuration is invalid.
    pub fn build(self) -> Result<Arc<Orchestrator<C, S>>, LumenError> {
        let bus = self.bus.unwrap_or_default();
        let metrics = Arc::new(MetricsRegistry::new());
        let counters = Arc::new(DailyCounters::new());
        let timers = Arc::new(TimerManager::new(bus.clone(), self.timer_settings));
        let zones = ZoneRegistry::new(Arc::clone(&timers), self.zones)?;
        let executor = Executor::new(
            self.controller,
            self.executor_settings,
            Arc::clone(&metrics),
            Arc::clone(&counters),
        );
        let health = HealthMonitor::new(Arc::clone(&metrics), Arc::clone(&counters));

        let (resync_tx, resync_rx) = mpsc::unbounded_channel();
        let watchdog = Arc::new(Watchdog::new(self.watchdog_interval, move |name| {
            let _ = resync_tx.send(name.to_string());
        }));

        let state = RuntimeState {
            components: AdjustmentComponents::compose(
                ManualTotals::default(),
                Scene::Default.offsets(),
                EnvironmentalInput::default(),
                0,
                Mode::Automatic,
            ),
            ..RuntimeState::default()
        };

        Ok(Arc::new(Orchestrator {
            bus,
            timers,
            zones,
            executor,
            store: self.store,
            metrics,
            counters,
            health,
            watchdog,
            settings: self.settings,
            state: Mutex::new(state),
            tasks: Mutex::new(Tasks::default()),
            resync: Mutex::new(Some(resync_rx)),
        }))
    }
}

impl<C, S> Orchestrator<C, S>
where
    C: LightController + 'static,
    S: SnapshotStore + 'static,
{
    pub fn builder(controller: C, store: S) -> OrchestratorBuilder<C, S> {
        OrchestratorBuilder {
            controller,
            store,
            zones: Vec::new(),
            bus: None,
            settings: OrchestratorSettings::default(),
            timer_settings: TimerSettings::default(),
            executor_settings: ExecutorSettings::default(),
            watchdog_interval: Duration::from_secs(300),
        }
    }

    /// Subscribe to inbound events and spawn the watchdog and resync loops.
    ///
    /// Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let Some(resync) = lock(&self.resync).take() else {
            tracing::debug!("orchestrator already started");
            return;
        };

        let mut subscriptions = Vec::new();
        for kind in [
            EventKind::ManualDetected,
            EventKind::ManualReleased,
            EventKind::TimerExpired,
            EventKind::EnvironmentalChanged,
            EventKind::ButtonPressed,
            EventKind::AnchorChanged,
        ] {
            let weak = Arc::downgrade(self);
            subscriptions.push(self.bus.subscribe(kind, move |event| {
                let weak = weak.clone();
                async move {
                    if let Some(this) = weak.upgrade() {
                        this.handle_event(event).await;
                    }
                }
            }));
        }

        let watchdog = self.watchdog.spawn().abort_handle();
        let listener = self.spawn_resync_listener(resync);

        let mut tasks = lock(&self.tasks);
        tasks.subscriptions = subscriptions;
        tasks.background = vec![watchdog, listener];
        tracing::info!(zones = self.zones.zones().len(), "orchestrator started");
    }

    fn spawn_resync_listener(
        self: &Arc<Self>,
        mut resync: mpsc::UnboundedReceiver<String>,
    ) -> AbortHandle {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(first) = resync.recv().await {
                let mut names = vec![first];
                while let Ok(name) = resync.try_recv() {
                    names.push(name);
                }
                let Some(this) = weak.upgrade() else {
                    break;
                };
                for _ in &names {
                    this.counters.increment(DailyCounter::WatchdogResets);
                }
                tracing::info!(?names, "watchdog requested a resynchronization");
                this.sync_quietly(None).await;
            }
        })
        .abort_handle()
    }

    /// Unsubscribe from the bus and abort every background task.
    pub fn stop(&self) {
        let mut guard = lock(&self.tasks);
        let tasks = &mut *guard;
        for subscription in tasks.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        let pending = tasks.pending_save.take();
        for handle in tasks
            .background
            .drain(..)
            .chain(tasks.anchor.drain(..))
            .chain(pending)
        {
            handle.abort();
        }
        tracing::info!("orchestrator stopped");
    }

    /// Recompose the adjustment from the current inputs and announce it.
    fn recompute(&self, trigger: CalculationTrigger, zones: Vec<ZoneId>) -> AdjustmentComponents {
        let components = {
            let mut state = lock(&self.state);
            let components = AdjustmentComponents::compose(
                state.manual,
                state.scene.offsets(),
                state.environmental,
                state.sunset_boost_pct,
                state.mode,
            );
            state.components = components;
            components
        };
        tracing::debug!(
            ?trigger,
            final_brightness = components.final_brightness(),
            final_warmth = components.final_warmth(),
            "adjustment recomposed"
        );
        self.metrics.record_event(EventKind::CalculationCompleted);
        self.bus.publish(Event::CalculationCompleted(CalculationReport::new(
            trigger, components, zones,
        )));
        components
    }

    fn all_zone_ids(&self) -> Vec<ZoneId> {
        self.zones.zones().into_iter().map(|(config, _)| config.id).collect()
    }

    /// Mode, remembering nothing; also pushes it to the timer manager.
    fn set_mode_locked(&self, state: &mut RuntimeState, mode: Mode) {
        state.mode = mode;
        if !mode.is_automatic() {
            state.scene = Scene::Default;
        }
        self.timers.set_mode(mode);
    }

    #[must_use]
    pub fn status(&self) -> RuntimeStatus {
        let at = now();
        let zones = self
            .zones
            .zones()
            .into_iter()
            .map(|(config, state)| ZoneStatus {
                remaining_secs: state.remaining_secs(at),
                config,
                state,
            })
            .collect();
        let state = lock(&self.state).clone();
        RuntimeStatus {
            mode: state.mode,
            remembered_mode: state.remembered_mode,
            scene: state.scene,
            paused: state.paused,
            components: state.components,
            manual_flags: state.flags,
            environmental: state.environmental_report,
            sunset_boost_pct: state.sunset_boost_pct,
            anchor: state.anchor,
            zones,
            health: self.health.evaluate(),
            metrics: self.metrics.snapshot(),
            today: self.counters.today(),
            rate_limiter_load: self.executor.limiter().load(),
        }
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    #[must_use]
    pub fn timers(&self) -> &TimerManager {
        &self.timers
    }

    #[must_use]
    pub fn executor(&self) -> &Executor<C> {
        &self.executor
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    #[must_use]
    pub fn health(&self) -> HealthReport {
        self.health.evaluate()
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        lock(&self.state).mode
    }

    #[must_use]
    pub fn remembered_mode(&self) -> Option<Mode> {
        lock(&self.state).remembered_mode
    }

    #[must_use]
    pub fn scene(&self) -> Scene {
        lock(&self.state).scene
    }

    #[must_use]
    pub fn components(&self) -> AdjustmentComponents {
        lock(&self.state).components
    }

    #[must_use]
    pub fn manual_flags(&self) -> ManualActionFlags {
        lock(&self.state).flags
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }
}

impl<C, S> Drop for Orchestrator<C, S> {
    fn drop(&mut self) {
        let tasks = self
            .tasks
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for handle in tasks
            .background
            .iter()
            .chain(tasks.anchor.iter())
            .chain(tasks.pending_save.iter())
        {
            handle.abort();
        }
    }
}
