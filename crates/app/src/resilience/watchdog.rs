//! Liveness tracking over named heartbeats.
//!
//! Every orchestrator code path calls [`Watchdog::beat`] with its own name,
//! usually through a [`Heartbeat`] guard that stops tracking the name when
//! the path completes. A periodic [`Watchdog::check`] reports names whose
//! last beat is older than the interval. Staleness is a recovery trigger,
//! not an error: the `on_reset` callback only requests a resynchronization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::lock;

type ResetCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Beat {
    at: Instant,
    seq: u64,
}

#[derive(Debug, Default)]
struct Beats {
    next_seq: u64,
    names: HashMap<String, Beat>,
}

pub struct Watchdog {
    interval: Duration,
    beats: Mutex<Beats>,
    on_reset: ResetCallback,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("interval", &self.interval)
            .field("tracked", &lock(&self.beats).names.len())
            .finish_non_exhaustive()
    }
}

impl Watchdog {
    pub fn new<F>(interval: Duration, on_reset: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            interval,
            beats: Mutex::new(Beats::default()),
            on_reset: Box::new(on_reset),
        }
    }

    /// Record a heartbeat for `name`. Returns a token for [`clear`](Self::clear).
    pub fn beat(&self, name: &str) -> u64 {
        let at = Instant::now();
        let mut beats = lock(&self.beats);
        beats.next_seq += 1;
        let beat = Beat {
            at,
            seq: beats.next_seq,
        };
        match beats.names.get_mut(name) {
            Some(entry) => *entry = beat,
            None => {
                beats.names.insert(name.to_string(), beat);
            }
        }
        beat.seq
    }

    /// Stop tracking `name`, unless it was beaten again since `seq`.
    pub fn clear(&self, name: &str, seq: u64) {
        let mut beats = lock(&self.beats);
        if beats.names.get(name).is_some_and(|beat| beat.seq == seq) {
            beats.names.remove(name);
        }
    }

    /// Beat `name` now and clear it when the guard drops.
    #[must_use = "the name is cleared as soon as the guard drops"]
    pub fn heartbeat<'a>(&'a self, name: &'a str) -> Heartbeat<'a> {
        let seq = self.beat(name);
        Heartbeat {
            watchdog: self,
            name,
            seq,
        }
    }

    /// One tick: call `on_reset` once for every stale name and return them.
    ///
    /// Stale names stay tracked and are reported again on the next tick
    /// unless they beat in between.
    pub fn check(&self) -> Vec<String> {
        let now = Instant::now();
        let mut stale: Vec<String> = lock(&self.beats)
            .names
            .iter()
            .filter(|(_, beat)| now.duration_since(beat.at) > self.interval)
            .map(|(name, _)| name.clone())
            .collect();
        stale.sort();

        for name in &stale {
            tracing::warn!(
                name = %name,
                interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
                "watchdog detected stale heartbeat"
            );
            (self.on_reset)(name);
        }
        stale
    }

    /// Run [`check`](Self::check) every interval until the task is aborted.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let watchdog = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(watchdog.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                watchdog.check();
            }
        })
    }

    /// Names currently tracked, sorted.
    #[must_use]
    pub fn tracked(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.beats).names.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Tracks one in-flight code path; see [`Watchdog::heartbeat`].
#[derive(Debug)]
pub struct Heartbeat<'a> {
    watchdog: &'a Watchdog,
    name: &'a str,
    seq: u64,
}

impl Drop for Heartbeat<'_> {
    fn drop(&mut self) {
        self.watchdog.clear(self.name, self.seq);
    }
}
