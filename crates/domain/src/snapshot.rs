//! Persisted runtime snapshot.
//!
//! Schema:
//! `{ manual: { <zone>: { manual_active, manual_duration, manual_started,
//! manual_expires, timer_remaining } }, sunset_boost_pct }`.
//! Timestamps are ISO-8601. On reload, remaining time is always derived from
//! `manual_expires`; `timer_remaining` is informational.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::ZoneId;
use crate::time::{Timestamp, seconds_until};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub manual: BTreeMap<ZoneId, ZoneSnapshot>,
    #[serde(default)]
    pub sunset_boost_pct: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub manual_active: bool,
    /// Seconds.
    #[serde(default)]
    pub manual_duration: u64,
    #[serde(default)]
    pub manual_started: Option<Timestamp>,
    #[serde(default)]
    pub manual_expires: Option<Timestamp>,
    /// Seconds left when the snapshot was written.
    #[serde(default)]
    pub timer_remaining: u64,
}

impl ZoneSnapshot {
    /// Seconds of override left at `now`, derived from the absolute expiry.
    #[must_use]
    pub fn remaining_at(&self, now: Timestamp) -> u64 {
        match (self.manual_active, self.manual_expires) {
            (true, Some(expires)) => seconds_until(expires, now),
            _ => 0,
        }
    }
}
