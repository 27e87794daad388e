//! Time and timestamp helpers.

use chrono::{DateTime, Duration, Utc};

/// UTC timestamp used for manual start/expiry, events and snapshots.
pub type Timestamp = DateTime<Utc>;

/// Upper bound for offsets added to timestamps (ten years).
pub const MAX_OFFSET_SECS: u64 = 10 * 365 * 24 * 3600;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// `ts + seconds`, saturating at ten years.
#[must_use]
pub fn add_seconds(ts: Timestamp, seconds: u64) -> Timestamp {
    let secs = i64::try_from(seconds.min(MAX_OFFSET_SECS)).unwrap_or(0);
    ts + Duration::seconds(secs)
}

/// Whole seconds from `now` until `deadline`, rounded up; 0 once passed.
#[must_use]
pub fn seconds_until(deadline: Timestamp, now: Timestamp) -> u64 {
    let millis = (deadline - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        u64::try_from(millis).unwrap_or(0).div_ceil(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_round_partial_seconds_up() {
        let start = now();
        let deadline = start + Duration::milliseconds(1_500);
        assert_eq!(seconds_until(deadline, start), 2);
    }

    #[test]
    fn should_return_zero_for_past_deadline() {
        let start = now();
        let deadline = start - Duration::seconds(5);
        assert_eq!(seconds_until(deadline, start), 0);
    }

    #[test]
    fn should_add_seconds_to_timestamp() {
        let start = now();
        assert_eq!(add_seconds(start, 90) - start, Duration::seconds(90));
    }
}
