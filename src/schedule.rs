//! Wake-time alignment for periodic cadences
//!
//! Upstream publishes a period's price shortly after the period starts, so
//! each wake time sits on the cadence grid plus a lag allowance in seconds.

use chrono::{DateTime, Duration, TimeZone, Timelike};

/// Next instant strictly after `now` that lies on the `cadence_minutes` grid
/// (counted from the top of the hour) plus `lag_seconds`.
///
/// `cadence_minutes` must be in `1..=60` and `lag_seconds` below 60; both are
/// enforced by config validation and clamped here.
pub fn next_aligned_time<Tz: TimeZone>(
    now: &DateTime<Tz>,
    cadence_minutes: u32,
    lag_seconds: u32,
) -> DateTime<Tz> {
    let cadence = cadence_minutes.clamp(1, 60);
    let lag = lag_seconds.min(59);
    let step = Duration::minutes(i64::from(cadence));

    // Drop seconds and sub-seconds by subtraction so DST gaps can't make a
    // `with_*` setter fail.
    let minute_start = now.clone()
        - Duration::seconds(i64::from(now.second()))
        - Duration::nanoseconds(i64::from(now.nanosecond()));
    let mut candidate = round_down_to_grid(
        minute_start + Duration::seconds(i64::from(lag)) + step,
        cadence,
    );

    while candidate <= *now {
        candidate = round_down_to_grid(candidate + step, cadence);
    }
    candidate
}

fn round_down_to_grid<Tz: TimeZone>(t: DateTime<Tz>, cadence: u32) -> DateTime<Tz> {
    let excess = t.minute() % cadence;
    t - Duration::minutes(i64::from(excess))
}

/// Per-cadence scheduling state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState<Tz: TimeZone> {
    pub cadence_minutes: u32,
    pub lag_seconds: u32,
    pub next_wake: DateTime<Tz>,
}

impl<Tz: TimeZone> ScheduleState<Tz> {
    /// Start a schedule whose first wake is the next aligned time after `now`
    pub fn new(now: &DateTime<Tz>, cadence_minutes: u32, lag_seconds: u32) -> Self {
        Self {
            cadence_minutes,
            lag_seconds,
            next_wake: next_aligned_time(now, cadence_minutes, lag_seconds),
        }
    }

    pub fn is_due(&self, now: &DateTime<Tz>) -> bool {
        *now >= self.next_wake
    }

    /// Move to the next grid point after `now` and return it
    pub fn advance(&mut self, now: &DateTime<Tz>) -> DateTime<Tz> {
        self.next_wake = next_aligned_time(now, self.cadence_minutes, self.lag_seconds);
        self.next_wake.clone()
    }
}
