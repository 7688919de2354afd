//! Conversions between durations and the clock strings shown to the user and stored on disk.
//! Hours never wrap at 24, a timer left running past midnight keeps counting up.

use chrono::{Duration, NaiveTime};

use super::time::parse_time_of_day;

/// Marks an end time or a total time of a session that is still running.
pub const OPEN_SENTINEL: &str = "--:--";

/// Returned by [diff_clock] when one of the sides can't be used.
pub const UNKNOWN_DIFF: &str = "--:--:--";

/// `HH:MM:SS:mmm`, used for the live timer display.
pub fn millis_to_clock(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1000) % 60;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}:{millis:03}")
}

/// `HH:MM:SS`. Fractional seconds are floored, negative values are treated as zero.
pub fn seconds_to_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0. {
        seconds.floor() as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

pub fn format_duration(duration: Duration) -> String {
    seconds_to_clock(duration.num_seconds() as f64)
}

/// Parses `HH:MM:SS` (or `HH:MM`) into seconds. The hour part isn't limited to a day.
pub fn clock_to_seconds(value: &str) -> Option<u64> {
    let parts = value
        .trim()
        .split(':')
        .map(|v| v.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let (hours, minutes, seconds) = match parts.as_slice() {
        [hours, minutes, seconds] => (*hours, *minutes, *seconds),
        [hours, minutes] => (*hours, *minutes, 0),
        _ => return None,
    };
    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

/// Typed version of [clock_to_seconds]. Values chrono can't represent are `None`.
pub fn clock_to_duration(value: &str) -> Option<Duration> {
    let seconds = i64::try_from(clock_to_seconds(value)?).ok()?;
    Duration::try_seconds(seconds)
}

/// Difference between two times of the same day. End before start results in zero.
pub fn diff_times(start: NaiveTime, end: NaiveTime) -> Duration {
    let difference = end - start;
    if difference < Duration::zero() {
        Duration::zero()
    } else {
        difference
    }
}

/// String version of [diff_times]. Never fails: an open session or garbage on either side
/// produces [UNKNOWN_DIFF].
pub fn diff_clock(start: &str, end: &str) -> String {
    if start == OPEN_SENTINEL || end == OPEN_SENTINEL {
        return UNKNOWN_DIFF.into();
    }
    match (parse_time_of_day(start), parse_time_of_day(end)) {
        (Some(start), Some(end)) => format_duration(diff_times(start, end)),
        _ => UNKNOWN_DIFF.into(),
    }
}

/// Short form used for totals, e.g. `1h 5m 0s`.
pub fn format_human(seconds: u64) -> String {
    format!(
        "{}h {}m {}s",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
