//! Reminder time calculation.
//!
//! A task's priority decides how many reminders a day it gets (1 to 3); the
//! times are spread evenly over the assignee's work hours.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

use crate::types::Priority;
use crate::validation;

/// Used when work hours are missing, malformed or inverted.
pub const FALLBACK_TIMES: [&str; 3] = ["08:00", "12:00", "17:00"];

pub const MIN_FREQUENCY: u8 = 1;
pub const MAX_FREQUENCY: u8 = 3;

pub fn frequency_for(priority: Priority) -> u8 {
    match priority {
        Priority::Low => 1,
        Priority::Medium => 2,
        Priority::High => 3,
    }
}

/// Evenly spaced `HH:MM` times between `start` and `end` (inclusive).
///
/// Frequency 1 yields `[start]`, 2 yields `[start, end]` and 3 adds the
/// midpoint. Out-of-range frequencies are clamped.
pub fn reminder_times(start: &str, end: &str, frequency: u8) -> Vec<String> {
    reminder_clock_times(start, end, frequency)
        .into_iter()
        .map(|t| t.format("%H:%M").to_string())
        .collect()
}

pub fn reminder_clock_times(start: &str, end: &str, frequency: u8) -> Vec<NaiveTime> {
    let n = frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY) as i64;

    let bounds = validation::clock_time(start)
        .ok()
        .zip(validation::clock_time(end).ok())
        .map(|(s, e)| (truncate_to_minute(s), truncate_to_minute(e)))
        .filter(|(s, e)| s < e);
    let Some((start, end)) = bounds else {
        return fallback(n);
    };

    if n == 1 {
        return vec![start];
    }
    let span = (end - start).num_minutes();
    (0..n)
        .map(|i| start + Duration::minutes(i * span / (n - 1)))
        .collect()
}

fn fallback(n: i64) -> Vec<NaiveTime> {
    FALLBACK_TIMES
        .iter()
        .take(n as usize)
        .filter_map(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
        .collect()
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// Converts local clock times on `day` into UTC instants, keeping only those
/// strictly after `now`.
pub fn instants_on(
    day: NaiveDate,
    times: &[NaiveTime],
    utc_offset_minutes: i32,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let Some(offset) = FixedOffset::east_opt(utc_offset_minutes * 60) else {
        return Vec::new();
    };
    times
        .iter()
        .filter_map(|t| offset.from_local_datetime(&day.and_time(*t)).single())
        .map(|dt| dt.with_timezone(&Utc))
        .filter(|dt| *dt > now)
        .collect()
}

/// The kitchens' local calendar day at `now`.
pub fn local_today(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    FixedOffset::east_opt(utc_offset_minutes * 60)
        .map(|offset| now.with_timezone(&offset).date_naive())
        .unwrap_or_else(|| now.date_naive())
}

/// UTC instant of local midnight for the day containing `now`.
pub fn local_day_start(now: DateTime<Utc>, utc_offset_minutes: i32) -> DateTime<Utc> {
    let day = local_today(now, utc_offset_minutes);
    instants_on(day, &[NaiveTime::MIN], utc_offset_minutes, DateTime::<Utc>::MIN_UTC)
        .into_iter()
        .next()
        .unwrap_or(now)
}
