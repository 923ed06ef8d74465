// src/schedule/slots.rs

use chrono::{Duration, NaiveTime, Timelike};

/// Fixed appointment granularity.
pub const SLOT_INTERVAL_MINUTES: i64 = 45;

/// Ordered slot start times inside `[start, end)`.
///
/// Cloning yields a fresh pass over the same window.
#[derive(Debug, Clone)]
pub struct Slots {
    next: Option<NaiveTime>,
    end: NaiveTime,
    step: Duration,
}

impl Iterator for Slots {
    type Item = NaiveTime;

    fn next(&mut self) -> Option<NaiveTime> {
        let current = self.next.filter(|t| *t < self.end)?;
        // a non-zero overflow means the step crossed midnight
        let (following, overflow) = current.overflowing_add_signed(self.step);
        self.next = (overflow == 0).then_some(following);
        Some(current)
    }
}

/// Candidate slot starts from `start`, one every `interval_minutes`, stopping
/// before `end`. Only the start of a slot has to fall before `end`.
///
/// Empty when either bound is missing, `start >= end`, or the interval is not positive.
pub fn generate_slots(
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
    interval_minutes: i64,
) -> Slots {
    let step = Duration::minutes(interval_minutes);
    match (start, end) {
        (Some(start), Some(end)) if start < end && interval_minutes > 0 => Slots {
            next: Some(start),
            end,
            step,
        },
        _ => Slots {
            next: None,
            end: NaiveTime::MIN,
            step,
        },
    }
}

/// Drops seconds so a stored start matches its `HH:MM` slot exactly.
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

/// Zero-padded 24-hour `HH:MM`; seconds are dropped.
pub fn format_slot(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}
