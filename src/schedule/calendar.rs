// src/schedule/calendar.rs

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};

use crate::error::ScheduleError;

/// A working weekday. Ordering follows the clinic week, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl WorkDay {
    pub const ALL: [WorkDay; 7] = [
        WorkDay::Monday,
        WorkDay::Tuesday,
        WorkDay::Wednesday,
        WorkDay::Thursday,
        WorkDay::Friday,
        WorkDay::Saturday,
        WorkDay::Sunday,
    ];

    /// Storage token.
    pub fn token(self) -> &'static str {
        match self {
            WorkDay::Monday => "segunda",
            WorkDay::Tuesday => "terca",
            WorkDay::Wednesday => "quarta",
            WorkDay::Thursday => "quinta",
            WorkDay::Friday => "sexta",
            WorkDay::Saturday => "sabado",
            WorkDay::Sunday => "domingo",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkDay::Monday => "Segunda",
            WorkDay::Tuesday => "Terça",
            WorkDay::Wednesday => "Quarta",
            WorkDay::Thursday => "Quinta",
            WorkDay::Friday => "Sexta",
            WorkDay::Saturday => "Sábado",
            WorkDay::Sunday => "Domingo",
        }
    }

    /// Client-facing day number: Monday=0 .. Saturday=5, Sunday=6.
    pub fn index(self) -> u8 {
        self as u8
    }
}

impl From<Weekday> for WorkDay {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => WorkDay::Monday,
            Weekday::Tue => WorkDay::Tuesday,
            Weekday::Wed => WorkDay::Wednesday,
            Weekday::Thu => WorkDay::Thursday,
            Weekday::Fri => WorkDay::Friday,
            Weekday::Sat => WorkDay::Saturday,
            Weekday::Sun => WorkDay::Sunday,
        }
    }
}

impl FromStr for WorkDay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkDay::ALL
            .into_iter()
            .find(|d| d.token() == s)
            .ok_or_else(|| ScheduleError::validation(format!("unknown weekday: {s}")))
    }
}

impl fmt::Display for WorkDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Daily time window. Always `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkHours {
    start: NaiveTime,
    end: NaiveTime,
}

impl WorkHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ScheduleError> {
        if start >= end {
            return Err(ScheduleError::validation(format!(
                "work start {} must be before work end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

/// Capability of anything that knows when a doctor sees patients.
pub trait WorkingCalendar {
    fn works_on(&self, day: WorkDay) -> bool;

    /// Inclusive on both bounds. False when no hours are configured.
    fn is_within_hours(&self, time: NaiveTime) -> bool;

    /// `at` is a wall-clock time in the clinic zone.
    fn is_available_at(&self, at: NaiveDateTime) -> bool {
        self.works_on(at.weekday().into()) && self.is_within_hours(at.time())
    }
}

/// A doctor's recurring weekly availability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklySchedule {
    days: BTreeSet<WorkDay>,
    hours: Option<WorkHours>,
}

impl WeeklySchedule {
    pub fn new(days: impl IntoIterator<Item = WorkDay>, hours: Option<WorkHours>) -> Self {
        Self {
            days: days.into_iter().collect(),
            hours,
        }
    }

    /// Builds a schedule from its stored columns.
    ///
    /// Hours are only configured when both bounds are present.
    pub fn from_storage(
        days: &str,
        start: Option<NaiveTime>,
        end: Option<NaiveTime>,
    ) -> Result<Self, ScheduleError> {
        let hours = match (start, end) {
            (Some(start), Some(end)) => Some(WorkHours::new(start, end)?),
            _ => None,
        };
        Ok(Self {
            days: parse_days(days)?,
            hours,
        })
    }

    /// Rejects schedules that could never take a booking.
    pub fn ensure_bookable(&self) -> Result<(), ScheduleError> {
        if self.days.is_empty() {
            return Err(ScheduleError::validation("at least one work day is required"));
        }
        Ok(())
    }

    pub fn days(&self) -> impl Iterator<Item = WorkDay> + '_ {
        self.days.iter().copied()
    }

    pub fn hours(&self) -> Option<WorkHours> {
        self.hours
    }

    /// Comma-joined tokens in week order, as stored.
    pub fn days_token(&self) -> String {
        self.days
            .iter()
            .map(|d| d.token())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn days_display(&self) -> String {
        self.days
            .iter()
            .map(|d| d.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl WorkingCalendar for WeeklySchedule {
    fn works_on(&self, day: WorkDay) -> bool {
        self.days.contains(&day)
    }

    fn is_within_hours(&self, time: NaiveTime) -> bool {
        self.hours
            .is_some_and(|h| h.start <= time && time <= h.end)
    }
}

/// Parses a comma-joined token list, trimming each token and skipping blanks.
pub fn parse_days(raw: &str) -> Result<BTreeSet<WorkDay>, ScheduleError> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::parse::<WorkDay>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn schedule(days: &str) -> WeeklySchedule {
        WeeklySchedule::from_storage(days, Some(t(9, 0)), Some(t(17, 0))).unwrap()
    }

    #[test]
    fn parses_tokens_with_whitespace_and_blanks() {
        let days = parse_days(" segunda , ,sabado,").unwrap();
        assert_eq!(
            days.into_iter().collect::<Vec<_>>(),
            vec![WorkDay::Monday, WorkDay::Saturday]
        );
    }

    #[test]
    fn rejects_unknown_token() {
        let err = parse_days("segunda,funday").unwrap_err();
        assert_eq!(err, ScheduleError::validation("unknown weekday: funday"));
    }

    #[test]
    fn rejects_inverted_or_empty_hours() {
        assert!(WorkHours::new(t(17, 0), t(9, 0)).is_err());
        assert!(WorkHours::new(t(9, 0), t(9, 0)).is_err());
        assert!(WeeklySchedule::from_storage("segunda", Some(t(10, 0)), Some(t(8, 0))).is_err());
    }

    #[test]
    fn missing_bound_means_no_hours() {
        let s = WeeklySchedule::from_storage("segunda", Some(t(9, 0)), None).unwrap();
        assert_eq!(s.hours(), None);
        assert!(!s.is_within_hours(t(9, 0)));
    }

    #[test]
    fn empty_day_set_is_not_bookable() {
        let s = WeeklySchedule::from_storage("", Some(t(9, 0)), Some(t(17, 0))).unwrap();
        assert!(s.ensure_bookable().is_err());
        assert!(schedule("quarta").ensure_bookable().is_ok());
    }

    #[test]
    fn serializes_in_week_order() {
        let s = schedule("sabado,segunda,domingo");
        assert_eq!(s.days_token(), "segunda,sabado,domingo");
        assert_eq!(s.days_display(), "Segunda, Sábado, Domingo");
    }

    #[test]
    fn day_index_starts_at_monday() {
        assert_eq!(WorkDay::Monday.index(), 0);
        assert_eq!(WorkDay::Saturday.index(), 5);
        assert_eq!(WorkDay::Sunday.index(), 6);
    }

    #[test]
    fn within_hours_is_inclusive() {
        let s = schedule("segunda");
        assert!(s.is_within_hours(t(9, 0)));
        assert!(s.is_within_hours(t(17, 0)));
        assert!(!s.is_within_hours(t(8, 59)));
        assert!(!s.is_within_hours(t(17, 1)));
    }

    #[test]
    fn available_at_combines_day_and_hours() {
        let s = schedule("segunda");
        // 2024-06-03 is a Monday
        let monday = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert!(s.is_available_at(monday.and_time(t(10, 0))));
        assert!(!s.is_available_at(monday.and_time(t(18, 0))));
        let tuesday = monday.succ_opt().unwrap();
        assert!(!s.is_available_at(tuesday.and_time(t(10, 0))));
    }
}
