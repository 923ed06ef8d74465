// src/schedule/resolver.rs

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::{debug, warn};

use super::calendar::{WeeklySchedule, WorkHours};
use super::slots::{format_slot, generate_slots, Slots, SLOT_INTERVAL_MINUTES};
use crate::error::ScheduleError;
use crate::models::AppointmentStatus;

/// Start of an existing appointment as read from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookedAt {
    Aware(DateTime<FixedOffset>),
    /// No zone attached; taken to be clinic wall-clock time already.
    Naive(NaiveDateTime),
}

impl BookedAt {
    pub fn local(&self, zone: FixedOffset) -> NaiveDateTime {
        match self {
            BookedAt::Aware(at) => at.with_timezone(&zone).naive_local(),
            BookedAt::Naive(at) => *at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookedAppointment {
    pub appointment_id: i64,
    pub scheduled_at: BookedAt,
    pub status: AppointmentStatus,
}

/// Read access to a doctor's existing appointments.
#[async_trait]
pub trait BookingSource: Send + Sync {
    /// Appointments of `doctor_id` whose start falls on `date` in `zone`.
    /// Implementations may also return cancelled ones; they are filtered again here.
    async fn appointments_on(
        &self,
        doctor_id: i64,
        date: NaiveDate,
        zone: FixedOffset,
    ) -> anyhow::Result<Vec<BookedAppointment>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotOption {
    pub value: String,
    pub display: String,
}

impl SlotOption {
    fn new(time: NaiveTime) -> Self {
        let value = format_slot(time);
        Self {
            display: value.clone(),
            value,
        }
    }
}

/// Bookable slots for one doctor, optionally on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    /// Monday=0 .. Sunday=6, ascending.
    pub work_days: Vec<u8>,
    pub work_hours: Option<WorkHours>,
    pub slots: Vec<SlotOption>,
    pub work_days_display: String,
}

impl Availability {
    pub fn offers(&self, slot: &str) -> bool {
        self.slots.iter().any(|s| s.value == slot)
    }
}

/// Lenient `YYYY-MM-DD` parse. Anything else means "no date filter".
pub fn parse_query_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

pub fn candidate_slots(schedule: &WeeklySchedule) -> Slots {
    let hours = schedule.hours();
    generate_slots(
        hours.map(|h| h.start()),
        hours.map(|h| h.end()),
        SLOT_INTERVAL_MINUTES,
    )
}

/// `HH:MM` starts already taken on `date`, ignoring cancelled appointments
/// and the one being edited.
pub fn booked_slot_set(
    appointments: &[BookedAppointment],
    date: NaiveDate,
    excluding: Option<i64>,
    zone: FixedOffset,
) -> HashSet<String> {
    appointments
        .iter()
        .filter(|a| a.status.blocks_slot())
        .filter(|a| Some(a.appointment_id) != excluding)
        .map(|a| a.scheduled_at.local(zone))
        .filter(|at| at.date() == date)
        .map(|at| format_slot(at.time()))
        .collect()
}

/// Combines the schedule with the booked set. Comparison is on the `HH:MM` text.
pub fn assemble(schedule: &WeeklySchedule, booked: &HashSet<String>) -> Availability {
    let slots = candidate_slots(schedule)
        .map(SlotOption::new)
        .filter(|s| !booked.contains(&s.value))
        .collect();

    Availability {
        work_days: schedule.days().map(|d| d.index()).collect(),
        work_hours: schedule.hours(),
        slots,
        work_days_display: schedule.days_display(),
    }
}

/// Checks a requested start time against the doctor's configured hours only.
pub fn validate_requested_slot(
    schedule: Option<&WeeklySchedule>,
    slot: Option<NaiveTime>,
) -> Result<(), ScheduleError> {
    let slot = slot.ok_or_else(|| ScheduleError::validation("time is required"))?;
    let schedule = schedule.ok_or_else(|| ScheduleError::validation("doctor is required"))?;

    let Some(hours) = schedule.hours() else {
        return Ok(());
    };

    let requested = format_slot(slot);
    if candidate_slots(schedule).any(|t| format_slot(t) == requested) {
        return Ok(());
    }

    Err(ScheduleError::validation(format!(
        "time {requested} is outside the doctor's hours; choose a start between {} and {} in {}-minute steps",
        format_slot(hours.start()),
        format_slot(hours.end()),
        SLOT_INTERVAL_MINUTES
    )))
}

/// Rejects a slot that another non-cancelled appointment already holds.
pub fn ensure_slot_free(availability: &Availability, slot: NaiveTime) -> Result<(), ScheduleError> {
    let requested = format_slot(slot);
    if availability.offers(&requested) {
        Ok(())
    } else {
        Err(ScheduleError::Conflict(format!(
            "time {requested} is already booked for this doctor"
        )))
    }
}

/// Computes availability against a [`BookingSource`], in the clinic's zone.
pub struct AvailabilityResolver<'a, S: ?Sized> {
    source: &'a S,
    zone: FixedOffset,
}

impl<'a, S: BookingSource + ?Sized> AvailabilityResolver<'a, S> {
    pub fn new(source: &'a S, zone: FixedOffset) -> Self {
        Self { source, zone }
    }

    /// Bookable slots for the doctor, with `date` as sent by a client.
    ///
    /// A date that does not parse skips the booking lookup.
    pub async fn available_slots(
        &self,
        doctor_id: i64,
        schedule: &WeeklySchedule,
        date: Option<&str>,
        excluding: Option<i64>,
    ) -> Result<Availability, ScheduleError> {
        let day = parse_query_date(date);
        if day.is_none() && date.is_some_and(|d| !d.trim().is_empty()) {
            debug!(doctor_id, "ignoring unparseable availability date");
        }
        self.available_on(doctor_id, schedule, day, excluding).await
    }

    /// A failing lookup fails the whole call; it never degrades to "nothing booked".
    pub async fn available_on(
        &self,
        doctor_id: i64,
        schedule: &WeeklySchedule,
        day: Option<NaiveDate>,
        excluding: Option<i64>,
    ) -> Result<Availability, ScheduleError> {
        let booked = match day {
            Some(day) => {
                let appointments = self
                    .source
                    .appointments_on(doctor_id, day, self.zone)
                    .await
                    .map_err(|e| {
                        warn!(doctor_id, %day, "booked slot lookup failed: {e:#}");
                        ScheduleError::Resolution(format!("{e:#}"))
                    })?;
                booked_slot_set(&appointments, day, excluding, self.zone)
            }
            None => HashSet::new(),
        };

        let availability = assemble(schedule, &booked);
        debug!(
            doctor_id,
            booked = booked.len(),
            open = availability.slots.len(),
            "resolved availability"
        );
        Ok(availability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::anyhow;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn brt() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn schedule(start: NaiveTime, end: NaiveTime) -> WeeklySchedule {
        WeeklySchedule::from_storage("segunda,sabado", Some(start), Some(end)).unwrap()
    }

    fn naive(id: i64, h: u32, m: u32, status: AppointmentStatus) -> BookedAppointment {
        BookedAppointment {
            appointment_id: id,
            scheduled_at: BookedAt::Naive(day().and_time(t(h, m))),
            status,
        }
    }

    fn values(a: &Availability) -> Vec<&str> {
        a.slots.iter().map(|s| s.value.as_str()).collect()
    }

    /// In-memory appointment table.
    #[derive(Default)]
    struct MemoryBookings {
        rows: Mutex<Vec<(i64, BookedAppointment)>>,
    }

    impl MemoryBookings {
        fn book(&self, doctor_id: i64, appt: BookedAppointment) {
            self.rows.lock().unwrap().push((doctor_id, appt));
        }

        fn set_status(&self, appointment_id: i64, status: AppointmentStatus) {
            for (_, a) in self.rows.lock().unwrap().iter_mut() {
                if a.appointment_id == appointment_id {
                    a.status = status;
                }
            }
        }
    }

    #[async_trait]
    impl BookingSource for MemoryBookings {
        async fn appointments_on(
            &self,
            doctor_id: i64,
            date: NaiveDate,
            zone: FixedOffset,
        ) -> anyhow::Result<Vec<BookedAppointment>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|(d, a)| *d == doctor_id && a.scheduled_at.local(zone).date() == date)
                .map(|(_, a)| a.clone())
                .collect())
        }
    }

    struct Unavailable;

    #[async_trait]
    impl BookingSource for Unavailable {
        async fn appointments_on(
            &self,
            _doctor_id: i64,
            _date: NaiveDate,
            _zone: FixedOffset,
        ) -> anyhow::Result<Vec<BookedAppointment>> {
            Err(anyhow!("connection refused"))
        }
    }

    #[test]
    fn aware_times_convert_to_clinic_zone() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let at = utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let local = BookedAt::Aware(at).local(brt());
        assert_eq!(local, day().and_time(t(9, 0)));
    }

    #[test]
    fn naive_times_are_already_local() {
        let at = day().and_time(t(9, 45));
        assert_eq!(BookedAt::Naive(at).local(brt()), at);
    }

    #[test]
    fn booked_set_skips_cancelled_and_excluded() {
        let appts = vec![
            naive(1, 9, 0, AppointmentStatus::Scheduled),
            naive(2, 9, 45, AppointmentStatus::Completed),
            naive(3, 10, 30, AppointmentStatus::Cancelled),
            naive(4, 11, 15, AppointmentStatus::Scheduled),
        ];
        let booked = booked_slot_set(&appts, day(), Some(4), brt());
        let mut got: Vec<_> = booked.into_iter().collect();
        got.sort();
        assert_eq!(got, vec!["09:00", "09:45"]);
    }

    #[test]
    fn booked_set_floors_seconds() {
        let appts = vec![BookedAppointment {
            appointment_id: 1,
            scheduled_at: BookedAt::Naive(day().and_hms_opt(9, 45, 30).unwrap()),
            status: AppointmentStatus::Scheduled,
        }];
        let booked = booked_slot_set(&appts, day(), None, brt());
        assert!(booked.contains("09:45"));
    }

    #[test]
    fn off_grid_booking_does_not_block_grid_slot() {
        let appts = vec![naive(1, 9, 10, AppointmentStatus::Scheduled)];
        let booked = booked_slot_set(&appts, day(), None, brt());
        let a = assemble(&schedule(t(9, 0), t(10, 30)), &booked);
        assert_eq!(values(&a), vec!["09:00", "09:45"]);
    }

    #[test]
    fn assemble_reports_days_and_display() {
        let a = assemble(&schedule(t(9, 0), t(10, 30)), &HashSet::new());
        assert_eq!(a.work_days, vec![0, 5]);
        assert_eq!(a.work_days_display, "Segunda, Sábado");
        assert_eq!(
            a.slots[0],
            SlotOption {
                value: "09:00".into(),
                display: "09:00".into()
            }
        );
    }

    #[test]
    fn query_date_parsing_is_lenient() {
        assert_eq!(parse_query_date(Some("2024-06-03")), Some(day()));
        assert_eq!(parse_query_date(Some(" 2024-06-03 ")), Some(day()));
        assert_eq!(parse_query_date(Some("03/06/2024")), None);
        assert_eq!(parse_query_date(Some("2024-02-30")), None);
        assert_eq!(parse_query_date(Some("")), None);
        assert_eq!(parse_query_date(None), None);
    }

    #[test]
    fn validate_requires_slot_then_doctor() {
        let s = schedule(t(9, 0), t(17, 0));
        assert_eq!(
            validate_requested_slot(None, None),
            Err(ScheduleError::validation("time is required"))
        );
        assert_eq!(
            validate_requested_slot(None, Some(t(9, 0))),
            Err(ScheduleError::validation("doctor is required"))
        );
        assert!(validate_requested_slot(Some(&s), None).is_err());
    }

    #[test]
    fn validate_checks_hours_grid() {
        let s = schedule(t(9, 0), t(17, 0));
        assert!(validate_requested_slot(Some(&s), Some(t(9, 0))).is_ok());
        assert!(validate_requested_slot(Some(&s), Some(t(9, 45))).is_ok());

        let err = validate_requested_slot(Some(&s), Some(t(8, 0))).unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));
        let msg = err.to_string();
        assert!(msg.contains("09:00") && msg.contains("17:00") && msg.contains("45"));

        // off-grid and end-of-day starts are not slots
        assert!(validate_requested_slot(Some(&s), Some(t(9, 10))).is_err());
        assert!(validate_requested_slot(Some(&s), Some(t(17, 0))).is_err());
    }

    #[test]
    fn validate_passes_without_configured_hours() {
        let s = WeeklySchedule::from_storage("segunda", None, None).unwrap();
        assert!(validate_requested_slot(Some(&s), Some(t(3, 0))).is_ok());
    }

    #[test]
    fn ensure_slot_free_reports_conflict() {
        let booked: HashSet<String> = ["09:45".to_string()].into();
        let a = assemble(&schedule(t(9, 0), t(10, 30)), &booked);
        assert!(ensure_slot_free(&a, t(9, 0)).is_ok());
        assert!(matches!(
            ensure_slot_free(&a, t(9, 45)),
            Err(ScheduleError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn booked_slots_are_never_offered() {
        let store = MemoryBookings::default();
        store.book(7, naive(1, 9, 45, AppointmentStatus::Scheduled));
        store.book(7, naive(2, 11, 15, AppointmentStatus::Completed));
        // other doctor, same time
        store.book(8, naive(3, 9, 0, AppointmentStatus::Scheduled));

        let resolver = AvailabilityResolver::new(&store, brt());
        let a = resolver
            .available_slots(7, &schedule(t(9, 0), t(12, 0)), Some("2024-06-03"), None)
            .await
            .unwrap();

        assert_eq!(values(&a), vec!["09:00", "10:30"]);
    }

    #[tokio::test]
    async fn other_dates_do_not_block() {
        let store = MemoryBookings::default();
        store.book(7, naive(1, 9, 0, AppointmentStatus::Scheduled));

        let resolver = AvailabilityResolver::new(&store, brt());
        let a = resolver
            .available_slots(7, &schedule(t(9, 0), t(10, 30)), Some("2024-06-04"), None)
            .await
            .unwrap();

        assert_eq!(values(&a), vec!["09:00", "09:45"]);
    }

    #[tokio::test]
    async fn cancelling_frees_the_slot() {
        let store = MemoryBookings::default();
        store.book(7, naive(1, 9, 0, AppointmentStatus::Scheduled));
        let resolver = AvailabilityResolver::new(&store, brt());
        let s = schedule(t(9, 0), t(10, 30));

        let before = resolver.available_slots(7, &s, Some("2024-06-03"), None).await.unwrap();
        assert_eq!(values(&before), vec!["09:45"]);

        store.set_status(1, AppointmentStatus::Cancelled);
        let after = resolver.available_slots(7, &s, Some("2024-06-03"), None).await.unwrap();
        assert_eq!(values(&after), vec!["09:00", "09:45"]);
    }

    #[tokio::test]
    async fn editing_does_not_conflict_with_itself() {
        let store = MemoryBookings::default();
        store.book(7, naive(1, 9, 0, AppointmentStatus::Scheduled));
        let resolver = AvailabilityResolver::new(&store, brt());

        let a = resolver
            .available_slots(7, &schedule(t(9, 0), t(10, 30)), Some("2024-06-03"), Some(1))
            .await
            .unwrap();
        assert_eq!(values(&a), vec!["09:00", "09:45"]);
    }

    #[tokio::test]
    async fn aware_bookings_block_their_local_slot() {
        let store = MemoryBookings::default();
        let utc = FixedOffset::east_opt(0).unwrap();
        store.book(
            7,
            BookedAppointment {
                appointment_id: 1,
                // 12:45 UTC is 09:45 in the clinic
                scheduled_at: BookedAt::Aware(utc.with_ymd_and_hms(2024, 6, 3, 12, 45, 0).unwrap()),
                status: AppointmentStatus::Scheduled,
            },
        );

        let resolver = AvailabilityResolver::new(&store, brt());
        let a = resolver
            .available_slots(7, &schedule(t(9, 0), t(10, 30)), Some("2024-06-03"), None)
            .await
            .unwrap();
        assert_eq!(values(&a), vec!["09:00"]);
    }

    #[tokio::test]
    async fn unparseable_date_returns_every_candidate() {
        let resolver = AvailabilityResolver::new(&Unavailable, brt());
        let a = resolver
            .available_slots(7, &schedule(t(9, 0), t(10, 30)), Some("not-a-date"), None)
            .await
            .unwrap();
        assert_eq!(values(&a), vec!["09:00", "09:45"]);
    }

    #[tokio::test]
    async fn lookup_failure_fails_the_whole_call() {
        let resolver = AvailabilityResolver::new(&Unavailable, brt());
        let err = resolver
            .available_slots(7, &schedule(t(9, 0), t(10, 30)), Some("2024-06-03"), None)
            .await
            .unwrap_err();
        assert_eq!(err, ScheduleError::Resolution("connection refused".into()));
    }
}
