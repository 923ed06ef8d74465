// src/schedule/store.rs

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeZone, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};
use tokio::sync::Mutex;

use super::resolver::{BookedAppointment, BookedAt, BookingSource};
use crate::models::AppointmentStatus;

#[derive(Debug, sqlx::FromRow)]
struct BookedRow {
    appointment_id: i64,
    scheduled_at: DateTime<Utc>,
    status: String,
}

/// Reads booked slots straight from the appointment table; nothing is cached.
pub struct PgBookingStore<'a> {
    db: &'a PgPool,
}

impl<'a> PgBookingStore<'a> {
    pub fn new(db: &'a PgPool) -> Self {
        Self { db }
    }
}

/// Reads booked slots on a connection the caller already holds, usually an
/// open transaction, so the lookup sees that transaction's locks and writes.
pub struct TxBookingStore<'a> {
    conn: Mutex<&'a mut PgConnection>,
}

impl<'a> TxBookingStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

/// UTC bounds of `[date 00:00, date+1 00:00)` in `zone`.
pub fn local_day_bounds(
    date: NaiveDate,
    zone: FixedOffset,
) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
    let next = date
        .checked_add_days(Days::new(1))
        .ok_or_else(|| anyhow!("date out of range: {date}"))?;
    let start = zone
        .from_local_datetime(&date.and_time(chrono::NaiveTime::MIN))
        .single()
        .ok_or_else(|| anyhow!("no local midnight for {date}"))?;
    let end = zone
        .from_local_datetime(&next.and_time(chrono::NaiveTime::MIN))
        .single()
        .ok_or_else(|| anyhow!("no local midnight for {next}"))?;
    Ok((start.with_timezone(&Utc), end.with_timezone(&Utc)))
}

/// Scheduled and completed appointments of `doctor_id` on the local `date`.
pub async fn booked_on<'e, E: PgExecutor<'e>>(
    db: E,
    doctor_id: i64,
    date: NaiveDate,
    zone: FixedOffset,
) -> anyhow::Result<Vec<BookedAppointment>> {
    let (start_ts, end_ts) = local_day_bounds(date, zone)?;

    let rows = sqlx::query_as::<_, BookedRow>(
        r#"
        SELECT appointment_id, scheduled_at, status
        FROM appointment
        WHERE doctor_id = $1
          AND scheduled_at >= $2
          AND scheduled_at <  $3
          AND status IN ('scheduled', 'completed')
        ORDER BY scheduled_at ASC
        "#,
    )
    .bind(doctor_id)
    .bind(start_ts)
    .bind(end_ts)
    .fetch_all(db)
    .await
    .context("loading booked appointments")?;

    rows.into_iter()
        .map(|r| -> anyhow::Result<BookedAppointment> {
            Ok(BookedAppointment {
                appointment_id: r.appointment_id,
                scheduled_at: BookedAt::Aware(r.scheduled_at.fixed_offset()),
                status: r.status.parse::<AppointmentStatus>()?,
            })
        })
        .collect()
}

#[async_trait]
impl<'a> BookingSource for PgBookingStore<'a> {
    async fn appointments_on(
        &self,
        doctor_id: i64,
        date: NaiveDate,
        zone: FixedOffset,
    ) -> anyhow::Result<Vec<BookedAppointment>> {
        booked_on(self.db, doctor_id, date, zone).await
    }
}

#[async_trait]
impl<'a> BookingSource for TxBookingStore<'a> {
    async fn appointments_on(
        &self,
        doctor_id: i64,
        date: NaiveDate,
        zone: FixedOffset,
    ) -> anyhow::Result<Vec<BookedAppointment>> {
        let mut conn = self.conn.lock().await;
        booked_on(&mut **conn, doctor_id, date, zone).await
    }
}
