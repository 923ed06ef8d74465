// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::{
    error::{db_error, ApiError, ScheduleError},
    models::{ApiOk, AppState, AppointmentStatus, OkData},
    routes::{doctor_routes::fetch_doctor, doctor_routes::parse_time_of_day, patient_routes::fetch_patient},
    schedule::{
        ensure_slot_free, format_slot, truncate_to_minute, validate_requested_slot,
        AvailabilityResolver, BookingSource, TxBookingStore, WeeklySchedule, WorkingCalendar,
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .patch(patch_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/{appointment_id}/complete", post(mark_completed))
        .route("/appointments/{appointment_id}/cancel", post(mark_cancelled))
}

/* ============================================================
   Response DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct PersonBrief {
    pub id: i64,
    pub display: String,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDto {
    pub appointment_id: i64,
    pub scheduled_at: DateTime<FixedOffset>,
    /// Clinic-local date, YYYY-MM-DD
    pub date: String,
    /// Clinic-local slot, HH:MM
    pub time: String,
    pub status: AppointmentStatus,
    pub notes: String,
    pub patient: PersonBrief,
    pub doctor: PersonBrief,
    pub summary: String,
}

#[derive(Debug, sqlx::FromRow)]
struct AppointmentJoinRow {
    appointment_id: i64,
    scheduled_at: DateTime<Utc>,
    status: String,
    notes: String,
    patient_id: i64,
    patient_name: String,
    doctor_id: i64,
    doctor_name: String,
    specialty_name: String,
}

const APPOINTMENT_SELECT: &str = r#"
    SELECT
      a.appointment_id,
      a.scheduled_at,
      a.status,
      a.notes,
      p.patient_id,
      p.name AS patient_name,
      d.doctor_id,
      d.name AS doctor_name,
      s.name AS specialty_name
    FROM appointment a
    JOIN patient p ON p.patient_id = a.patient_id
    JOIN doctor d ON d.doctor_id = a.doctor_id
    JOIN specialty s ON s.specialty_id = d.specialty_id
"#;

impl AppointmentJoinRow {
    fn into_dto(self, zone: FixedOffset) -> Result<AppointmentDto, ApiError> {
        let local = self.scheduled_at.with_timezone(&zone);
        let doctor_display = format!("{} ({})", self.doctor_name, self.specialty_name);
        let summary = format!(
            "{} - {} em {}",
            self.patient_name,
            doctor_display,
            local.format("%d/%m/%Y %H:%M")
        );

        Ok(AppointmentDto {
            appointment_id: self.appointment_id,
            scheduled_at: local,
            date: local.format("%Y-%m-%d").to_string(),
            time: format_slot(local.time()),
            status: self.status.parse()?,
            notes: self.notes,
            patient: PersonBrief {
                id: self.patient_id,
                display: self.patient_name,
            },
            doctor: PersonBrief {
                id: self.doctor_id,
                display: doctor_display,
            },
            summary,
        })
    }
}

/* ============================================================
   Query params / requests
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AppointmentListQuery {
    pub doctor_id: Option<i64>,
    pub patient_id: Option<i64>,
    /// YYYY-MM-DD, clinic-local
    pub date: Option<String>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    /// YYYY-MM-DD
    pub date: Option<String>,
    /// HH:MM, one of the doctor's slots
    pub time: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchAppointmentRequest {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

/* ============================================================
   Helpers
   ============================================================ */

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::validation("date must be YYYY-MM-DD"))
}

fn parse_slot(raw: Option<&str>) -> Result<Option<NaiveTime>, ApiError> {
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .map(parse_time_of_day)
        .transpose()?
        .map(truncate_to_minute))
}

fn to_utc(zone: FixedOffset, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, ApiError> {
    zone.from_local_datetime(&date.and_time(time))
        .single()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| ApiError::validation("date/time does not exist in the clinic zone"))
}

/// The partial unique index on (doctor_id, scheduled_at) backs the slot check.
fn appointment_write_error(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            tracing::warn!("slot already taken at write time: {}", db.message());
            return ScheduleError::Conflict("time is already booked for this doctor".into()).into();
        }
        if db.is_foreign_key_violation() {
            return ApiError::BadRequest("INVALID_REFERENCE", db.message().to_string());
        }
    }
    db_error(e)
}

async fn ensure_patient_exists(conn: &mut PgConnection, patient_id: i64) -> Result<(), ApiError> {
    match fetch_patient(conn, patient_id).await? {
        Some(_) => Ok(()),
        None => Err(ScheduleError::not_found("patient not found").into()),
    }
}

/// A doctor and start time that passed the working-hours check.
struct SlotChoice {
    doctor_id: i64,
    schedule: WeeklySchedule,
    time: NaiveTime,
}

/// Presence checks run before any lookup: the slot first, then the doctor.
fn required_slot(
    doctor_id: Option<i64>,
    time: Option<NaiveTime>,
) -> Result<(i64, NaiveTime), ScheduleError> {
    let time = time.ok_or_else(|| ScheduleError::validation("time is required"))?;
    let doctor_id = doctor_id.ok_or_else(|| ScheduleError::validation("doctor is required"))?;
    Ok((doctor_id, time))
}

/// Checks the requested start against the doctor's configured hours.
async fn check_slot_hours(
    conn: &mut PgConnection,
    doctor_id: i64,
    time: NaiveTime,
) -> Result<SlotChoice, ApiError> {
    let doctor = fetch_doctor(conn, doctor_id)
        .await?
        .ok_or_else(|| ScheduleError::not_found("doctor not found"))?;
    let schedule = doctor.schedule()?;
    validate_requested_slot(Some(&schedule), Some(time))?;

    Ok(SlotChoice {
        doctor_id: doctor.doctor_id,
        schedule,
        time,
    })
}

/// Rejects the slot if another appointment holds it. The doctor row stays
/// locked until `tx` ends, so concurrent bookings for the doctor queue up.
/// Every read runs on `tx`; the request never holds a second connection.
async fn claim_slot(
    zone: FixedOffset,
    tx: &mut PgConnection,
    choice: &SlotChoice,
    date: NaiveDate,
    excluding: Option<i64>,
) -> Result<(), ApiError> {
    sqlx::query("SELECT doctor_id FROM doctor WHERE doctor_id = $1 FOR UPDATE")
        .bind(choice.doctor_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ScheduleError::not_found("doctor not found"))?;

    let store = TxBookingStore::new(tx);
    ensure_open(&store, zone, choice, date, excluding).await
}

async fn ensure_open<S: BookingSource + ?Sized>(
    source: &S,
    zone: FixedOffset,
    choice: &SlotChoice,
    date: NaiveDate,
    excluding: Option<i64>,
) -> Result<(), ApiError> {
    if !choice.schedule.is_available_at(date.and_time(choice.time)) {
        tracing::warn!(doctor_id = choice.doctor_id, %date, "booking on a day the doctor does not work");
    }

    let availability = AvailabilityResolver::new(source, zone)
        .available_on(choice.doctor_id, &choice.schedule, Some(date), excluding)
        .await?;

    ensure_slot_free(&availability, choice.time).map_err(|e| {
        tracing::warn!(doctor_id = choice.doctor_id, %date, "rejected booking: {e}");
        e.into()
    })
}

async fn load_appointment(state: &AppState, appointment_id: i64) -> Result<AppointmentDto, ApiError> {
    let row = sqlx::query_as::<_, AppointmentJoinRow>(&format!(
        "{APPOINTMENT_SELECT} WHERE a.appointment_id = $1"
    ))
    .bind(appointment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?
    .ok_or_else(|| ApiError::not_found("appointment"))?;

    row.into_dto(state.clinic_zone)
}

/* ============================================================
   GET /appointments
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    Query(q): Query<AppointmentListQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentDto>>>, ApiError> {
    let bounds = match q.date.as_deref() {
        Some(raw) => {
            let day = parse_date(raw)?;
            let (start, end) = crate::schedule::store::local_day_bounds(day, state.clinic_zone)
                .map_err(|e| ApiError::validation(e.to_string()))?;
            (Some(start), Some(end))
        }
        None => (None, None),
    };

    let rows = sqlx::query_as::<_, AppointmentJoinRow>(&format!(
        r#"
        {APPOINTMENT_SELECT}
        WHERE ($1::BIGINT IS NULL OR a.doctor_id = $1)
          AND ($2::BIGINT IS NULL OR a.patient_id = $2)
          AND ($3::TIMESTAMPTZ IS NULL OR a.scheduled_at >= $3)
          AND ($4::TIMESTAMPTZ IS NULL OR a.scheduled_at <  $4)
          AND ($5::TEXT IS NULL OR a.status = $5)
        ORDER BY a.scheduled_at ASC
        "#
    ))
    .bind(q.doctor_id)
    .bind(q.patient_id)
    .bind(bounds.0)
    .bind(bounds.1)
    .bind(q.status.map(AppointmentStatus::as_str))
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    let data = rows
        .into_iter()
        .map(|r| r.into_dto(state.clinic_zone))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiOk { data }))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    Ok(Json(ApiOk {
        data: load_appointment(&state, appointment_id).await?,
    }))
}

/* ============================================================
   POST /appointments (create)
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let (doctor_id, time) = required_slot(req.doctor_id, parse_slot(req.time.as_deref())?)?;

    let mut tx = state.db.begin().await.map_err(db_error)?;
    let choice = check_slot_hours(&mut tx, doctor_id, time).await?;
    let date = parse_date(
        req.date
            .as_deref()
            .ok_or_else(|| ApiError::validation("date is required"))?,
    )?;
    let patient_id = req
        .patient_id
        .ok_or_else(|| ApiError::validation("patient is required"))?;
    ensure_patient_exists(&mut tx, patient_id).await?;

    let status = req.status.unwrap_or(AppointmentStatus::Scheduled);
    if status.blocks_slot() {
        claim_slot(state.clinic_zone, &mut tx, &choice, date, None).await?;
    }
    let scheduled_at = to_utc(state.clinic_zone, date, choice.time)?;

    let appointment_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO appointment (patient_id, doctor_id, scheduled_at, status, notes)
        VALUES ($1,$2,$3,$4,$5)
        RETURNING appointment_id
        "#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(scheduled_at)
    .bind(status.as_str())
    .bind(req.notes.unwrap_or_default())
    .fetch_one(&mut *tx)
    .await
    .map_err(appointment_write_error)?;

    tx.commit().await.map_err(appointment_write_error)?;

    tracing::info!(appointment_id, doctor_id, %scheduled_at, "appointment booked");
    Ok(Json(ApiOk {
        data: load_appointment(&state, appointment_id).await?,
    }))
}

/* ============================================================
   PATCH /appointments/{id}
   ============================================================ */

#[derive(Debug, sqlx::FromRow)]
struct AppointmentCoreRow {
    patient_id: i64,
    doctor_id: i64,
    scheduled_at: DateTime<Utc>,
    status: String,
}

pub async fn patch_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
    Json(req): Json<PatchAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let mut tx = state.db.begin().await.map_err(db_error)?;

    let current = sqlx::query_as::<_, AppointmentCoreRow>(
        r#"
        SELECT patient_id, doctor_id, scheduled_at, status
        FROM appointment
        WHERE appointment_id = $1
        FOR UPDATE
        "#,
    )
    .bind(appointment_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error)?
    .ok_or_else(|| ApiError::not_found("appointment"))?;

    let current_status: AppointmentStatus = current.status.parse()?;
    let status = req.status.unwrap_or(current_status);
    if !current_status.can_become(status) {
        return Err(ApiError::validation(format!(
            "cannot change status from {current_status} to {status}"
        )));
    }

    let patient_id = req.patient_id.unwrap_or(current.patient_id);
    if patient_id != current.patient_id {
        ensure_patient_exists(&mut tx, patient_id).await?;
    }

    let local = current.scheduled_at.with_timezone(&state.clinic_zone);
    let doctor_id = req.doctor_id.unwrap_or(current.doctor_id);
    let date = match req.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => local.date_naive(),
    };
    let time = match req.time.as_deref() {
        Some(raw) => parse_slot(Some(raw))?,
        None => Some(local.time()),
    };

    let rescheduled = doctor_id != current.doctor_id || req.date.is_some() || req.time.is_some();
    let scheduled_at = if rescheduled {
        let (doctor_id, time) = required_slot(Some(doctor_id), time)?;
        let choice = check_slot_hours(&mut tx, doctor_id, time).await?;
        if status.blocks_slot() {
            claim_slot(state.clinic_zone, &mut tx, &choice, date, Some(appointment_id)).await?;
        }
        to_utc(state.clinic_zone, date, choice.time)?
    } else {
        current.scheduled_at
    };

    sqlx::query(
        r#"
        UPDATE appointment
        SET
          patient_id   = $2,
          doctor_id    = $3,
          scheduled_at = $4,
          status       = $5,
          notes        = COALESCE($6, notes)
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .bind(patient_id)
    .bind(doctor_id)
    .bind(scheduled_at)
    .bind(status.as_str())
    .bind(req.notes)
    .execute(&mut *tx)
    .await
    .map_err(appointment_write_error)?;

    tx.commit().await.map_err(appointment_write_error)?;

    tracing::info!(appointment_id, %status, "appointment updated");
    Ok(Json(ApiOk {
        data: load_appointment(&state, appointment_id).await?,
    }))
}

/* ============================================================
   Status transitions
   ============================================================ */

async fn transition(
    state: &AppState,
    appointment_id: i64,
    next: AppointmentStatus,
) -> Result<AppointmentDto, ApiError> {
    let current: String = sqlx::query_scalar("SELECT status FROM appointment WHERE appointment_id = $1")
        .bind(appointment_id)
        .fetch_optional(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::not_found("appointment"))?;

    let current: AppointmentStatus = current.parse()?;
    if !current.can_become(next) {
        return Err(ApiError::validation(format!(
            "cannot change status from {current} to {next}"
        )));
    }

    // guarded on the old status so a concurrent transition cannot be overwritten
    let result = sqlx::query(
        r#"
        UPDATE appointment
        SET status = $2
        WHERE appointment_id = $1 AND status = $3
        "#,
    )
    .bind(appointment_id)
    .bind(next.as_str())
    .bind(current.as_str())
    .execute(&state.db)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict(
            "STATUS_CHANGED",
            "appointment status changed concurrently; reload and retry".into(),
        ));
    }

    tracing::info!(appointment_id, from = %current, to = %next, "appointment status changed");
    load_appointment(state, appointment_id).await
}

pub async fn mark_completed(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let data = transition(&state, appointment_id, AppointmentStatus::Completed).await?;
    Ok(Json(ApiOk { data }))
}

pub async fn mark_cancelled(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let data = transition(&state, appointment_id, AppointmentStatus::Cancelled).await?;
    Ok(Json(ApiOk { data }))
}

/* ============================================================
   DELETE /appointments/{id}
   ============================================================ */

pub async fn delete_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let result = sqlx::query("DELETE FROM appointment WHERE appointment_id = $1")
        .bind(appointment_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("appointment"));
    }

    tracing::info!(appointment_id, "appointment deleted");
    Ok(Json(ApiOk { data: OkData { ok: true } }))
}
