// src/routes/doctor_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use crate::{
    error::{db_error, db_write_error, ApiError, ScheduleError},
    models::{ApiOk, AppState, DoctorRow, OkData, DOCTOR_COLUMNS},
    schedule::{format_slot, WeeklySchedule, WorkDay, WorkHours},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", get(list_doctors).post(create_doctor))
        .route(
            "/doctors/{doctor_id}",
            get(get_doctor).patch(update_doctor).delete(delete_doctor),
        )
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct DoctorDto {
    pub doctor_id: i64,
    pub name: String,
    pub crm: String,
    pub specialty_id: i64,
    pub phone: String,
    pub email: String,
    pub work_days: Vec<&'static str>,
    pub work_days_display: String,
    pub work_start: Option<String>,
    pub work_end: Option<String>,
}

impl DoctorDto {
    fn from_row(row: DoctorRow) -> Result<Self, ApiError> {
        let schedule = row.schedule()?;
        Ok(Self {
            doctor_id: row.doctor_id,
            name: row.name,
            crm: row.crm,
            specialty_id: row.specialty_id,
            phone: row.phone,
            email: row.email,
            work_days: schedule.days().map(WorkDay::token).collect(),
            work_days_display: schedule.days_display(),
            work_start: row.work_start.map(format_slot),
            work_end: row.work_end.map(format_slot),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDoctorRequest {
    pub name: String,
    pub crm: String,
    pub specialty_id: i64,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub work_days: Vec<String>,
    /// HH:MM
    pub work_start: Option<String>,
    pub work_end: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchDoctorRequest {
    pub name: Option<String>,
    pub crm: Option<String>,
    pub specialty_id: Option<i64>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub work_days: Option<Vec<String>>,
    pub work_start: Option<String>,
    pub work_end: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DoctorListQuery {
    pub specialty_id: Option<i64>,
}

/* ============================================================
   Helpers
   ============================================================ */

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ScheduleError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| ScheduleError::validation(format!("invalid time of day: {raw}")))
}

/// Validates submitted schedule fields and returns the value to store.
pub fn build_schedule(
    days: &[String],
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
) -> Result<WeeklySchedule, ScheduleError> {
    let days = days
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .map(str::parse::<WorkDay>)
        .collect::<Result<Vec<_>, _>>()?;

    let hours = match (start, end) {
        (Some(start), Some(end)) => Some(WorkHours::new(start, end)?),
        (None, None) => None,
        _ => {
            return Err(ScheduleError::validation(
                "work_start and work_end must be set together",
            ));
        }
    };

    let schedule = WeeklySchedule::new(days, hours);
    schedule.ensure_bookable()?;
    Ok(schedule)
}

fn clean_required(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > max {
        return Err(ApiError::validation(format!(
            "{field} is required (max {max} characters)"
        )));
    }
    Ok(value.to_string())
}

fn parse_optional_time(raw: Option<&str>) -> Result<Option<NaiveTime>, ApiError> {
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .map(parse_time_of_day)
        .transpose()?)
}

pub async fn fetch_doctor<'e, E: PgExecutor<'e>>(
    db: E,
    doctor_id: i64,
) -> Result<Option<DoctorRow>, ApiError> {
    sqlx::query_as::<_, DoctorRow>(&format!(
        "SELECT {DOCTOR_COLUMNS} FROM doctor WHERE doctor_id = $1"
    ))
    .bind(doctor_id)
    .fetch_optional(db)
    .await
    .map_err(db_error)
}

/* ============================================================
   Handlers
   ============================================================ */

pub async fn list_doctors(
    State(state): State<AppState>,
    Query(q): Query<DoctorListQuery>,
) -> Result<Json<ApiOk<Vec<DoctorDto>>>, ApiError> {
    let rows = sqlx::query_as::<_, DoctorRow>(&format!(
        r#"
        SELECT {DOCTOR_COLUMNS}
        FROM doctor
        WHERE ($1::BIGINT IS NULL OR specialty_id = $1)
        ORDER BY name ASC
        "#
    ))
    .bind(q.specialty_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    let data = rows
        .into_iter()
        .map(DoctorDto::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ApiOk { data }))
}

pub async fn get_doctor(
    State(state): State<AppState>,
    Path(doctor_id): Path<i64>,
) -> Result<Json<ApiOk<DoctorDto>>, ApiError> {
    let row = fetch_doctor(&state.db, doctor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("doctor"))?;
    Ok(Json(ApiOk {
        data: DoctorDto::from_row(row)?,
    }))
}

pub async fn create_doctor(
    State(state): State<AppState>,
    Json(req): Json<CreateDoctorRequest>,
) -> Result<Json<ApiOk<DoctorDto>>, ApiError> {
    let name = clean_required("name", &req.name, 100)?;
    let crm = clean_required("crm", &req.crm, 20)?;
    let schedule = build_schedule(
        &req.work_days,
        parse_optional_time(req.work_start.as_deref())?,
        parse_optional_time(req.work_end.as_deref())?,
    )?;
    let hours = schedule.hours();

    let row = sqlx::query_as::<_, DoctorRow>(&format!(
        r#"
        INSERT INTO doctor (name, crm, specialty_id, phone, email, work_days, work_start, work_end)
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        RETURNING {DOCTOR_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(crm)
    .bind(req.specialty_id)
    .bind(req.phone.unwrap_or_default().trim().to_string())
    .bind(req.email.unwrap_or_default().trim().to_string())
    .bind(schedule.days_token())
    .bind(hours.map(|h| h.start()))
    .bind(hours.map(|h| h.end()))
    .fetch_one(&state.db)
    .await
    .map_err(db_write_error)?;

    tracing::info!(doctor_id = row.doctor_id, "doctor created");
    Ok(Json(ApiOk {
        data: DoctorDto::from_row(row)?,
    }))
}

pub async fn update_doctor(
    State(state): State<AppState>,
    Path(doctor_id): Path<i64>,
    Json(req): Json<PatchDoctorRequest>,
) -> Result<Json<ApiOk<DoctorDto>>, ApiError> {
    let current = fetch_doctor(&state.db, doctor_id)
        .await?
        .ok_or_else(|| ApiError::not_found("doctor"))?;

    // merge the schedule and validate it as a whole
    let days = match req.work_days {
        Some(days) => days,
        None => current.schedule()?.days().map(|d| d.token().to_string()).collect(),
    };
    let start = match req.work_start.as_deref() {
        Some(raw) => parse_optional_time(Some(raw))?,
        None => current.work_start,
    };
    let end = match req.work_end.as_deref() {
        Some(raw) => parse_optional_time(Some(raw))?,
        None => current.work_end,
    };
    let schedule = build_schedule(&days, start, end)?;
    let hours = schedule.hours();

    let name = match req.name.as_deref() {
        Some(n) => clean_required("name", n, 100)?,
        None => current.name,
    };
    let crm = match req.crm.as_deref() {
        Some(c) => clean_required("crm", c, 20)?,
        None => current.crm,
    };

    let row = sqlx::query_as::<_, DoctorRow>(&format!(
        r#"
        UPDATE doctor
        SET
          name         = $2,
          crm          = $3,
          specialty_id = $4,
          phone        = $5,
          email        = $6,
          work_days    = $7,
          work_start   = $8,
          work_end     = $9
        WHERE doctor_id = $1
        RETURNING {DOCTOR_COLUMNS}
        "#
    ))
    .bind(doctor_id)
    .bind(name)
    .bind(crm)
    .bind(req.specialty_id.unwrap_or(current.specialty_id))
    .bind(req.phone.map(|p| p.trim().to_string()).unwrap_or(current.phone))
    .bind(req.email.map(|e| e.trim().to_string()).unwrap_or(current.email))
    .bind(schedule.days_token())
    .bind(hours.map(|h| h.start()))
    .bind(hours.map(|h| h.end()))
    .fetch_optional(&state.db)
    .await
    .map_err(db_write_error)?
    .ok_or_else(|| ApiError::not_found("doctor"))?;

    tracing::info!(doctor_id, "doctor updated");
    Ok(Json(ApiOk {
        data: DoctorDto::from_row(row)?,
    }))
}

/// Cascades to the doctor's appointments.
pub async fn delete_doctor(
    State(state): State<AppState>,
    Path(doctor_id): Path<i64>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let result = sqlx::query("DELETE FROM doctor WHERE doctor_id = $1")
        .bind(doctor_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("doctor"));
    }

    tracing::info!(doctor_id, "doctor deleted");
    Ok(Json(ApiOk { data: OkData { ok: true } }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn days(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_both_time_formats() {
        assert_eq!(parse_time_of_day("09:30"), Ok(t(9, 30)));
        assert_eq!(parse_time_of_day(" 09:30:00 "), Ok(t(9, 30)));
        assert!(parse_time_of_day("9h30").is_err());
        assert!(parse_time_of_day("25:00").is_err());
    }

    #[test]
    fn builds_schedule_from_request_fields() {
        let s = build_schedule(&days(&["sexta", " segunda "]), Some(t(8, 0)), Some(t(12, 0))).unwrap();
        assert_eq!(s.days_token(), "segunda,sexta");
        assert_eq!(s.hours().map(|h| h.end()), Some(t(12, 0)));
    }

    #[test]
    fn schedule_needs_a_day() {
        let err = build_schedule(&days(&[" "]), Some(t(8, 0)), Some(t(12, 0))).unwrap_err();
        assert_eq!(err, ScheduleError::validation("at least one work day is required"));
    }

    #[test]
    fn schedule_rejects_bad_input() {
        assert!(build_schedule(&days(&["monday"]), None, None).is_err());
        assert!(build_schedule(&days(&["segunda"]), Some(t(12, 0)), Some(t(8, 0))).is_err());
        assert!(build_schedule(&days(&["segunda"]), Some(t(8, 0)), None).is_err());
        assert!(build_schedule(&days(&["segunda"]), None, None).is_ok());
    }
}
