// src/routes/availability_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ScheduleError,
    models::{AppState, DoctorRow, DOCTOR_COLUMNS},
    schedule::{format_slot, Availability, AvailabilityResolver, PgBookingStore, SlotOption},
};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/medico/{doctor_id}/availability/",
        get(get_doctor_availability),
    )
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// YYYY-MM-DD; anything else disables the booking filter
    pub date: Option<String>,
    /// appointment being edited; ignored unless it parses as an integer
    pub exclude: Option<String>,
}

/// Wire shape consumed by the booking form.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AvailabilityResponse {
    Success {
        success: bool,
        dias_disponiveis: Vec<u8>,
        hora_inicio: Option<String>,
        hora_fim: Option<String>,
        horarios_disponiveis: Vec<SlotOption>,
        dias_trabalho_display: String,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl From<Availability> for AvailabilityResponse {
    fn from(a: Availability) -> Self {
        AvailabilityResponse::Success {
            success: true,
            dias_disponiveis: a.work_days,
            hora_inicio: a.work_hours.map(|h| format_slot(h.start())),
            hora_fim: a.work_hours.map(|h| format_slot(h.end())),
            horarios_disponiveis: a.slots,
            dias_trabalho_display: a.work_days_display,
        }
    }
}

/// The whole answer is either a full slot list or an explicit failure.
fn availability_reply(result: Result<Availability, ScheduleError>) -> (StatusCode, AvailabilityResponse) {
    match result {
        Ok(a) => (StatusCode::OK, a.into()),
        Err(e) => {
            let status = match &e {
                ScheduleError::NotFound(_) => StatusCode::NOT_FOUND,
                ScheduleError::Resolution(_) => StatusCode::SERVICE_UNAVAILABLE,
                ScheduleError::Validation(_) | ScheduleError::Conflict(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (
                status,
                AvailabilityResponse::Failure {
                    success: false,
                    error: e.to_string(),
                },
            )
        }
    }
}

fn parse_excluded(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
}

/// Ids that are not integers cannot name a doctor.
fn parse_doctor_id(raw: &str) -> Result<i64, ScheduleError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ScheduleError::not_found("doctor not found"))
}

async fn resolve(state: &AppState, raw_id: &str, q: &AvailabilityQuery) -> Result<Availability, ScheduleError> {
    let doctor_id = parse_doctor_id(raw_id)?;
    let doctor = sqlx::query_as::<_, DoctorRow>(&format!(
        "SELECT {DOCTOR_COLUMNS} FROM doctor WHERE doctor_id = $1"
    ))
    .bind(doctor_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ScheduleError::Resolution(format!("db error: {e}")))?
    .ok_or_else(|| ScheduleError::not_found("doctor not found"))?;

    let schedule = doctor.schedule()?;
    let store = PgBookingStore::new(&state.db);

    AvailabilityResolver::new(&store, state.clinic_zone)
        .available_slots(
            doctor.doctor_id,
            &schedule,
            q.date.as_deref(),
            parse_excluded(q.exclude.as_deref()),
        )
        .await
}

pub async fn get_doctor_availability(
    State(state): State<AppState>,
    Path(doctor_id): Path<String>,
    Query(q): Query<AvailabilityQuery>,
) -> Response {
    let (status, body) = availability_reply(resolve(&state, &doctor_id, &q).await);
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use serde_json::json;

    use crate::schedule::{WeeklySchedule, WorkHours};
    use crate::schedule::resolver::assemble;

    #[test]
    fn success_body_uses_booking_form_keys() {
        let hours = WorkHours::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        )
        .unwrap();
        let schedule = WeeklySchedule::from_storage("segunda,sabado", Some(hours.start()), Some(hours.end())).unwrap();
        let (status, body) = availability_reply(Ok(assemble(&schedule, &Default::default())));

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({
                "success": true,
                "dias_disponiveis": [0, 5],
                "hora_inicio": "09:00",
                "hora_fim": "10:30",
                "horarios_disponiveis": [
                    {"value": "09:00", "display": "09:00"},
                    {"value": "09:45", "display": "09:45"}
                ],
                "dias_trabalho_display": "Segunda, Sábado"
            })
        );
    }

    #[test]
    fn failures_are_total() {
        let (status, body) = availability_reply(Err(ScheduleError::Resolution("timeout".into())));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({"success": false, "error": "could not resolve booked slots: timeout"})
        );

        let (status, _) = availability_reply(Err(ScheduleError::not_found("doctor not found")));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn non_numeric_doctor_id_is_not_found() {
        assert_eq!(parse_doctor_id("12"), Ok(12));
        let err = parse_doctor_id("abc").unwrap_err();
        let (status, body) = availability_reply(Err(err));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({"success": false, "error": "doctor not found"})
        );
    }

    #[test]
    fn bad_exclude_is_ignored() {
        assert_eq!(parse_excluded(Some("42")), Some(42));
        assert_eq!(parse_excluded(Some(" 7 ")), Some(7));
        assert_eq!(parse_excluded(Some("abc")), None);
        assert_eq!(parse_excluded(None), None);
    }
}
