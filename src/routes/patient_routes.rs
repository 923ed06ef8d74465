// src/routes/patient_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use crate::{
    error::{db_error, db_write_error, ApiError},
    models::{ApiOk, AppState, OkData},
};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PatientRow {
    pub patient_id: i64,
    pub name: String,
    pub birth_date: NaiveDate,
    pub cpf: String,
    pub phone: String,
    pub email: String,
}

const PATIENT_COLUMNS: &str = "patient_id, name, birth_date, cpf, phone, email";

#[derive(Debug, Deserialize)]
pub struct CreatePatientRequest {
    pub name: String,
    pub birth_date: NaiveDate,
    pub cpf: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePatientRequest {
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub cpf: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", get(search_patients).post(create_patient))
        .route(
            "/patients/{patient_id}",
            get(get_patient).patch(update_patient).delete(delete_patient),
        )
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(ApiError::validation("name is required (max 100 characters)"));
    }
    Ok(name.to_string())
}

/// CPF is kept as typed (with or without punctuation), up to 14 characters.
fn validate_cpf(cpf: &str) -> Result<String, ApiError> {
    let cpf = cpf.trim();
    let digits = cpf.chars().filter(char::is_ascii_digit).count();
    if digits != 11 || cpf.chars().count() > 14 {
        return Err(ApiError::validation("cpf must have 11 digits"));
    }
    Ok(cpf.to_string())
}

pub async fn create_patient(
    State(state): State<AppState>,
    Json(req): Json<CreatePatientRequest>,
) -> Result<Json<ApiOk<PatientRow>>, ApiError> {
    let name = validate_name(&req.name)?;
    let cpf = validate_cpf(&req.cpf)?;

    let row = sqlx::query_as::<_, PatientRow>(&format!(
        r#"
        INSERT INTO patient (name, birth_date, cpf, phone, email)
        VALUES ($1,$2,$3,$4,$5)
        RETURNING {PATIENT_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(req.birth_date)
    .bind(cpf)
    .bind(req.phone.unwrap_or_default().trim().to_string())
    .bind(req.email.unwrap_or_default().trim().to_string())
    .fetch_one(&state.db)
    .await
    .map_err(db_write_error)?;

    tracing::info!(patient_id = row.patient_id, "patient created");
    Ok(Json(ApiOk { data: row }))
}

pub async fn fetch_patient<'e, E: PgExecutor<'e>>(
    db: E,
    patient_id: i64,
) -> Result<Option<PatientRow>, ApiError> {
    sqlx::query_as::<_, PatientRow>(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patient WHERE patient_id = $1"
    ))
    .bind(patient_id)
    .fetch_optional(db)
    .await
    .map_err(db_error)
}

pub async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<Json<ApiOk<PatientRow>>, ApiError> {
    let row = fetch_patient(&state.db, patient_id)
        .await?
        .ok_or_else(|| ApiError::not_found("patient"))?;
    Ok(Json(ApiOk { data: row }))
}

pub async fn search_patients(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<ApiOk<Vec<PatientRow>>>, ApiError> {
    let query = q.query.unwrap_or_default().trim().to_string();
    if query.is_empty() {
        let rows = sqlx::query_as::<_, PatientRow>(&format!(
            r#"
            SELECT {PATIENT_COLUMNS}
            FROM patient
            ORDER BY name ASC
            LIMIT 50
            "#
        ))
        .fetch_all(&state.db)
        .await
        .map_err(db_error)?;
        return Ok(Json(ApiOk { data: rows }));
    }

    let like = format!("%{}%", query);

    let rows = sqlx::query_as::<_, PatientRow>(&format!(
        r#"
        SELECT {PATIENT_COLUMNS}
        FROM patient
        WHERE name ILIKE $1
           OR cpf ILIKE $1
        ORDER BY name ASC
        LIMIT 50
        "#
    ))
    .bind(like)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(ApiOk { data: rows }))
}

pub async fn update_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
    Json(req): Json<UpdatePatientRequest>,
) -> Result<Json<ApiOk<PatientRow>>, ApiError> {
    let existing = fetch_patient(&state.db, patient_id)
        .await?
        .ok_or_else(|| ApiError::not_found("patient"))?;

    let name = match req.name.as_deref() {
        Some(n) => validate_name(n)?,
        None => existing.name,
    };
    let cpf = match req.cpf.as_deref() {
        Some(c) => validate_cpf(c)?,
        None => existing.cpf,
    };
    let phone = req.phone.map(|p| p.trim().to_string()).unwrap_or(existing.phone);
    let email = req.email.map(|e| e.trim().to_string()).unwrap_or(existing.email);

    let updated = sqlx::query_as::<_, PatientRow>(&format!(
        r#"
        UPDATE patient
        SET name = $1,
            birth_date = $2,
            cpf = $3,
            phone = $4,
            email = $5
        WHERE patient_id = $6
        RETURNING {PATIENT_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(req.birth_date.unwrap_or(existing.birth_date))
    .bind(cpf)
    .bind(phone)
    .bind(email)
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_write_error)?
    .ok_or_else(|| ApiError::not_found("patient"))?;

    Ok(Json(ApiOk { data: updated }))
}

/// Cascades to the patient's appointments.
pub async fn delete_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let result = sqlx::query("DELETE FROM patient WHERE patient_id = $1")
        .bind(patient_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("patient"));
    }

    tracing::info!(patient_id, "patient deleted");
    Ok(Json(ApiOk { data: OkData { ok: true } }))
}
