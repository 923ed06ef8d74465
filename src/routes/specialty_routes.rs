// src/routes/specialty_routes.rs

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{db_error, db_write_error, ApiError},
    models::{ApiOk, AppState, OkData},
};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SpecialtyRow {
    pub specialty_id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct SpecialtyRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchSpecialtyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/specialties", get(list_specialties).post(create_specialty))
        .route(
            "/specialties/{specialty_id}",
            get(get_specialty)
                .patch(update_specialty)
                .delete(delete_specialty),
        )
}

fn clean_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(ApiError::validation("name is required (max 100 characters)"));
    }
    Ok(name)
}

pub async fn list_specialties(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<Vec<SpecialtyRow>>>, ApiError> {
    let rows = sqlx::query_as::<_, SpecialtyRow>(
        r#"
        SELECT specialty_id, name, description
        FROM specialty
        ORDER BY name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(ApiOk { data: rows }))
}

pub async fn get_specialty(
    State(state): State<AppState>,
    Path(specialty_id): Path<i64>,
) -> Result<Json<ApiOk<SpecialtyRow>>, ApiError> {
    let row = sqlx::query_as::<_, SpecialtyRow>(
        r#"
        SELECT specialty_id, name, description
        FROM specialty
        WHERE specialty_id = $1
        "#,
    )
    .bind(specialty_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?
    .ok_or_else(|| ApiError::not_found("specialty"))?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn create_specialty(
    State(state): State<AppState>,
    Json(req): Json<SpecialtyRequest>,
) -> Result<Json<ApiOk<SpecialtyRow>>, ApiError> {
    let name = clean_name(&req.name)?;

    let row = sqlx::query_as::<_, SpecialtyRow>(
        r#"
        INSERT INTO specialty (name, description)
        VALUES ($1, $2)
        RETURNING specialty_id, name, description
        "#,
    )
    .bind(name)
    .bind(req.description.unwrap_or_default())
    .fetch_one(&state.db)
    .await
    .map_err(db_write_error)?;

    tracing::info!(specialty_id = row.specialty_id, "specialty created");
    Ok(Json(ApiOk { data: row }))
}

pub async fn update_specialty(
    State(state): State<AppState>,
    Path(specialty_id): Path<i64>,
    Json(req): Json<PatchSpecialtyRequest>,
) -> Result<Json<ApiOk<SpecialtyRow>>, ApiError> {
    let name = req.name.as_deref().map(clean_name).transpose()?;

    let row = sqlx::query_as::<_, SpecialtyRow>(
        r#"
        UPDATE specialty
        SET
          name        = COALESCE($2, name),
          description = COALESCE($3, description)
        WHERE specialty_id = $1
        RETURNING specialty_id, name, description
        "#,
    )
    .bind(specialty_id)
    .bind(name)
    .bind(req.description)
    .fetch_optional(&state.db)
    .await
    .map_err(db_write_error)?
    .ok_or_else(|| ApiError::not_found("specialty"))?;

    Ok(Json(ApiOk { data: row }))
}

/// Cascades to the specialty's doctors and their appointments.
pub async fn delete_specialty(
    State(state): State<AppState>,
    Path(specialty_id): Path<i64>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let result = sqlx::query("DELETE FROM specialty WHERE specialty_id = $1")
        .bind(specialty_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("specialty"));
    }

    tracing::info!(specialty_id, "specialty deleted");
    Ok(Json(ApiOk { data: OkData { ok: true } }))
}
