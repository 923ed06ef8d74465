use crate::models::AppState;
use axum::{routing::get, Json, Router};

pub mod appointment_routes;
pub mod availability_routes;
pub mod doctor_routes;
pub mod patient_routes;
pub mod specialty_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", specialty_routes::router())
        .nest("/api/v1", doctor_routes::router())
        .nest("/api/v1", patient_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api", availability_routes::router())
        .route("/health", get(|| async { Json(serde_json::json!({ "ok": true })) }))
        .with_state(state)
}
