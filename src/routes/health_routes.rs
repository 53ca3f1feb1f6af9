use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::models::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "clinic-booking",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus { status: "healthy" })
}
