//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::external::ImagerySession;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub environment: String,
    /// Absent until the catalog handshake has succeeded
    pub imagery: Option<ImagerySession>,
}

/// Health check endpoint handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "firewatch".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        imagery: state.imagery_session.as_deref().cloned(),
    })
}
