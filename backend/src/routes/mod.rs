//! Route definitions for the FireWatch risk service

use axum::{routing::get, Router};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/risk", get(handlers::get_risk))
        .nest("/weather", weather_routes())
}

/// Weather forecast routes
fn weather_routes() -> Router<AppState> {
    Router::new()
        .route("/summary", get(handlers::get_weather_summary))
        .route("/forecast.csv", get(handlers::get_forecast_csv))
}
