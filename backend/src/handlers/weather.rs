//! HTTP handlers for weather forecast endpoints

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use shared::{Coordinate, DailyForecast, WeatherStats};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::weather::forecast_csv;
use crate::AppState;

/// Query parameters for forecast endpoints
#[derive(Debug, Deserialize, Validate)]
pub struct LocationQuery {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl LocationQuery {
    fn coordinate(&self) -> AppResult<Coordinate> {
        self.validate()?;
        Ok(Coordinate::new(self.latitude, self.longitude)?)
    }
}

#[derive(Debug, Serialize)]
pub struct WeatherSummaryResponse {
    pub location: Coordinate,
    pub stats: WeatherStats,
    pub days: Vec<DailyForecast>,
}

/// Get weather statistics and the daily series for a location
pub async fn get_weather_summary(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> AppResult<Json<WeatherSummaryResponse>> {
    let location = query.coordinate()?;
    let summary = state.pipeline.weather().summarize(&location).await?;

    Ok(Json(WeatherSummaryResponse {
        location,
        stats: summary.stats,
        days: summary.days,
    }))
}

/// Export the daily forecast series as CSV
pub async fn get_forecast_csv(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> AppResult<impl IntoResponse> {
    let location = query.coordinate()?;
    let days = state.pipeline.weather().forecast(&location).await?;
    let csv = forecast_csv(&days)
        .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"forecast.csv\""),
        ],
        csv,
    ))
}
