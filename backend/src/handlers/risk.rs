//! Wildfire risk handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use shared::{Coordinate, RiskAssessment};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::{RasterPreviews, RunOptions};
use crate::AppState;

/// Query parameters for a risk run
#[derive(Debug, Deserialize, Validate)]
pub struct RiskQuery {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub max_cloud_cover: Option<f64>,
    #[serde(default)]
    pub include_previews: bool,
}

#[derive(Debug, Serialize)]
pub struct RiskResponse {
    #[serde(flatten)]
    pub assessment: RiskAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previews: Option<RasterPreviews>,
}

/// Run the full pipeline for a coordinate
pub async fn get_risk(
    State(state): State<AppState>,
    Query(query): Query<RiskQuery>,
) -> AppResult<Json<RiskResponse>> {
    query.validate()?;
    if let Some(ceiling) = query.max_cloud_cover {
        shared::validate_cloud_cover_ceiling(ceiling)
            .map_err(|e| AppError::ValidationError(e.to_string()))?;
    }

    let location = Coordinate::new(query.latitude, query.longitude)?;
    let run = state
        .pipeline
        .run(
            location,
            RunOptions {
                cloud_cover_ceiling: query.max_cloud_cover,
                include_previews: query.include_previews,
            },
        )
        .await?;

    Ok(Json(RiskResponse {
        assessment: run.assessment,
        previews: run.previews,
    }))
}
