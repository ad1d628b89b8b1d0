//! Validation utilities for pipeline inputs and outputs

use crate::error::{PipelineError, PipelineResult};
use crate::models::{total_percent, ColorCluster, DailyForecast};

/// Tolerance on the sum of cluster shares
pub const PERCENT_SUM_TOLERANCE: f64 = 1e-6;

/// Largest cluster count accepted for dominant color extraction
pub const MAX_CLUSTER_COUNT: usize = 16;

// ============================================================================
// Request Validations
// ============================================================================

/// Cloud cover ceiling must be a percentage in `(0, 100]`
pub fn validate_cloud_cover_ceiling(ceiling: f64) -> Result<(), &'static str> {
    if !ceiling.is_finite() || ceiling <= 0.0 || ceiling > 100.0 {
        return Err("Cloud cover ceiling must be in (0, 100]");
    }
    Ok(())
}

/// Cluster count must be between 1 and [`MAX_CLUSTER_COUNT`]
pub fn validate_cluster_count(k: usize) -> Result<(), &'static str> {
    if k == 0 {
        return Err("Cluster count must be at least 1");
    }
    if k > MAX_CLUSTER_COUNT {
        return Err("Cluster count is too large");
    }
    Ok(())
}

/// Working resolution for clustering must be non-zero and bounded
pub fn validate_working_size(size: u32) -> Result<(), &'static str> {
    if size == 0 || size > 4096 {
        return Err("Working size must be between 1 and 4096 pixels");
    }
    Ok(())
}

// ============================================================================
// Output Validations
// ============================================================================

/// Shares of a complete cluster list sum to 1
pub fn validate_cluster_percentages(clusters: &[ColorCluster]) -> PipelineResult<()> {
    if clusters.iter().any(|c| !(0.0..=1.0).contains(&c.percent)) {
        return Err(PipelineError::InvalidInput(
            "Cluster share outside [0, 1]".to_string(),
        ));
    }
    let total = total_percent(clusters);
    if (total - 1.0).abs() > PERCENT_SUM_TOLERANCE {
        return Err(PipelineError::InvalidInput(format!(
            "Cluster shares sum to {}, expected 1",
            total
        )));
    }
    Ok(())
}

/// Humidity and precipitation probability must be within their natural ranges
pub fn validate_forecast_day(day: &DailyForecast) -> Result<(), &'static str> {
    if !(0.0..=100.0).contains(&day.humidity_percent) {
        return Err("Humidity must be between 0 and 100%");
    }
    if !(0.0..=1.0).contains(&day.precipitation_probability) {
        return Err("Precipitation probability must be between 0 and 1");
    }
    if day.wind_speed_mps < 0.0 || day.uv_index < 0.0 {
        return Err("Wind speed and UV index cannot be negative");
    }
    if day.rain_mm.map(|r| r < 0.0).unwrap_or(false) {
        return Err("Rain volume cannot be negative");
    }
    Ok(())
}
