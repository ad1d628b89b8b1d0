//! WebAssembly module for the FireWatch wildfire risk platform
//!
//! Provides client-side computation for:
//! - Risk index from cluster lists and weather stats
//! - Individual weather indicators
//! - Capture pair selection over catalog listings

use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::log_1(&"FireWatch risk module loaded".into());
}

fn parse<T: serde::de::DeserializeOwned>(json: &str, what: &str) -> Result<T, JsValue> {
    serde_json::from_str(json).map_err(|e| JsValue::from_str(&format!("Invalid {} JSON: {}", what, e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn pipeline_error(err: shared::PipelineError) -> JsValue {
    JsValue::from_str(&format!("{}: {}", err.code(), err))
}

/// Risk index from two ranked cluster lists and weather stats
#[wasm_bindgen]
pub fn compute_risk_index(
    newer_clusters_json: &str,
    older_clusters_json: &str,
    stats_json: &str,
) -> Result<f64, JsValue> {
    let newer: Vec<ColorCluster> = parse(newer_clusters_json, "newer clusters")?;
    let older: Vec<ColorCluster> = parse(older_clusters_json, "older clusters")?;
    let stats: WeatherStats = parse(stats_json, "weather stats")?;

    aggregate(&newer, &older, &stats)
        .map(|index| index.value())
        .map_err(pipeline_error)
}

/// All indicators of a run, serialized as JSON
#[wasm_bindgen]
pub fn compute_risk_indicators(
    newer_clusters_json: &str,
    older_clusters_json: &str,
    stats_json: &str,
) -> Result<String, JsValue> {
    let newer: Vec<ColorCluster> = parse(newer_clusters_json, "newer clusters")?;
    let older: Vec<ColorCluster> = parse(older_clusters_json, "older clusters")?;
    let stats: WeatherStats = parse(stats_json, "weather stats")?;

    let indicators = RiskIndicators::compute(&newer, &older, &stats).map_err(pipeline_error)?;
    to_json(&indicators)
}

/// Weather stats from a JSON array of daily forecasts
#[wasm_bindgen]
pub fn summarize_forecast(forecast_json: &str) -> Result<String, JsValue> {
    let days: Vec<DailyForecast> = parse(forecast_json, "forecast")?;
    let stats = WeatherStats::summarize(&days).map_err(pipeline_error)?;
    to_json(&stats)
}

/// Pick the (newer, older) pair from a JSON array of capture metadata
#[wasm_bindgen]
pub fn select_captures(captures_json: &str, max_cloud_cover: f64) -> Result<String, JsValue> {
    let captures: Vec<CaptureMetadata> = parse(captures_json, "captures")?;
    let pair = select_capture_pair(captures, max_cloud_cover).map_err(pipeline_error)?;
    to_json(&pair)
}

/// Format an index the way reports show it, e.g. `"42%"`
#[wasm_bindgen]
pub fn format_risk_percentage(index: f64) -> String {
    RiskIndex(index).as_percentage_string()
}

#[wasm_bindgen]
pub fn wind_risk(avg_wind_mps: f64) -> f64 {
    wind_indicator(avg_wind_mps)
}

#[wasm_bindgen]
pub fn humidity_risk(avg_humidity_percent: f64) -> f64 {
    humidity_indicator(avg_humidity_percent)
}

#[wasm_bindgen]
pub fn rain_risk(avg_rain_mm: f64) -> f64 {
    rain_indicator(avg_rain_mm)
}

#[wasm_bindgen]
pub fn temperature_risk(avg_temperature_celsius: f64) -> f64 {
    temperature_indicator(avg_temperature_celsius)
}

#[wasm_bindgen]
pub fn sunlight_risk(avg_uv_index: f64) -> f64 {
    sunlight_indicator(avg_uv_index)
}

/// Beaufort bucket of a wind speed
#[wasm_bindgen]
pub fn beaufort_class(avg_wind_mps: f64) -> usize {
    classification_index(avg_wind_mps, &BEAUFORT_SCALE)
}

/// Validate a cloud cover ceiling before querying
#[wasm_bindgen]
pub fn is_valid_cloud_cover_ceiling(ceiling: f64) -> bool {
    validate_cloud_cover_ceiling(ceiling).is_ok()
}
