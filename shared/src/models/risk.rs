//! Wildfire risk indicators and their aggregation into one index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Channel, PipelineError, PipelineResult};
use crate::models::{CaptureMetadata, ColorCluster, WeatherStats};
use crate::types::{AreaOfInterest, Coordinate};

/// Beaufort scale upper bounds in m/s
pub const BEAUFORT_SCALE: [f64; 12] = [
    0.5, 1.5, 3.3, 5.5, 7.9, 10.7, 13.8, 17.1, 20.7, 24.4, 28.4, 32.6,
];

/// Rainfall classification bounds in mm
pub const RAINFALL_CLASSIFICATION: [f64; 4] = [10.0, 35.5, 64.4, 124.4];

/// Temperature classification bounds in °C
pub const TEMPERATURE_CLASSIFICATION: [f64; 8] = [4.1, 8.0, 13.0, 18.0, 23.0, 29.0, 35.0, 41.0];

/// UV index treated as full sunlight exposure
pub const UV_INDEX_EXTREME: f64 = 11.0;

/// Position of `value` among ascending `thresholds`.
///
/// The index of the first threshold the value is strictly below, or
/// `thresholds.len()` when it reaches or exceeds all of them.
pub fn classification_index(value: f64, thresholds: &[f64]) -> usize {
    thresholds
        .iter()
        .position(|&threshold| value < threshold)
        .unwrap_or(thresholds.len())
}

/// Vegetation browning proxy between matching cluster ranks.
///
/// `(1 + (rA - rB) / rB) * (1 + (gB - gA) / gA)` with A the newer capture.
pub fn dryness(rank: usize, newer: &ColorCluster, older: &ColorCluster) -> PipelineResult<f64> {
    let (r_a, g_a) = (newer.red() as f64, newer.green() as f64);
    let (r_b, g_b) = (older.red() as f64, older.green() as f64);

    if r_b == 0.0 {
        return Err(PipelineError::DegenerateCluster {
            rank,
            channel: Channel::Red,
        });
    }
    if g_a == 0.0 {
        return Err(PipelineError::DegenerateCluster {
            rank,
            channel: Channel::Green,
        });
    }

    Ok((1.0 + (r_a - r_b) / r_b) * (1.0 + (g_b - g_a) / g_a))
}

/// `(bucket + 1) / 12` over the Beaufort scale
pub fn wind_indicator(avg_wind_mps: f64) -> f64 {
    let bucket = classification_index(avg_wind_mps, &BEAUFORT_SCALE);
    (bucket + 1) as f64 / BEAUFORT_SCALE.len() as f64
}

/// Higher humidity lowers risk
pub fn humidity_indicator(avg_humidity_percent: f64) -> f64 {
    1.0 - avg_humidity_percent / 100.0
}

/// `1 - bucket / 4` over the rainfall classification
pub fn rain_indicator(avg_rain_mm: f64) -> f64 {
    let bucket = classification_index(avg_rain_mm, &RAINFALL_CLASSIFICATION);
    1.0 - bucket as f64 / RAINFALL_CLASSIFICATION.len() as f64
}

/// `(bucket + 1) / 8` over the temperature classification
pub fn temperature_indicator(avg_temperature_celsius: f64) -> f64 {
    let bucket = classification_index(avg_temperature_celsius, &TEMPERATURE_CLASSIFICATION);
    (bucket + 1) as f64 / TEMPERATURE_CLASSIFICATION.len() as f64
}

pub fn sunlight_indicator(avg_uv_index: f64) -> f64 {
    avg_uv_index / UV_INDEX_EXTREME
}

/// Every factor of the risk product, recomputed for each run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskIndicators {
    /// One entry per cluster rank
    pub dryness: Vec<f64>,
    pub wind: f64,
    pub humidity: f64,
    pub rain: f64,
    pub temp: f64,
    pub sunlight: f64,
}

impl RiskIndicators {
    /// Derive indicators from both ranked cluster lists and the weather summary.
    ///
    /// `newer` and `older` must have the same length.
    pub fn compute(
        newer: &[ColorCluster],
        older: &[ColorCluster],
        stats: &WeatherStats,
    ) -> PipelineResult<Self> {
        if newer.len() != older.len() {
            return Err(PipelineError::ClusterCountMismatch {
                newer: newer.len(),
                older: older.len(),
            });
        }

        let per_rank = newer
            .iter()
            .zip(older)
            .enumerate()
            .map(|(rank, (a, b))| dryness(rank, a, b))
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(Self {
            dryness: per_rank,
            wind: wind_indicator(stats.avg_wind),
            humidity: humidity_indicator(stats.avg_humidity),
            rain: rain_indicator(stats.avg_rain),
            temp: temperature_indicator(stats.avg_temperature),
            sunlight: sunlight_indicator(stats.avg_sunlight),
        })
    }

    /// Product of the per-rank dryness values
    pub fn dryness_factor(&self) -> f64 {
        self.dryness.iter().product()
    }

    pub fn risk_index(&self) -> RiskIndex {
        RiskIndex(
            self.dryness_factor()
                * self.wind
                * self.humidity
                * self.rain
                * self.temp
                * self.sunlight,
        )
    }
}

/// Final output of the pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(transparent)]
pub struct RiskIndex(pub f64);

impl RiskIndex {
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Rounded percentage as shown on reports, e.g. `"42%"`
    pub fn as_percentage_string(&self) -> String {
        format!("{}%", (self.0 * 100.0).round())
    }
}

impl std::fmt::Display for RiskIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_percentage_string())
    }
}

/// Combine cluster drift and weather into the risk index
pub fn aggregate(
    newer: &[ColorCluster],
    older: &[ColorCluster],
    stats: &WeatherStats,
) -> PipelineResult<RiskIndex> {
    Ok(RiskIndicators::compute(newer, older, stats)?.risk_index())
}

/// Everything produced for one coordinate, consumed by report builders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub run_id: Uuid,
    pub coordinate: Coordinate,
    pub area_of_interest: AreaOfInterest,
    pub newer_capture: CaptureMetadata,
    pub older_capture: CaptureMetadata,
    pub newer_clusters: Vec<ColorCluster>,
    pub older_clusters: Vec<ColorCluster>,
    pub weather: WeatherStats,
    pub indicators: RiskIndicators,
    pub risk_index: RiskIndex,
    pub risk_percentage: String,
    pub computed_at: DateTime<Utc>,
}
