//! Weather forecast models and their summary statistics

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::types::Coordinate;

/// Daily forecast for a location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyForecast {
    pub date: NaiveDate,
    /// Day temperature in °C
    pub temperature_celsius: f64,
    pub humidity_percent: f64,
    pub wind_speed_mps: f64,
    /// Absent when no rain is expected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain_mm: Option<f64>,
    /// Probability of precipitation (0-1)
    pub precipitation_probability: f64,
    pub uv_index: f64,
}

/// Multi-day forecast for a location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherForecast {
    pub location: Coordinate,
    pub days: Vec<DailyForecast>,
}

/// Arithmetic means over the forecast window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeatherStats {
    pub avg_temperature: f64,
    pub avg_humidity: f64,
    pub avg_wind: f64,
    pub avg_rain: f64,
    /// Mean UV index
    pub avg_sunlight: f64,
    pub days: usize,
}

impl WeatherStats {
    /// Average every metric over all days; missing rain counts as 0 mm
    pub fn summarize(forecast: &[DailyForecast]) -> PipelineResult<Self> {
        if forecast.is_empty() {
            return Err(PipelineError::EmptyForecast);
        }

        let n = forecast.len() as f64;
        let mean = |metric: fn(&DailyForecast) -> f64| -> PipelineResult<f64> {
            let mut sum = 0.0;
            for day in forecast {
                let value = metric(day);
                if !value.is_finite() {
                    return Err(PipelineError::InvalidForecast(format!(
                        "non-finite value on {}",
                        day.date
                    )));
                }
                sum += value;
            }
            Ok(sum / n)
        };

        Ok(Self {
            avg_temperature: mean(|d| d.temperature_celsius)?,
            avg_humidity: mean(|d| d.humidity_percent)?,
            avg_wind: mean(|d| d.wind_speed_mps)?,
            avg_rain: mean(|d| d.rain_mm.unwrap_or(0.0))?,
            avg_sunlight: mean(|d| d.uv_index)?,
            days: forecast.len(),
        })
    }
}
