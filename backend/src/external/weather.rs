//! Weather API client for fetching daily forecasts
//!
//! Integrates with the OpenWeatherMap One Call API (daily block only)

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use shared::{Coordinate, DailyForecast, PipelineError, PipelineResult, PipelineStage};

use crate::config::WeatherConfig;
use crate::external::http::RetryingFetcher;

/// Anything that can produce a multi-day daily forecast for a coordinate
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn daily_forecast(&self, location: &Coordinate) -> PipelineResult<Vec<DailyForecast>>;
}

/// Weather API client
#[derive(Clone)]
pub struct WeatherClient {
    fetcher: RetryingFetcher,
    api_key: String,
    base_url: String,
}

/// One Call API response; only the daily block is requested
#[derive(Debug, Deserialize)]
struct OneCallResponse {
    #[serde(default)]
    daily: Vec<OneCallDaily>,
}

#[derive(Debug, Deserialize)]
struct OneCallDaily {
    dt: i64,
    temp: OneCallTemp,
    humidity: f64,
    wind_speed: f64,
    #[serde(default)]
    rain: Option<f64>,
    #[serde(default)]
    pop: f64,
    #[serde(default)]
    uvi: f64,
}

#[derive(Debug, Deserialize)]
struct OneCallTemp {
    day: f64,
}

impl WeatherClient {
    /// Create a new WeatherClient from configuration
    pub fn new(config: &WeatherConfig) -> PipelineResult<Self> {
        let fetcher = RetryingFetcher::new(
            "weather",
            PipelineStage::Weather,
            config.request_timeout(),
            2,
            std::time::Duration::from_millis(200),
        )?;
        Ok(Self {
            fetcher,
            api_key: config.api_key.clone(),
            base_url: config.api_endpoint.clone(),
        })
    }

    /// Create a new WeatherClient with custom base URL (for testing)
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> PipelineResult<Self> {
        let fetcher = RetryingFetcher::new(
            "weather",
            PipelineStage::Weather,
            std::time::Duration::from_secs(10),
            0,
            std::time::Duration::from_millis(100),
        )?;
        Ok(Self {
            fetcher,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }

    /// Query parameters of a forecast request, key last
    fn forecast_query(&self, location: &Coordinate) -> Vec<(&'static str, String)> {
        vec![
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("exclude", "current,minutely,hourly,alerts".to_string()),
            ("units", "metric".to_string()),
            ("appid", self.api_key.clone()),
        ]
    }

    /// Fetch the daily forecast by GPS coordinates
    pub async fn get_forecast(&self, location: &Coordinate) -> PipelineResult<Vec<DailyForecast>> {
        let request = self
            .fetcher
            .client()
            .get(&self.base_url)
            .query(&self.forecast_query(location));
        // Only the bare endpoint is ever logged
        let body = self
            .fetcher
            .send(request, &self.base_url)
            .await?
            .bytes()
            .await
            .map_err(|e| PipelineError::Upstream {
                stage: PipelineStage::Weather,
                service: "weather".to_string(),
                reason: format!("Failed to read forecast response: {}", e.without_url()),
            })?;

        let data: OneCallResponse = serde_json::from_slice(&body).map_err(|e| {
            PipelineError::InvalidForecast(format!("Failed to parse forecast response: {}", e))
        })?;

        let days = convert_daily(data)?;
        tracing::debug!(
            latitude = location.latitude,
            longitude = location.longitude,
            days = days.len(),
            "Fetched daily forecast"
        );
        Ok(days)
    }
}

#[async_trait]
impl ForecastSource for WeatherClient {
    async fn daily_forecast(&self, location: &Coordinate) -> PipelineResult<Vec<DailyForecast>> {
        self.get_forecast(location).await
    }
}

/// Convert the One Call daily block to our format
fn convert_daily(data: OneCallResponse) -> PipelineResult<Vec<DailyForecast>> {
    data.daily
        .into_iter()
        .map(|day| {
            let date = day_of(day.dt).ok_or_else(|| {
                PipelineError::InvalidForecast(format!("invalid forecast timestamp {}", day.dt))
            })?;
            let forecast = DailyForecast {
                date,
                temperature_celsius: day.temp.day,
                humidity_percent: day.humidity,
                wind_speed_mps: day.wind_speed,
                rain_mm: day.rain,
                precipitation_probability: day.pop,
                uv_index: day.uvi,
            };
            shared::validate_forecast_day(&forecast).map_err(|e| {
                PipelineError::InvalidForecast(format!("{} on {}", e, forecast.date))
            })?;
            Ok(forecast)
        })
        .collect()
}

fn day_of(unix_seconds: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(unix_seconds, 0).map(|dt| dt.date_naive())
}
