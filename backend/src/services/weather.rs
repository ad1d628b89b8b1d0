//! Weather forecast retrieval and summarization

use std::sync::Arc;
use std::time::Duration;

use shared::{
    Coordinate, DailyForecast, PipelineError, PipelineResult, PipelineStage, WeatherStats,
};

use crate::external::ForecastSource;

/// Daily series together with its summary
#[derive(Debug, Clone)]
pub struct ForecastSummary {
    pub days: Vec<DailyForecast>,
    pub stats: WeatherStats,
}

/// Fetches a forecast and reduces it to representative statistics
#[derive(Clone)]
pub struct WeatherSummarizer {
    source: Arc<dyn ForecastSource>,
    timeout: Duration,
}

impl WeatherSummarizer {
    pub fn new(source: Arc<dyn ForecastSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Daily forecast, bounded by the configured timeout
    pub async fn forecast(&self, location: &Coordinate) -> PipelineResult<Vec<DailyForecast>> {
        tokio::time::timeout(self.timeout, self.source.daily_forecast(location))
            .await
            .map_err(|_| PipelineError::Timeout {
                stage: PipelineStage::Weather,
                operation: "weather forecast".to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| e.at_stage(PipelineStage::Weather))
    }

    pub async fn summarize(&self, location: &Coordinate) -> PipelineResult<ForecastSummary> {
        let days = self.forecast(location).await?;
        let stats = summarize(&days)?;
        Ok(ForecastSummary { days, stats })
    }
}

/// Means over the forecast window; an empty forecast is an error
pub fn summarize(days: &[DailyForecast]) -> PipelineResult<WeatherStats> {
    let stats = WeatherStats::summarize(days)?;
    tracing::info!(
        days = stats.days,
        avg_temperature = stats.avg_temperature,
        avg_humidity = stats.avg_humidity,
        avg_wind = stats.avg_wind,
        avg_rain = stats.avg_rain,
        avg_sunlight = stats.avg_sunlight,
        "Weather summarized"
    );
    Ok(stats)
}

/// CSV export of the daily series for chart rendering
pub fn forecast_csv(days: &[DailyForecast]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "date",
        "temperature_celsius",
        "humidity_percent",
        "wind_speed_mps",
        "rain_mm",
        "precipitation_probability",
        "uv_index",
    ])?;
    for day in days {
        writer.write_record([
            day.date.to_string(),
            day.temperature_celsius.to_string(),
            day.humidity_percent.to_string(),
            day.wind_speed_mps.to_string(),
            day.rain_mm.unwrap_or(0.0).to_string(),
            day.precipitation_probability.to_string(),
            day.uv_index.to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
