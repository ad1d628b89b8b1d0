//! Pipeline and HTTP surface tests
//!
//! Full risk runs over in-memory imagery and forecast sources:
//! - Successful run and its assessment
//! - Every failure path aborting the run
//! - Router responses and error mapping

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{NaiveDate, TimeZone, Utc};
use shared::{
    AreaOfInterest, CaptureMetadata, Channel, Coordinate, DailyForecast, PipelineError,
    PipelineResult, PipelineStage, RawCapture,
};
use tower::ServiceExt;
use wildfire_risk_backend::config::{
    AnalysisConfig, Config, ImageryConfig, OutputConfig, ServerConfig, WeatherConfig,
};
use wildfire_risk_backend::external::{CaptureHandle, ForecastSource, ImagerySource};
use wildfire_risk_backend::services::{PipelineSettings, RiskPipeline, RunOptions};
use wildfire_risk_backend::{create_app, AppState};

// ============================================================================
// Test Sources
// ============================================================================

const NEWER_COLORS: [[u8; 3]; 3] = [[150, 100, 60], [200, 170, 120], [60, 80, 160]];
const OLDER_COLORS: [[u8; 3]; 3] = [[120, 120, 60], [190, 175, 120], [60, 80, 160]];

/// Raw sample that normalizes to exactly `channel`
fn raw_sample(channel: u8) -> f64 {
    let reflectance = (channel as f64 + 0.5) / 255.0 * 0.3;
    (reflectance + 0.2) / 2.75e-5
}

/// 30x30 capture split into vertical bands covering 50%, 30% and 20%
fn raw_capture(metadata: CaptureMetadata, colors: [[u8; 3]; 3], bands: usize) -> RawCapture {
    let (width, height) = (30, 30);
    let mut data = Vec::with_capacity(width * height * bands);
    for _y in 0..height {
        for x in 0..width {
            let rgb = match x {
                0..=14 => colors[0],
                15..=23 => colors[1],
                _ => colors[2],
            };
            for b in 0..bands {
                data.push(raw_sample(rgb[b.min(2)]));
            }
        }
    }
    RawCapture::new(metadata, width, height, bands, data).unwrap()
}

fn capture(id: &str, day: u32, cloud: f64) -> CaptureMetadata {
    CaptureMetadata::new(id, Utc.with_ymd_and_hms(2022, 7, day, 18, 40, 0).unwrap(), cloud)
}

#[derive(Clone)]
struct StubImagery {
    items: Vec<(CaptureHandle, RawCapture)>,
    fetch_error: Option<PipelineError>,
    fetch_delay: Option<Duration>,
}

impl StubImagery {
    fn new(entries: Vec<(CaptureMetadata, [[u8; 3]; 3])>) -> Self {
        let items = entries
            .into_iter()
            .map(|(metadata, colors)| {
                let handle = CaptureHandle {
                    href: format!("memory://{}", metadata.id),
                    metadata: metadata.clone(),
                };
                (handle, raw_capture(metadata, colors, 3))
            })
            .collect();
        Self {
            items,
            fetch_error: None,
            fetch_delay: None,
        }
    }

    fn two_dates() -> Self {
        Self::new(vec![
            (capture("LC09_NEW", 20, 4.0), NEWER_COLORS),
            (capture("LC08_OLD", 4, 12.0), OLDER_COLORS),
            (capture("LC08_OLDEST", 1, 2.0), OLDER_COLORS),
        ])
    }
}

#[async_trait]
impl ImagerySource for StubImagery {
    async fn query(
        &self,
        _area: &AreaOfInterest,
        max_cloud_cover: f64,
    ) -> PipelineResult<Vec<CaptureHandle>> {
        Ok(self
            .items
            .iter()
            .map(|(handle, _)| handle.clone())
            .filter(|h| h.metadata.cloud_cover_percent < max_cloud_cover)
            .collect())
    }

    async fn fetch_raster(&self, handle: &CaptureHandle) -> PipelineResult<RawCapture> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.fetch_error {
            return Err(err.clone());
        }
        self.items
            .iter()
            .find(|(h, _)| h.href == handle.href)
            .map(|(_, raw)| raw.clone())
            .ok_or_else(|| PipelineError::Upstream {
                stage: PipelineStage::RasterFetch,
                service: "imagery".to_string(),
                reason: "unknown handle".to_string(),
            })
    }
}

struct StubForecast {
    days: Vec<DailyForecast>,
    error: Option<PipelineError>,
    delay: Option<Duration>,
}

impl StubForecast {
    fn hot_and_dry() -> Self {
        let days = (1..=8)
            .map(|d| DailyForecast {
                date: NaiveDate::from_ymd_opt(2022, 7, d).unwrap(),
                temperature_celsius: 31.0,
                humidity_percent: 25.0,
                wind_speed_mps: 6.0,
                rain_mm: None,
                precipitation_probability: 0.0,
                uv_index: 9.5,
            })
            .collect();
        Self {
            days,
            error: None,
            delay: None,
        }
    }
}

#[async_trait]
impl ForecastSource for StubForecast {
    async fn daily_forecast(&self, _location: &Coordinate) -> PipelineResult<Vec<DailyForecast>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(self.days.clone())
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        analysis: AnalysisConfig {
            working_size: 30,
            seed: 11,
            ..AnalysisConfig::default()
        },
        ..PipelineSettings::default()
    }
}

fn pipeline(imagery: StubImagery, forecast: StubForecast) -> RiskPipeline {
    RiskPipeline::new(Arc::new(imagery), Arc::new(forecast), settings())
}

fn location() -> Coordinate {
    Coordinate::new(38.5, -122.4).unwrap()
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_run() {
        let run = pipeline(StubImagery::two_dates(), StubForecast::hot_and_dry())
            .run(location(), RunOptions::default())
            .await
            .unwrap();
        let assessment = run.assessment;

        assert_eq!(assessment.newer_capture.id, "LC09_NEW");
        assert_eq!(assessment.older_capture.id, "LC08_OLD");
        assert_eq!(assessment.newer_clusters.len(), 3);
        assert_eq!(assessment.older_clusters.len(), 3);
        assert_eq!(assessment.newer_clusters[0].rgb, NEWER_COLORS[0]);
        assert_eq!(assessment.older_clusters[0].rgb, OLDER_COLORS[0]);
        assert_eq!(assessment.indicators.dryness.len(), 3);
        assert_eq!(assessment.weather.days, 8);

        let expected = shared::aggregate(
            &assessment.newer_clusters,
            &assessment.older_clusters,
            &assessment.weather,
        )
        .unwrap();
        assert_eq!(assessment.risk_index, expected);
        assert!(assessment.risk_index.value() > 0.0);
        assert_eq!(assessment.risk_percentage, expected.as_percentage_string());
        assert!(assessment.area_of_interest.contains(&location()));
        assert!(run.previews.is_none());
        assert!(run.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_previews_on_request() {
        let run = pipeline(StubImagery::two_dates(), StubForecast::hot_and_dry())
            .run(
                location(),
                RunOptions {
                    include_previews: true,
                    ..RunOptions::default()
                },
            )
            .await
            .unwrap();
        let previews = run.previews.unwrap();
        assert!(!previews.newer_png_base64.is_empty());
        assert_ne!(previews.newer_png_base64, previews.older_png_base64);
    }

    #[tokio::test]
    async fn test_repeated_runs_agree() {
        let pipeline = pipeline(StubImagery::two_dates(), StubForecast::hot_and_dry());
        let first = pipeline.run(location(), RunOptions::default()).await.unwrap();
        let second = pipeline.run(location(), RunOptions::default()).await.unwrap();
        assert_eq!(first.assessment.risk_index, second.assessment.risk_index);
        assert_ne!(first.assessment.run_id, second.assessment.run_id);
    }

    #[tokio::test]
    async fn test_single_capture_is_insufficient() {
        let imagery = StubImagery::new(vec![(capture("ONLY", 20, 4.0), NEWER_COLORS)]);
        let err = pipeline(imagery, StubForecast::hot_and_dry())
            .run(location(), RunOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::InsufficientImagery { found: 1 });
        assert_eq!(err.stage(), PipelineStage::CaptureSelection);
    }

    #[tokio::test]
    async fn test_stricter_ceiling_drops_captures() {
        let err = pipeline(StubImagery::two_dates(), StubForecast::hot_and_dry())
            .run(
                location(),
                RunOptions {
                    cloud_cover_ceiling: Some(3.0),
                    ..RunOptions::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::InsufficientImagery { found: 1 });
    }

    #[tokio::test]
    async fn test_invalid_ceiling_rejected() {
        let err = pipeline(StubImagery::two_dates(), StubForecast::hot_and_dry())
            .run(
                location(),
                RunOptions {
                    cloud_cover_ceiling: Some(0.0),
                    ..RunOptions::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_transient_fetch_failure_propagates() {
        let mut imagery = StubImagery::two_dates();
        imagery.fetch_error = Some(PipelineError::TransientFetch {
            stage: PipelineStage::RasterFetch,
            url: "memory://LC09_NEW".to_string(),
            attempts: 6,
            reason: "HTTP 503".to_string(),
        });
        let err = pipeline(imagery, StubForecast::hot_and_dry())
            .run(location(), RunOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.stage(), PipelineStage::RasterFetch);
    }

    #[tokio::test]
    async fn test_slow_download_times_out() {
        let mut imagery = StubImagery::two_dates();
        imagery.fetch_delay = Some(Duration::from_secs(5));
        let pipeline = RiskPipeline::new(
            Arc::new(imagery),
            Arc::new(StubForecast::hot_and_dry()),
            PipelineSettings {
                fetch_timeout: Duration::from_millis(20),
                ..settings()
            },
        );
        let err = pipeline.run(location(), RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { .. }));
        assert_eq!(err.stage(), PipelineStage::RasterFetch);
    }

    #[tokio::test]
    async fn test_weather_outage_reports_weather_stage() {
        let mut forecast = StubForecast::hot_and_dry();
        // The shared fetcher labels its failures as raster downloads by default
        forecast.error = Some(PipelineError::TransientFetch {
            stage: PipelineStage::RasterFetch,
            url: "https://weather.invalid/onecall".to_string(),
            attempts: 6,
            reason: "HTTP 503".to_string(),
        });
        let err = pipeline(StubImagery::two_dates(), forecast)
            .run(location(), RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TransientFetch { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.stage(), PipelineStage::Weather);
    }

    #[tokio::test]
    async fn test_slow_forecast_times_out_in_weather_stage() {
        let mut forecast = StubForecast::hot_and_dry();
        forecast.delay = Some(Duration::from_secs(5));
        let pipeline = RiskPipeline::new(
            Arc::new(StubImagery::two_dates()),
            Arc::new(forecast),
            PipelineSettings {
                weather_timeout: Duration::from_millis(20),
                ..settings()
            },
        );
        let err = pipeline.run(location(), RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { .. }));
        assert_eq!(err.stage(), PipelineStage::Weather);
    }

    #[tokio::test]
    async fn test_two_band_capture_is_malformed() {
        let mut imagery = StubImagery::two_dates();
        for (handle, raw) in imagery.items.iter_mut() {
            *raw = raw_capture(handle.metadata.clone(), NEWER_COLORS, 2);
        }
        let err = pipeline(imagery, StubForecast::hot_and_dry())
            .run(location(), RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRaster(_)));
    }

    #[tokio::test]
    async fn test_empty_forecast_aborts_run() {
        let forecast = StubForecast {
            days: Vec::new(),
            error: None,
            delay: None,
        };
        let err = pipeline(StubImagery::two_dates(), forecast)
            .run(location(), RunOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::EmptyForecast);
    }

    #[tokio::test]
    async fn test_black_older_cluster_is_degenerate() {
        let older = [[0, 0, 0], [190, 175, 120], [60, 80, 160]];
        let imagery = StubImagery::new(vec![
            (capture("NEW", 20, 4.0), NEWER_COLORS),
            (capture("OLD", 4, 12.0), older),
        ]);
        let err = pipeline(imagery, StubForecast::hot_and_dry())
            .run(location(), RunOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::DegenerateCluster {
                rank: 0,
                channel: Channel::Red
            }
        );
    }
}

// ============================================================================
// Router Tests
// ============================================================================

#[cfg(test)]
mod router_tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            environment: "test".to_string(),
            server: ServerConfig::default(),
            imagery: ImageryConfig {
                api_endpoint: "http://localhost:9000".to_string(),
                collection: "landsat-c2-l2".to_string(),
                asset_key: "rgb_npy".to_string(),
                api_key: None,
                max_cloud_cover: 55.0,
                max_items: 100,
                request_timeout_secs: 30,
                fetch_timeout_secs: 300,
                max_retries: 5,
                backoff_base_ms: 100,
            },
            weather: WeatherConfig {
                api_endpoint: "http://localhost:9001".to_string(),
                api_key: "test".to_string(),
                request_timeout_secs: 10,
            },
            analysis: AnalysisConfig::default(),
            output: OutputConfig::default(),
        }
    }

    fn app(imagery: StubImagery) -> axum::Router {
        create_app(AppState {
            config: Arc::new(test_config()),
            pipeline: Arc::new(pipeline(imagery, StubForecast::hot_and_dry())),
            imagery_session: None,
        })
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(app(StubImagery::two_dates()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["environment"], "test");
        assert!(body["imagery"].is_null());
    }

    #[tokio::test]
    async fn test_risk_endpoint() {
        let (status, body) = get(
            app(StubImagery::two_dates()),
            "/api/v1/risk?latitude=38.5&longitude=-122.4",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["newer_capture"]["id"], "LC09_NEW");
        assert!(body["risk_percentage"].as_str().unwrap().ends_with('%'));
        assert_eq!(body["newer_clusters"].as_array().unwrap().len(), 3);
        assert!(body.get("previews").is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_latitude_is_bad_request() {
        let (status, body) = get(
            app(StubImagery::two_dates()),
            "/api/v1/risk?latitude=120&longitude=0",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_insufficient_imagery_is_unprocessable() {
        let imagery = StubImagery::new(vec![(capture("ONLY", 20, 4.0), NEWER_COLORS)]);
        let (status, body) = get(app(imagery), "/api/v1/risk?latitude=38.5&longitude=-122.4").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let body = json(&body);
        assert_eq!(body["error"]["stage"], "capture_selection");
        assert_eq!(body["error"]["retryable"], false);
    }

    #[tokio::test]
    async fn test_weather_summary() {
        let (status, body) = get(
            app(StubImagery::two_dates()),
            "/api/v1/weather/summary?latitude=38.5&longitude=-122.4",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["stats"]["avg_temperature"], 31.0);
        assert_eq!(body["days"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_forecast_csv_export() {
        let response = app(StubImagery::two_dates())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/weather/forecast.csv?latitude=38.5&longitude=-122.4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/csv");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&body).lines().count(), 9);
    }
}
