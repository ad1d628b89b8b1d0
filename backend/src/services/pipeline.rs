//! End-to-end risk run for one coordinate.
//!
//! coordinate → capture pair → two rasters → two cluster lists, and in
//! parallel coordinate → forecast → weather stats; both joined into the
//! risk index. Any stage failure aborts the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use shared::{
    AreaOfInterest, ColorCluster, Coordinate, NormalizedRaster, PipelineError, PipelineResult,
    PipelineStage, RawCapture, RiskAssessment,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{AnalysisConfig, Config};
use crate::external::{CaptureHandle, ForecastSource, ImagerySource};
use crate::services::capture::CaptureSelector;
use crate::services::clustering::ColorClusterAnalyzer;
use crate::services::raster::{preview_base64, ArtifactWriter, RasterNormalizer};
use crate::services::risk::RiskAggregator;
use crate::services::weather::{self, WeatherSummarizer};

/// Tunables of a pipeline, usually taken from [`Config`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cloud_cover_ceiling: f64,
    pub fetch_timeout: Duration,
    pub weather_timeout: Duration,
    pub analysis: AnalysisConfig,
    pub artifacts_folder: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cloud_cover_ceiling: config.imagery.max_cloud_cover,
            fetch_timeout: config.imagery.fetch_timeout(),
            weather_timeout: config.weather.request_timeout(),
            analysis: config.analysis.clone(),
            artifacts_folder: config.output.artifacts_folder.as_ref().map(PathBuf::from),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            cloud_cover_ceiling: shared::DEFAULT_CLOUD_COVER_CEILING,
            fetch_timeout: Duration::from_secs(300),
            weather_timeout: Duration::from_secs(10),
            analysis: AnalysisConfig::default(),
            artifacts_folder: None,
        }
    }
}

/// Per-run overrides
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub cloud_cover_ceiling: Option<f64>,
    pub include_previews: bool,
}

/// Base64 PNGs of both normalized rasters
#[derive(Debug, Clone, Serialize)]
pub struct RasterPreviews {
    pub newer_png_base64: String,
    pub older_png_base64: String,
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct RiskRun {
    pub assessment: RiskAssessment,
    pub previews: Option<RasterPreviews>,
    pub artifacts: Vec<PathBuf>,
}

struct RasterAnalysis {
    newer_clusters: Vec<ColorCluster>,
    older_clusters: Vec<ColorCluster>,
    previews: Option<RasterPreviews>,
    artifacts: Vec<PathBuf>,
}

/// Orchestrates the five components over established collaborators.
///
/// The imagery source is expected to be connected already; building a
/// pipeline never performs network initialization.
#[derive(Clone)]
pub struct RiskPipeline {
    imagery: Arc<dyn ImagerySource>,
    selector: CaptureSelector,
    weather: WeatherSummarizer,
    normalizer: RasterNormalizer,
    analyzer: ColorClusterAnalyzer,
    aggregator: RiskAggregator,
    settings: PipelineSettings,
}

impl RiskPipeline {
    pub fn new(
        imagery: Arc<dyn ImagerySource>,
        forecasts: Arc<dyn ForecastSource>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            selector: CaptureSelector::new(imagery.clone()),
            imagery,
            weather: WeatherSummarizer::new(forecasts, settings.weather_timeout),
            normalizer: RasterNormalizer::new(settings.analysis.band_selection()),
            analyzer: ColorClusterAnalyzer::from_config(&settings.analysis),
            aggregator: RiskAggregator::new(settings.analysis.cluster_count),
            settings,
        }
    }

    pub fn weather(&self) -> &WeatherSummarizer {
        &self.weather
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Compute the risk index for `location`
    pub async fn run(&self, location: Coordinate, options: RunOptions) -> PipelineResult<RiskRun> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "risk_run",
            %run_id,
            latitude = location.latitude,
            longitude = location.longitude
        );
        self.run_inner(run_id, location, options).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        location: Coordinate,
        options: RunOptions,
    ) -> PipelineResult<RiskRun> {
        let ceiling = options
            .cloud_cover_ceiling
            .unwrap_or(self.settings.cloud_cover_ceiling);
        shared::validate_cloud_cover_ceiling(ceiling)
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;

        let area = AreaOfInterest::around(location, self.settings.analysis.area_margin_degrees);
        tracing::info!(bbox = ?area.bbox(), ceiling, "Starting risk run");

        let (newer, older) = self.selector.select(&area, ceiling).await?;

        let (newer_raw, older_raw, days) = tokio::try_join!(
            self.fetch(&newer),
            self.fetch(&older),
            self.weather.forecast(&location),
        )?;
        let stats = weather::summarize(&days)?;

        let computed_at = Utc::now();
        let analysis = self
            .analyze_rasters(
                run_id,
                location,
                computed_at,
                newer_raw,
                older_raw,
                options.include_previews,
            )
            .await?;

        let (indicators, risk_index) = self.aggregator.assess(
            &analysis.newer_clusters,
            &analysis.older_clusters,
            &stats,
        )?;

        tracing::info!(
            risk = risk_index.value(),
            percentage = %risk_index.as_percentage_string(),
            "Risk run complete"
        );

        Ok(RiskRun {
            assessment: RiskAssessment {
                run_id,
                coordinate: location,
                area_of_interest: area,
                newer_capture: newer.metadata,
                older_capture: older.metadata,
                newer_clusters: analysis.newer_clusters,
                older_clusters: analysis.older_clusters,
                weather: stats,
                indicators,
                risk_percentage: risk_index.as_percentage_string(),
                risk_index,
                computed_at,
            },
            previews: analysis.previews,
            artifacts: analysis.artifacts,
        })
    }

    async fn fetch(&self, handle: &CaptureHandle) -> PipelineResult<RawCapture> {
        let timeout = self.settings.fetch_timeout;
        tokio::time::timeout(timeout, self.imagery.fetch_raster(handle))
            .await
            .map_err(|_| PipelineError::Timeout {
                stage: PipelineStage::RasterFetch,
                operation: format!("raster download {}", handle.metadata.id),
                secs: timeout.as_secs(),
            })?
            .map_err(|e| e.at_stage(PipelineStage::RasterFetch))
    }

    /// Normalization and clustering are CPU-bound and run off the async workers
    async fn analyze_rasters(
        &self,
        run_id: Uuid,
        location: Coordinate,
        computed_at: chrono::DateTime<Utc>,
        newer: RawCapture,
        older: RawCapture,
        include_previews: bool,
    ) -> PipelineResult<RasterAnalysis> {
        let normalizer = self.normalizer;
        let analyzer = self.analyzer.clone();
        let writer = self.settings.artifacts_folder.as_ref().map(ArtifactWriter::new);

        tokio::task::spawn_blocking(move || -> PipelineResult<RasterAnalysis> {
            let newer_raster = normalizer.normalize(&newer)?;
            let older_raster = normalizer.normalize(&older)?;

            let newer_clusters = analyzer.analyze(&newer_raster)?;
            let older_clusters = analyzer.analyze(&older_raster)?;

            let previews = if include_previews {
                Some(encode_previews(&newer_raster, &older_raster)?)
            } else {
                None
            };

            let artifacts = match writer {
                Some(writer) => writer.save(
                    run_id,
                    &location,
                    computed_at,
                    &[&newer_raster, &older_raster],
                )?,
                None => Vec::new(),
            };

            Ok(RasterAnalysis {
                newer_clusters,
                older_clusters,
                previews,
                artifacts,
            })
        })
        .await
        .map_err(|e| PipelineError::Upstream {
            stage: PipelineStage::Clustering,
            service: "analysis worker".to_string(),
            reason: e.to_string(),
        })?
    }
}

fn encode_previews(
    newer: &NormalizedRaster,
    older: &NormalizedRaster,
) -> PipelineResult<RasterPreviews> {
    Ok(RasterPreviews {
        newer_png_base64: preview_base64(newer)?,
        older_png_base64: preview_base64(older)?,
    })
}
