//! Configuration management for the FireWatch risk service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with FIREWATCH_ prefix

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::BandSelection;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Satellite imagery catalog configuration
    pub imagery: ImageryConfig,

    /// Weather API configuration
    pub weather: WeatherConfig,

    /// Color clustering and risk analysis parameters
    pub analysis: AnalysisConfig,

    /// Where run artifacts are written
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageryConfig {
    /// STAC API root
    pub api_endpoint: String,

    /// Collection searched for captures
    pub collection: String,

    /// Item asset holding the NPY export of the RGB bands
    pub asset_key: String,

    /// Optional key sent as `x-api-key`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Captures at or above this cloud cover percentage are ignored
    pub max_cloud_cover: f64,

    /// Most recent usable captures kept from a search
    pub max_items: usize,

    pub request_timeout_secs: u64,

    /// Upper bound on one raster download including every retry
    pub fetch_timeout_secs: u64,

    /// Retries on transient download failures
    pub max_retries: u32,

    /// First retry delay; doubled on every subsequent attempt
    pub backoff_base_ms: u64,
}

impl ImageryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    /// Weather API endpoint
    pub api_endpoint: String,

    /// Weather API key
    pub api_key: String,

    pub request_timeout_secs: u64,
}

impl WeatherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Number of dominant colors per raster
    pub cluster_count: usize,

    /// Side of the square working raster used for clustering
    pub working_size: u32,

    /// Seed for k-means initialization
    pub seed: u64,

    pub max_iterations: usize,

    /// Stop when no centroid moves more than this (in 0-255 units)
    pub tolerance: f64,

    /// Half-width of the area of interest in degrees
    pub area_margin_degrees: f64,

    pub red_band: usize,
    pub green_band: usize,
    pub blue_band: usize,
}

impl AnalysisConfig {
    pub fn band_selection(&self) -> BandSelection {
        BandSelection {
            red: self.red_band,
            green: self.green_band,
            blue: self.blue_band,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cluster_count: shared::DEFAULT_CLUSTER_COUNT,
            working_size: 200,
            seed: 0,
            max_iterations: 300,
            tolerance: 1e-4,
            area_margin_degrees: shared::DEFAULT_AREA_MARGIN_DEGREES,
            red_band: 0,
            green_band: 1,
            blue_band: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    /// When set, normalized rasters of every run are saved here as PNG
    #[serde(default)]
    pub artifacts_folder: Option<String>,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("FIREWATCH_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default(
                "imagery.api_endpoint",
                "https://planetarycomputer.microsoft.com/api/stac/v1",
            )?
            .set_default("imagery.collection", "landsat-c2-l2")?
            .set_default("imagery.asset_key", "rgb_npy")?
            .set_default("imagery.max_cloud_cover", shared::DEFAULT_CLOUD_COVER_CEILING)?
            .set_default("imagery.max_items", 100)?
            .set_default("imagery.request_timeout_secs", 30)?
            .set_default("imagery.fetch_timeout_secs", 300)?
            .set_default("imagery.max_retries", 5)?
            .set_default("imagery.backoff_base_ms", 100)?
            .set_default(
                "weather.api_endpoint",
                "https://api.openweathermap.org/data/3.0/onecall",
            )?
            .set_default("weather.request_timeout_secs", 10)?
            .set_default("analysis.cluster_count", 3)?
            .set_default("analysis.working_size", 200)?
            .set_default("analysis.seed", 0)?
            .set_default("analysis.max_iterations", 300)?
            .set_default("analysis.tolerance", 1e-4)?
            .set_default("analysis.area_margin_degrees", 0.1)?
            .set_default("analysis.red_band", 0)?
            .set_default("analysis.green_band", 1)?
            .set_default("analysis.blue_band", 2)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (FIREWATCH_ prefix)
            .add_source(
                Environment::with_prefix("FIREWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        shared::validate_cloud_cover_ceiling(self.imagery.max_cloud_cover)
            .map_err(|e| ConfigError::Message(format!("imagery.max_cloud_cover: {}", e)))?;
        shared::validate_cluster_count(self.analysis.cluster_count)
            .map_err(|e| ConfigError::Message(format!("analysis.cluster_count: {}", e)))?;
        shared::validate_working_size(self.analysis.working_size)
            .map_err(|e| ConfigError::Message(format!("analysis.working_size: {}", e)))?;
        if self.weather.api_key.trim().is_empty() {
            return Err(ConfigError::Message("weather.api_key is required".to_string()));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
