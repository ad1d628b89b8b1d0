//! Pipeline services of the FireWatch risk platform

pub mod capture;
pub mod clustering;
pub mod pipeline;
pub mod raster;
pub mod risk;
pub mod weather;

pub use capture::CaptureSelector;
pub use clustering::{ColorClusterAnalyzer, KmeansParams};
pub use pipeline::{PipelineSettings, RasterPreviews, RiskPipeline, RiskRun, RunOptions};
pub use raster::{ArtifactWriter, RasterNormalizer};
pub use risk::RiskAggregator;
pub use weather::{ForecastSummary, WeatherSummarizer};
