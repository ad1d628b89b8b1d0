//! Error taxonomy for the risk-estimation pipeline
//!
//! Every failure aborts the current coordinate's run. There is no partial
//! result: a risk index is either fully computed or not produced at all.

use serde::Serialize;
use thiserror::Error;

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Input,
    CaptureSelection,
    RasterFetch,
    Normalization,
    Clustering,
    Weather,
    Aggregation,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Input => write!(f, "input"),
            PipelineStage::CaptureSelection => write!(f, "capture_selection"),
            PipelineStage::RasterFetch => write!(f, "raster_fetch"),
            PipelineStage::Normalization => write!(f, "normalization"),
            PipelineStage::Clustering => write!(f, "clustering"),
            PipelineStage::Weather => write!(f, "weather"),
            PipelineStage::Aggregation => write!(f, "aggregation"),
        }
    }
}

/// Which color channel of a cluster made a dryness ratio undefined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Red,
    Green,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Red => write!(f, "red"),
            Channel::Green => write!(f, "green"),
        }
    }
}

/// Pipeline error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Could not find enough images for further analysis ({found} < 2 distinct dates)")]
    InsufficientImagery { found: usize },

    #[error("Transient failure fetching {url} after {attempts} attempt(s): {reason}")]
    TransientFetch {
        stage: PipelineStage,
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Malformed raster: {0}")]
    MalformedRaster(String),

    #[error("Forecast contains no days")]
    EmptyForecast,

    #[error("Invalid forecast: {0}")]
    InvalidForecast(String),

    #[error("Cluster rank {rank} has a zero {channel} channel, dryness ratio is undefined")]
    DegenerateCluster { rank: usize, channel: Channel },

    #[error("Cluster lists differ in length (newer: {newer}, older: {older})")]
    ClusterCountMismatch { newer: usize, older: usize },

    #[error("Expected {expected} clusters per capture, got {newer} newer and {older} older")]
    UnexpectedClusterCount {
        expected: usize,
        newer: usize,
        older: usize,
    },

    #[error("{operation} timed out after {secs}s")]
    Timeout {
        stage: PipelineStage,
        operation: String,
        secs: u64,
    },

    #[error("{service} error: {reason}")]
    Upstream {
        stage: PipelineStage,
        service: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    /// The stage this failure aborted
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::InsufficientImagery { .. } => PipelineStage::CaptureSelection,
            PipelineError::TransientFetch { stage, .. }
            | PipelineError::Timeout { stage, .. }
            | PipelineError::Upstream { stage, .. } => *stage,
            PipelineError::MalformedRaster(_) => PipelineStage::Normalization,
            PipelineError::EmptyForecast | PipelineError::InvalidForecast(_) => {
                PipelineStage::Weather
            }
            PipelineError::DegenerateCluster { .. }
            | PipelineError::ClusterCountMismatch { .. }
            | PipelineError::UnexpectedClusterCount { .. } => PipelineStage::Aggregation,
            PipelineError::InvalidInput(_) => PipelineStage::Input,
        }
    }

    /// Attribute a collaborator failure to the stage that made the call.
    ///
    /// Only transfer, timeout and upstream failures are re-attributed; every
    /// other variant already names its own stage.
    pub fn at_stage(mut self, new_stage: PipelineStage) -> Self {
        match &mut self {
            PipelineError::TransientFetch { stage, .. }
            | PipelineError::Timeout { stage, .. }
            | PipelineError::Upstream { stage, .. } => *stage = new_stage,
            _ => {}
        }
        self
    }

    /// Whether retrying the whole run later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::TransientFetch { .. } | PipelineError::Timeout { .. }
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InsufficientImagery { .. } => "INSUFFICIENT_IMAGERY",
            PipelineError::TransientFetch { .. } => "TRANSIENT_FETCH",
            PipelineError::MalformedRaster(_) => "MALFORMED_RASTER",
            PipelineError::EmptyForecast => "EMPTY_FORECAST",
            PipelineError::InvalidForecast(_) => "INVALID_FORECAST",
            PipelineError::DegenerateCluster { .. } => "DEGENERATE_CLUSTER",
            PipelineError::ClusterCountMismatch { .. } => "CLUSTER_COUNT_MISMATCH",
            PipelineError::UnexpectedClusterCount { .. } => "UNEXPECTED_CLUSTER_COUNT",
            PipelineError::Timeout { .. } => "TIMEOUT",
            PipelineError::Upstream { .. } => "UPSTREAM_ERROR",
            PipelineError::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

/// Result alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
