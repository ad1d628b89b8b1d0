//! Error handling for the FireWatch risk service
//!
//! Every error response names the pipeline stage that failed and whether a
//! later retry could succeed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{PipelineError, PipelineStage};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    // Validation errors
    #[error("Validation error: {0}")]
    ValidationError(String),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::ValidationError(errors.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<PipelineStage>,
    pub retryable: bool,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Pipeline(err) => match err {
                PipelineError::InsufficientImagery { .. }
                | PipelineError::DegenerateCluster { .. }
                | PipelineError::ClusterCountMismatch { .. }
                | PipelineError::UnexpectedClusterCount { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::TransientFetch { .. } => StatusCode::SERVICE_UNAVAILABLE,
                PipelineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                PipelineError::MalformedRaster(_)
                | PipelineError::EmptyForecast
                | PipelineError::InvalidForecast(_)
                | PipelineError::Upstream { .. } => StatusCode::BAD_GATEWAY,
                PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            },
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> ErrorDetail {
        match self {
            AppError::Pipeline(err) => ErrorDetail {
                code: err.code().to_string(),
                message: err.to_string(),
                stage: Some(err.stage()),
                retryable: err.is_retryable(),
            },
            AppError::ValidationError(msg) => ErrorDetail {
                code: "VALIDATION_ERROR".to_string(),
                message: msg.clone(),
                stage: Some(PipelineStage::Input),
                retryable: false,
            },
            AppError::Internal(msg) => ErrorDetail {
                code: "INTERNAL_ERROR".to_string(),
                message: msg.clone(),
                stage: None,
                retryable: false,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_detail = self.detail();

        // Log the error for debugging
        tracing::error!(stage = ?error_detail.stage, "Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
