//! Capture selection over the imagery catalog

use std::sync::Arc;

use shared::{AreaOfInterest, PipelineResult, PipelineStage};

use crate::external::{CaptureHandle, ImagerySource};

/// Picks the two most recent usable captures over an area
#[derive(Clone)]
pub struct CaptureSelector {
    source: Arc<dyn ImagerySource>,
}

impl CaptureSelector {
    pub fn new(source: Arc<dyn ImagerySource>) -> Self {
        Self { source }
    }

    /// Returns `(newer, older)` with distinct acquisition dates.
    ///
    /// Candidates are ordered newest first, then by ascending cloud cover,
    /// then by id; only the first capture of each acquisition date is kept.
    pub async fn select(
        &self,
        area: &AreaOfInterest,
        cloud_cover_ceiling: f64,
    ) -> PipelineResult<(CaptureHandle, CaptureHandle)> {
        let candidates = self
            .source
            .query(area, cloud_cover_ceiling)
            .await
            .map_err(|e| e.at_stage(PipelineStage::CaptureSelection))?;
        tracing::info!(candidates = candidates.len(), "Captures returned by catalog");

        let (newer, older) = shared::select_capture_pair(candidates, cloud_cover_ceiling)
            .map_err(|e| {
                tracing::warn!(error = %e, "Not enough distinct-date captures");
                e
            })?;

        tracing::info!(
            newer = %newer.metadata.id,
            newer_date = %newer.metadata.acquisition_date,
            older = %older.metadata.id,
            older_date = %older.metadata.acquisition_date,
            "Selected capture pair"
        );
        Ok((newer, older))
    }
}
