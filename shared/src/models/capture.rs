//! Satellite capture metadata and the selection policy over it

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{PipelineError, PipelineResult};

/// Captures at or above this cloud cover are discarded
pub const DEFAULT_CLOUD_COVER_CEILING: f64 = 55.0;

/// Metadata for one source capture, used only for filtering and selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureMetadata {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub cloud_cover_percent: f64,
    /// Calendar day of acquisition; tiles captured on the same pass share it
    pub acquisition_date: NaiveDate,
}

impl CaptureMetadata {
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>, cloud_cover_percent: f64) -> Self {
        Self {
            id: id.into(),
            timestamp,
            cloud_cover_percent,
            acquisition_date: timestamp.date_naive(),
        }
    }

    /// Override the acquisition date when the catalog reports one explicitly
    pub fn with_acquisition_date(mut self, date: NaiveDate) -> Self {
        self.acquisition_date = date;
        self
    }
}

impl AsRef<CaptureMetadata> for CaptureMetadata {
    fn as_ref(&self) -> &CaptureMetadata {
        self
    }
}

/// Composite selection order: newest first, then clearest, then id
pub fn recency_order(a: &CaptureMetadata, b: &CaptureMetadata) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| {
            a.cloud_cover_percent
                .partial_cmp(&b.cloud_cover_percent)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Keep captures strictly under the cloud cover ceiling
pub fn filter_by_cloud_cover<T: AsRef<CaptureMetadata>>(captures: Vec<T>, ceiling: f64) -> Vec<T> {
    captures
        .into_iter()
        .filter(|c| c.as_ref().cloud_cover_percent < ceiling)
        .collect()
}

/// Sort in place by [`recency_order`]
pub fn order_by_recency<T: AsRef<CaptureMetadata>>(captures: &mut [T]) {
    captures.sort_by(|a, b| recency_order(a.as_ref(), b.as_ref()));
}

/// Walk the list in order and keep the first capture seen for each acquisition date.
///
/// Same-day duplicates happen when the area of interest straddles two tiles.
pub fn dedup_by_acquisition_date<T: AsRef<CaptureMetadata>>(captures: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    captures
        .into_iter()
        .filter(|c| seen.insert(c.as_ref().acquisition_date))
        .collect()
}

/// Apply the full selection policy and return `(most recent, second most recent)`
pub fn select_capture_pair<T: AsRef<CaptureMetadata>>(
    captures: Vec<T>,
    cloud_cover_ceiling: f64,
) -> PipelineResult<(T, T)> {
    let mut candidates = filter_by_cloud_cover(captures, cloud_cover_ceiling);
    order_by_recency(&mut candidates);
    let mut candidates = dedup_by_acquisition_date(candidates).into_iter();

    match (candidates.next(), candidates.next()) {
        (Some(newer), Some(older)) => Ok((newer, older)),
        (Some(_), None) => Err(PipelineError::InsufficientImagery { found: 1 }),
        _ => Err(PipelineError::InsufficientImagery { found: 0 }),
    }
}
