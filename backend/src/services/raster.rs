//! Raster normalization and image encoding of the result

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbImage};
use shared::{
    BandSelection, Coordinate, NormalizedRaster, PipelineError, PipelineResult, PipelineStage,
    RawCapture,
};
use uuid::Uuid;

/// Converts raw multi-band captures into 8-bit RGB rasters
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterNormalizer {
    bands: BandSelection,
}

impl RasterNormalizer {
    pub fn new(bands: BandSelection) -> Self {
        Self { bands }
    }

    pub fn normalize(&self, raw: &RawCapture) -> PipelineResult<NormalizedRaster> {
        let raster = shared::normalize(raw, self.bands)?;
        tracing::debug!(
            capture_id = %raw.metadata.id,
            width = raster.width,
            height = raster.height,
            bands = raw.bands,
            "Normalized capture"
        );
        Ok(raster)
    }
}

/// PNG bytes of a normalized raster
pub fn encode_png(raster: &NormalizedRaster) -> PipelineResult<Vec<u8>> {
    let image = RgbImage::from_raw(
        raster.width as u32,
        raster.height as u32,
        raster.pixels.clone(),
    )
    .ok_or_else(|| PipelineError::MalformedRaster("pixel buffer does not fit raster".into()))?;

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| PipelineError::MalformedRaster(format!("PNG encoding failed: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Base64 PNG suitable for embedding in a JSON response or a data URL
pub fn preview_base64(raster: &NormalizedRaster) -> PipelineResult<String> {
    Ok(BASE64.encode(encode_png(raster)?))
}

/// `{run8}_{lat}_{lon}_{yyyymmdd-HHMMSS}_{n}.png`
pub fn artifact_file_name(
    run_id: Uuid,
    location: &Coordinate,
    at: DateTime<Utc>,
    n: usize,
) -> String {
    let run = run_id.simple().to_string();
    format!(
        "{}_{}_{}_{}_{}.png",
        &run[..8],
        location.latitude,
        location.longitude,
        at.format("%Y%m%d-%H%M%S"),
        n
    )
}

/// Writes normalized rasters of a run into a folder
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    folder: PathBuf,
}

impl ArtifactWriter {
    pub fn new(folder: impl AsRef<Path>) -> Self {
        Self {
            folder: folder.as_ref().to_path_buf(),
        }
    }

    /// Save rasters numbered from 1 in the given order; returns the written paths
    pub fn save(
        &self,
        run_id: Uuid,
        location: &Coordinate,
        at: DateTime<Utc>,
        rasters: &[&NormalizedRaster],
    ) -> PipelineResult<Vec<PathBuf>> {
        let io_error = |e: std::io::Error| PipelineError::Upstream {
            stage: PipelineStage::Normalization,
            service: "artifacts".to_string(),
            reason: e.to_string(),
        };
        std::fs::create_dir_all(&self.folder).map_err(io_error)?;

        rasters
            .iter()
            .enumerate()
            .map(|(i, raster)| {
                let path = self
                    .folder
                    .join(artifact_file_name(run_id, location, at, i + 1));
                std::fs::write(&path, encode_png(raster)?).map_err(io_error)?;
                tracing::info!(path = %path.display(), "Saved raster artifact");
                Ok(path)
            })
            .collect()
    }
}
