//! Raw multi-band captures and their normalized 8-bit RGB form

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::models::CaptureMetadata;

/// Multiplier of the integer-to-reflectance encoding for optical bands
pub const OPTICAL_SCALE: f64 = 2.75e-5;
/// Offset of the integer-to-reflectance encoding for optical bands
pub const OPTICAL_OFFSET: f64 = -0.2;
/// Upper bound of the land-surface reflectance window mapped to 255
pub const REFLECTANCE_CEILING: f64 = 0.3;
/// Largest accepted raster in pixels, several full Landsat scenes
pub const MAX_RASTER_PIXELS: usize = 1 << 28;

/// `width * height * bands`, rejecting shapes that overflow or exceed
/// [`MAX_RASTER_PIXELS`]
pub fn sample_count(width: usize, height: usize, bands: usize) -> PipelineResult<usize> {
    width
        .checked_mul(height)
        .filter(|&pixels| pixels <= MAX_RASTER_PIXELS)
        .and_then(|pixels| pixels.checked_mul(bands))
        .ok_or_else(|| {
            PipelineError::MalformedRaster(format!(
                "raster shape {}x{}x{} is too large",
                height, width, bands
            ))
        })
}

/// Capture pixels as delivered by the imagery source.
///
/// `data` is row-major with bands interleaved: index `(y * width + x) * bands + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCapture {
    pub metadata: CaptureMetadata,
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub data: Vec<f64>,
}

impl RawCapture {
    pub fn new(
        metadata: CaptureMetadata,
        width: usize,
        height: usize,
        bands: usize,
        data: Vec<f64>,
    ) -> PipelineResult<Self> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(PipelineError::MalformedRaster(format!(
                "empty raster shape {}x{}x{}",
                height, width, bands
            )));
        }
        let expected = sample_count(width, height, bands)?;
        if data.len() != expected {
            return Err(PipelineError::MalformedRaster(format!(
                "expected {} samples for shape {}x{}x{}, got {}",
                expected,
                height,
                width,
                bands,
                data.len()
            )));
        }
        Ok(Self {
            metadata,
            width,
            height,
            bands,
            data,
        })
    }

    #[inline]
    pub fn sample(&self, x: usize, y: usize, band: usize) -> f64 {
        self.data[(y * self.width + x) * self.bands + band]
    }
}

/// Which source bands feed the red, green and blue channels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BandSelection {
    pub red: usize,
    pub green: usize,
    pub blue: usize,
}

impl Default for BandSelection {
    fn default() -> Self {
        Self {
            red: 0,
            green: 1,
            blue: 2,
        }
    }
}

impl BandSelection {
    fn as_array(&self) -> [usize; 3] {
        [self.red, self.green, self.blue]
    }
}

/// 8-bit RGB raster with the same width and height as its source capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRaster {
    pub width: usize,
    pub height: usize,
    /// Row-major RGB triplets
    pub pixels: Vec<u8>,
}

impl NormalizedRaster {
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u8>) -> PipelineResult<Self> {
        let expected = sample_count(width, height, 3)?;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(PipelineError::MalformedRaster(format!(
                "RGB buffer of {} bytes does not match {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }
}

/// Undo the dataset's integer encoding: `value * 2.75e-5 - 0.2`
#[inline]
pub fn to_reflectance(value: f64) -> f64 {
    value * OPTICAL_SCALE + OPTICAL_OFFSET
}

/// Clamp into `[0, 0.3]`; NaN (no data) becomes 0
#[inline]
pub fn clamp_reflectance(reflectance: f64) -> f64 {
    if reflectance.is_nan() {
        return 0.0;
    }
    reflectance.clamp(0.0, REFLECTANCE_CEILING)
}

/// Map a clamped reflectance linearly onto `[0, 255]`, truncating
#[inline]
pub fn reflectance_to_channel(reflectance: f64) -> u8 {
    (255.0 * (reflectance / REFLECTANCE_CEILING)) as u8
}

/// Rescale, clamp and quantize three bands of a raw capture into an RGB raster
pub fn normalize(raw: &RawCapture, selection: BandSelection) -> PipelineResult<NormalizedRaster> {
    let bands = selection.as_array();
    if let Some(band) = bands.iter().find(|&&b| b >= raw.bands) {
        return Err(PipelineError::MalformedRaster(format!(
            "band index {} requested but capture {} has {} band(s)",
            band, raw.metadata.id, raw.bands
        )));
    }
    if raw.data.len() != raw.width * raw.height * raw.bands {
        return Err(PipelineError::MalformedRaster(format!(
            "capture {} has {} samples for shape {}x{}x{}",
            raw.metadata.id,
            raw.data.len(),
            raw.height,
            raw.width,
            raw.bands
        )));
    }

    let mut pixels = Vec::with_capacity(raw.width * raw.height * 3);
    for chunk in raw.data.chunks_exact(raw.bands) {
        for &band in &bands {
            let reflectance = clamp_reflectance(to_reflectance(chunk[band]));
            pixels.push(reflectance_to_channel(reflectance));
        }
    }

    NormalizedRaster::from_pixels(raw.width, raw.height, pixels)
}
