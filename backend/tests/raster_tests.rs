//! Raster normalization tests
//!
//! Tests for turning raw captures into RGB rasters including:
//! - Reflectance rescale and clamping
//! - Band selection and malformed input
//! - NPY payload decoding into raw captures

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use shared::{
    clamp_reflectance, reflectance_to_channel, to_reflectance, BandSelection, CaptureMetadata,
    PipelineError, RawCapture, REFLECTANCE_CEILING,
};
use wildfire_risk_backend::external::npy;
use wildfire_risk_backend::services::RasterNormalizer;

fn metadata() -> CaptureMetadata {
    CaptureMetadata::new(
        "LC08_TEST",
        Utc.with_ymd_and_hms(2022, 6, 1, 18, 0, 0).unwrap(),
        5.0,
    )
}

/// Raw value whose reflectance is exactly `reflectance`
fn raw_for(reflectance: f64) -> f64 {
    (reflectance + 0.2) / 2.75e-5
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_reflectance_window_maps_to_full_range() {
        let raw = RawCapture::new(
            metadata(),
            3,
            1,
            3,
            vec![
                raw_for(-0.1), raw_for(-0.1), raw_for(-0.1),
                raw_for(0.15), raw_for(0.15), raw_for(0.15),
                raw_for(0.9), raw_for(0.9), raw_for(0.9),
            ],
        )
        .unwrap();

        let raster = RasterNormalizer::default().normalize(&raw).unwrap();
        assert_eq!(raster.pixel(0, 0), [0, 0, 0]);
        assert!(raster.pixel(1, 0).iter().all(|&c| c == 127 || c == 128));
        assert_eq!(raster.pixel(2, 0), [255, 255, 255]);
    }

    #[test]
    fn test_band_selection_reorders_channels() {
        // Bands stored as (blue, green, red)
        let raw = RawCapture::new(
            metadata(),
            1,
            1,
            3,
            vec![raw_for(0.0), raw_for(0.15), raw_for(0.5)],
        )
        .unwrap();
        let normalizer = RasterNormalizer::new(BandSelection {
            red: 2,
            green: 1,
            blue: 0,
        });
        let px = normalizer.normalize(&raw).unwrap().pixel(0, 0);
        assert_eq!(px[0], 255);
        assert_eq!(px[2], 0);
    }

    #[test]
    fn test_missing_band_is_malformed() {
        let raw = RawCapture::new(metadata(), 2, 2, 2, vec![1000.0; 8]).unwrap();
        assert!(matches!(
            RasterNormalizer::default().normalize(&raw),
            Err(PipelineError::MalformedRaster(_))
        ));
    }

    #[test]
    fn test_shape_mismatch_is_malformed() {
        assert!(matches!(
            RawCapture::new(metadata(), 2, 2, 3, vec![0.0; 11]),
            Err(PipelineError::MalformedRaster(_))
        ));
    }

    #[test]
    fn test_nan_samples_become_black() {
        let raw = RawCapture::new(metadata(), 1, 1, 3, vec![f64::NAN; 3]).unwrap();
        let raster = RasterNormalizer::default().normalize(&raw).unwrap();
        assert_eq!(raster.pixel(0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_npy_payload_decodes_and_normalizes() {
        let dict = "{'descr': '<u2', 'fortran_order': False, 'shape': (1, 2, 3), }";
        let mut header = dict.to_string();
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        // 7273 -> 0.0 reflectance, 18182 -> ~0.3
        for v in [7273u16, 7273, 7273, 18182, 18182, 18182] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let raw = npy::decode_raster(&bytes, metadata()).unwrap();
        assert_eq!((raw.width, raw.height, raw.bands), (2, 1, 3));

        let raster = RasterNormalizer::default().normalize(&raw).unwrap();
        assert_eq!(raster.pixel(0, 0), [0, 0, 0]);
        assert!(raster.pixel(1, 0)[0] >= 254);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Clamping always lands in [0, 0.3]
        #[test]
        fn prop_clamp_window(v in prop::num::f64::ANY) {
            let r = clamp_reflectance(to_reflectance(v));
            prop_assert!((0.0..=REFLECTANCE_CEILING).contains(&r));
        }

        /// Channels are monotonic in the raw value
        #[test]
        fn prop_channel_monotonic(a in -1.0e6f64..1.0e6, b in -1.0e6f64..1.0e6) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let c_lo = reflectance_to_channel(clamp_reflectance(to_reflectance(lo)));
            let c_hi = reflectance_to_channel(clamp_reflectance(to_reflectance(hi)));
            prop_assert!(c_lo <= c_hi);
        }

        /// Normalization keeps the source width and height
        #[test]
        fn prop_normalize_preserves_shape(
            width in 1usize..12,
            height in 1usize..12,
            fill in 0.0f64..70000.0
        ) {
            let raw = RawCapture::new(metadata(), width, height, 3, vec![fill; width * height * 3])
                .unwrap();
            let raster = RasterNormalizer::default().normalize(&raw).unwrap();
            prop_assert_eq!((raster.width, raster.height), (width, height));
            prop_assert_eq!(raster.pixels.len(), width * height * 3);
        }
    }
}
