//! Color clustering tests
//!
//! Tests for dominant color extraction including:
//! - Cluster shares summing to one
//! - Exactly k clusters, descending by share
//! - Repeatability with a fixed seed
//! - Degenerate inputs with fewer colors than clusters

use proptest::prelude::*;
use shared::{total_percent, NormalizedRaster, PERCENT_SUM_TOLERANCE};
use wildfire_risk_backend::services::clustering::{kmeans, resample_area};
use wildfire_risk_backend::services::{ColorClusterAnalyzer, KmeansParams};

fn raster_from(width: usize, height: usize, f: impl Fn(usize, usize) -> [u8; 3]) -> NormalizedRaster {
    let mut pixels = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&f(x, y));
        }
    }
    NormalizedRaster::from_pixels(width, height, pixels).unwrap()
}

fn analyzer(k: usize, seed: u64, working_size: usize) -> ColorClusterAnalyzer {
    ColorClusterAnalyzer::new(
        KmeansParams {
            k,
            seed,
            ..Default::default()
        },
        working_size,
    )
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Three vertical bands of 50%, 30% and 20%
    #[test]
    fn test_three_color_bands() {
        let raster = raster_from(100, 10, |x, _| match x {
            0..=49 => [34, 139, 34],
            50..=79 => [210, 180, 140],
            _ => [70, 70, 200],
        });

        let clusters = analyzer(3, 0, 100).analyze(&raster).unwrap();
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].rgb, [34, 139, 34]);
        assert_eq!(clusters[1].rgb, [210, 180, 140]);
        assert_eq!(clusters[2].rgb, [70, 70, 200]);
        assert!((clusters[0].percent - 0.5).abs() < 1e-9);
        assert!((clusters[1].percent - 0.3).abs() < 1e-9);
        assert!((clusters[2].percent - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_two_colors_three_clusters_does_not_fail() {
        let raster = raster_from(20, 20, |x, _| if x < 10 { [200, 10, 10] } else { [10, 200, 10] });
        let clusters = analyzer(3, 7, 20).analyze(&raster).unwrap();

        assert_eq!(clusters.len(), 3);
        assert!((total_percent(&clusters) - 1.0).abs() < PERCENT_SUM_TOLERANCE);
        assert_eq!(clusters[2].percent, 0.0);
    }

    #[test]
    fn test_working_resolution_is_fixed() {
        let raster = raster_from(640, 480, |x, y| [(x % 256) as u8, (y % 256) as u8, 0]);
        let working = resample_area(&raster, 200, 200).unwrap();
        assert_eq!((working.width, working.height), (200, 200));
        assert_eq!(working.pixels.len(), 200 * 200 * 3);
    }

    #[test]
    fn test_kmeans_reports_every_point() {
        let points: Vec<[f64; 3]> = (0..500).map(|i| [(i % 17) as f64, (i % 5) as f64, 3.0]).collect();
        let result = kmeans(&points, &KmeansParams::default()).unwrap();
        assert_eq!(result.counts.iter().sum::<usize>(), 500);
        assert_eq!(result.centroids.len(), 3);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn raster_strategy() -> impl Strategy<Value = NormalizedRaster> {
        (1usize..24, 1usize..24).prop_flat_map(|(w, h)| {
            prop::collection::vec(any::<u8>(), w * h * 3)
                .prop_map(move |pixels| NormalizedRaster::from_pixels(w, h, pixels).unwrap())
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(40))]

        /// Shares sum to one, list has length k and is sorted descending
        #[test]
        fn prop_cluster_invariants(raster in raster_strategy(), k in 1usize..6, seed in any::<u64>()) {
            let clusters = analyzer(k, seed, 16).analyze(&raster).unwrap();

            prop_assert_eq!(clusters.len(), k);
            prop_assert!((total_percent(&clusters) - 1.0).abs() < PERCENT_SUM_TOLERANCE);
            for pair in clusters.windows(2) {
                prop_assert!(pair[0].percent >= pair[1].percent);
            }
            for c in &clusters {
                prop_assert!((0.0..=1.0).contains(&c.percent));
            }
        }

        /// Few distinct colors, any k and working size: shares still sum to one, descending
        #[test]
        fn prop_palette_rasters_keep_invariants(
            palette in prop::collection::vec(any::<[u8; 3]>(), 1..4),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 64),
            k in 1usize..6,
            working_size in 4usize..32,
            seed in any::<u64>(),
        ) {
            let raster = raster_from(8, 8, |x, y| palette[picks[y * 8 + x].index(palette.len())]);
            let clusters = analyzer(k, seed, working_size).analyze(&raster).unwrap();

            prop_assert_eq!(clusters.len(), k);
            prop_assert!((total_percent(&clusters) - 1.0).abs() < 1e-6);
            for pair in clusters.windows(2) {
                prop_assert!(pair[0].percent >= pair[1].percent);
            }
        }

        /// Same seed, same input, same output
        #[test]
        fn prop_seeded_runs_repeat(raster in raster_strategy(), seed in any::<u64>()) {
            let a = analyzer(3, seed, 16).analyze(&raster).unwrap();
            let b = analyzer(3, seed, 16).analyze(&raster).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
