//! Dominant color extraction
//!
//! Rasters are first resampled to a fixed square working size by area
//! averaging, then partitioned with seeded k-means++ / Lloyd iterations.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{rank_clusters, ColorCluster, NormalizedRaster, PipelineError, PipelineResult};

use crate::config::AnalysisConfig;

/// Parameters for k-means clustering
#[derive(Debug, Clone)]
pub struct KmeansParams {
    /// Number of clusters
    pub k: usize,
    /// Maximum Lloyd iterations (default: 300)
    pub max_iterations: usize,
    /// Stop once no centroid moves further than this, in channel units (default: 1e-4)
    pub convergence: f64,
    /// Seed for k-means++ initialization
    pub seed: u64,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            k: shared::DEFAULT_CLUSTER_COUNT,
            max_iterations: 300,
            convergence: 1e-4,
            seed: 0,
        }
    }
}

/// Result of one k-means run
#[derive(Debug, Clone, PartialEq)]
pub struct KmeansResult {
    pub centroids: Vec<[f64; 3]>,
    /// Points assigned to each centroid
    pub counts: Vec<usize>,
    pub iterations: usize,
}

/// Computes the K dominant colors of a raster
#[derive(Debug, Clone)]
pub struct ColorClusterAnalyzer {
    params: KmeansParams,
    working_size: usize,
}

impl ColorClusterAnalyzer {
    pub fn new(params: KmeansParams, working_size: usize) -> Self {
        Self {
            params,
            working_size,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            KmeansParams {
                k: config.cluster_count,
                max_iterations: config.max_iterations,
                convergence: config.tolerance,
                seed: config.seed,
            },
            config.working_size as usize,
        )
    }

    pub fn cluster_count(&self) -> usize {
        self.params.k
    }

    /// Ranked clusters of `raster`, length k, descending by share
    pub fn analyze(&self, raster: &NormalizedRaster) -> PipelineResult<Vec<ColorCluster>> {
        let working = resample_area(raster, self.working_size, self.working_size)?;
        tracing::debug!(
            from_width = raster.width,
            from_height = raster.height,
            to_width = working.width,
            to_height = working.height,
            "Resampled raster for clustering"
        );

        let points: Vec<[f64; 3]> = working
            .pixels
            .chunks_exact(3)
            .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
            .collect();

        let result = kmeans(&points, &self.params)?;
        let centroids: Vec<[u8; 3]> = result.centroids.iter().map(|c| to_rgb8(*c)).collect();
        let clusters = rank_clusters(&centroids, &result.counts);

        tracing::debug!(
            iterations = result.iterations,
            clusters = ?clusters.iter().map(|c| (c.hex(), c.percent)).collect::<Vec<_>>(),
            "Color clustering complete"
        );
        Ok(clusters)
    }
}

/// Centroid channels are truncated toward zero
fn to_rgb8(centroid: [f64; 3]) -> [u8; 3] {
    centroid.map(|v| v.clamp(0.0, 255.0) as u8)
}

// ---------------------------------------------------------------------------
// Area-averaging resampling
// ---------------------------------------------------------------------------

/// Source cells overlapping each destination cell along one axis, with
/// weights summing to 1
fn axis_weights(src: usize, dst: usize) -> Vec<Vec<(usize, f64)>> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|d| {
            let start = d as f64 * scale;
            let end = start + scale;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src);

            let mut cells: Vec<(usize, f64)> = (first..last)
                .map(|s| {
                    let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (s, overlap.max(0.0) / scale)
                })
                .filter(|(_, w)| *w > 0.0)
                .collect();
            if cells.is_empty() {
                cells.push((first.min(src - 1), 1.0));
            }
            cells
        })
        .collect()
}

/// Resample to `width` x `height`, each output pixel being the
/// coverage-weighted mean of the source pixels under it
pub fn resample_area(
    raster: &NormalizedRaster,
    width: usize,
    height: usize,
) -> PipelineResult<NormalizedRaster> {
    if width == 0 || height == 0 {
        return Err(PipelineError::InvalidInput(
            "working size must be positive".to_string(),
        ));
    }
    if raster.width == width && raster.height == height {
        return Ok(raster.clone());
    }

    let xs = axis_weights(raster.width, width);
    let ys = axis_weights(raster.height, height);

    let mut pixels = Vec::with_capacity(width * height * 3);
    for row in &ys {
        for col in &xs {
            let mut acc = [0.0f64; 3];
            for &(sy, wy) in row {
                for &(sx, wx) in col {
                    let px = raster.pixel(sx, sy);
                    let w = wy * wx;
                    for c in 0..3 {
                        acc[c] += px[c] as f64 * w;
                    }
                }
            }
            pixels.extend(acc.iter().map(|v| v.round().clamp(0.0, 255.0) as u8));
        }
    }

    NormalizedRaster::from_pixels(width, height, pixels)
}

// ---------------------------------------------------------------------------
// K-means
// ---------------------------------------------------------------------------

#[inline]
fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|i| (a[i] - b[i]) * (a[i] - b[i])).sum()
}

/// Index of the nearest centroid; ties go to the lowest index
#[inline]
fn nearest(point: &[f64; 3], centroids: &[[f64; 3]]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (k, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best_dist {
            best_dist = d;
            best = k;
        }
    }
    best
}

/// k-means++ seeding.
///
/// When every point already coincides with a chosen centroid (fewer distinct
/// colors than k) the remaining centroids are drawn uniformly, which yields
/// duplicate centroids that end up with no points.
fn initialize_centroids(points: &[[f64; 3]], k: usize, rng: &mut StdRng) -> Vec<[f64; 3]> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..points.len())]);

    let mut distances: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = distances.iter().sum();
        let chosen = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut pick = distances.iter().rposition(|d| *d > 0.0).unwrap_or(0);
            for (i, d) in distances.iter().enumerate() {
                if *d > 0.0 && target < *d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            rng.random_range(0..points.len())
        };

        let centroid = points[chosen];
        for (d, p) in distances.iter_mut().zip(points) {
            *d = d.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

/// Partition `points` into `params.k` clusters.
///
/// Empty clusters keep their previous centroid.
pub fn kmeans(points: &[[f64; 3]], params: &KmeansParams) -> PipelineResult<KmeansResult> {
    if params.k == 0 {
        return Err(PipelineError::InvalidInput(
            "cluster count must be at least 1".to_string(),
        ));
    }
    if points.is_empty() {
        return Err(PipelineError::MalformedRaster(
            "no pixels to cluster".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut centroids = initialize_centroids(points, params.k, &mut rng);
    let mut labels = vec![0usize; points.len()];
    let mut iterations = 0;

    for _ in 0..params.max_iterations {
        iterations += 1;

        for (label, point) in labels.iter_mut().zip(points) {
            *label = nearest(point, &centroids);
        }

        let mut sums = vec![[0.0f64; 3]; params.k];
        let mut counts = vec![0usize; params.k];
        for (point, &label) in points.iter().zip(&labels) {
            for c in 0..3 {
                sums[label][c] += point[c];
            }
            counts[label] += 1;
        }

        let mut max_shift = 0.0f64;
        for k in 0..params.k {
            if counts[k] == 0 {
                continue;
            }
            let updated = sums[k].map(|s| s / counts[k] as f64);
            max_shift = max_shift.max(squared_distance(&updated, &centroids[k]).sqrt());
            centroids[k] = updated;
        }

        if max_shift < params.convergence {
            break;
        }
    }

    // Counts against the final centroids
    let mut counts = vec![0usize; params.k];
    for point in points {
        counts[nearest(point, &centroids)] += 1;
    }

    Ok(KmeansResult {
        centroids,
        counts,
        iterations,
    })
}
