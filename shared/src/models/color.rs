//! Dominant color clusters

use serde::{Deserialize, Serialize};

/// Default number of dominant colors extracted per raster
pub const DEFAULT_CLUSTER_COUNT: usize = 3;

/// A representative color and the share of the raster assigned to it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ColorCluster {
    pub rgb: [u8; 3],
    /// Fraction of pixels in `[0, 1]`
    pub percent: f64,
}

impl ColorCluster {
    pub fn new(rgb: [u8; 3], percent: f64) -> Self {
        Self { rgb, percent }
    }

    pub fn red(&self) -> u8 {
        self.rgb[0]
    }

    pub fn green(&self) -> u8 {
        self.rgb[1]
    }

    pub fn blue(&self) -> u8 {
        self.rgb[2]
    }

    /// `#rrggbb`, handy for chart legends
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.rgb[0], self.rgb[1], self.rgb[2])
    }
}

/// Turn centroids and their pixel counts into a ranked cluster list.
///
/// Sorted by share descending; equal shares keep centroid index order.
pub fn rank_clusters(centroids: &[[u8; 3]], counts: &[usize]) -> Vec<ColorCluster> {
    let total: usize = counts.iter().sum();
    let mut ranked: Vec<(usize, ColorCluster)> = centroids
        .iter()
        .zip(counts)
        .enumerate()
        .map(|(index, (rgb, &count))| {
            let percent = if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            };
            (index, ColorCluster::new(*rgb, percent))
        })
        .collect();

    ranked.sort_by(|(ia, a), (ib, b)| {
        b.percent
            .partial_cmp(&a.percent)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(ia.cmp(ib))
    });

    ranked.into_iter().map(|(_, cluster)| cluster).collect()
}

/// Sum of cluster shares; 1.0 for a complete partition
pub fn total_percent(clusters: &[ColorCluster]) -> f64 {
    clusters.iter().map(|c| c.percent).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_by_share_descending() {
        let ranked = rank_clusters(&[[10, 10, 10], [200, 180, 90], [60, 120, 40]], &[10, 60, 30]);
        assert_eq!(ranked[0].rgb, [200, 180, 90]);
        assert_eq!(ranked[1].rgb, [60, 120, 40]);
        assert_eq!(ranked[2].rgb, [10, 10, 10]);
        assert!((total_percent(&ranked) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rank_ties_keep_centroid_order() {
        let ranked = rank_clusters(&[[1, 1, 1], [2, 2, 2], [3, 3, 3]], &[50, 50, 0]);
        assert_eq!(ranked[0].rgb, [1, 1, 1]);
        assert_eq!(ranked[1].rgb, [2, 2, 2]);
        assert_eq!(ranked[2].percent, 0.0);
    }

    #[test]
    fn test_hex() {
        assert_eq!(ColorCluster::new([255, 16, 0], 0.5).hex(), "#ff1000");
    }
}
