//! Risk aggregation over cluster drift and weather

use shared::{ColorCluster, PipelineError, PipelineResult, RiskIndex, RiskIndicators, WeatherStats};

/// Combines the two ranked cluster lists and the weather summary
#[derive(Debug, Clone, Copy)]
pub struct RiskAggregator {
    cluster_count: usize,
}

impl RiskAggregator {
    pub fn new(cluster_count: usize) -> Self {
        Self { cluster_count }
    }

    /// Every indicator plus their product. Both lists must hold exactly the
    /// configured number of clusters.
    pub fn assess(
        &self,
        newer: &[ColorCluster],
        older: &[ColorCluster],
        stats: &WeatherStats,
    ) -> PipelineResult<(RiskIndicators, RiskIndex)> {
        if newer.len() != self.cluster_count || older.len() != self.cluster_count {
            return Err(PipelineError::UnexpectedClusterCount {
                expected: self.cluster_count,
                newer: newer.len(),
                older: older.len(),
            });
        }

        let indicators = RiskIndicators::compute(newer, older, stats)?;
        let risk = indicators.risk_index();

        tracing::info!(
            dryness = ?indicators.dryness,
            dryness_factor = indicators.dryness_factor(),
            wind = indicators.wind,
            humidity = indicators.humidity,
            rain = indicators.rain,
            temp = indicators.temp,
            sunlight = indicators.sunlight,
            risk = risk.value(),
            "Risk indicators computed"
        );
        Ok((indicators, risk))
    }

    pub fn aggregate(
        &self,
        newer: &[ColorCluster],
        older: &[ColorCluster],
        stats: &WeatherStats,
    ) -> PipelineResult<RiskIndex> {
        self.assess(newer, older, stats).map(|(_, risk)| risk)
    }
}
