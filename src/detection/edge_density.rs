//! Gap search over the per-column edge-magnitude profile.
use super::config::EdgeDensityConfig;
use super::core::{AnalyzerKind, Candidate, GapAnalyzer};
use super::field::ImageField;
use super::profile::{self, Extremum, WindowStats};
use crate::error::AnalyzerFailure;

/// Finds the window whose edge profile is low on average but locally variable.
pub struct EdgeDensityAnalyzer {
    config: EdgeDensityConfig,
}

impl EdgeDensityAnalyzer {
    pub fn new(config: EdgeDensityConfig) -> Self {
        Self { config }
    }
}

impl Default for EdgeDensityAnalyzer {
    fn default() -> Self {
        Self::new(EdgeDensityConfig::default())
    }
}

impl GapAnalyzer for EdgeDensityAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::EdgeDensity
    }

    fn analyze(&self, field: &ImageField) -> Result<Candidate, AnalyzerFailure> {
        let width = field.width();
        let window = self.config.window.window(width);
        let band = self.config.window.band(width);
        let profile = field.edge_column_profile();

        // score = mean - k * variance
        let variance_weight = self.config.variance_weight;
        let hit = profile::scan(&profile, band, window, 1, Extremum::Min, |_, values| {
            let stats = WindowStats::of(values);
            stats.mean - variance_weight * stats.variance
        })
        .ok_or(AnalyzerFailure::EmptySearchBand {
            analyzer: self.kind(),
            band: band.1.saturating_sub(band.0),
            window,
        })?;

        Candidate::new(self.kind(), hit.center as i64, hit.score, width)
    }
}
