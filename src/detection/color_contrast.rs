//! Gap search over per-column color distance from the image mean.
use super::config::ColorContrastConfig;
use super::core::{AnalyzerKind, Candidate, GapAnalyzer};
use super::field::ImageField;
use super::profile::{self, Extremum, WindowStats};
use crate::error::AnalyzerFailure;

/// Looks for a localized spike of color distance; gaps are usually darker or
/// lighter than everything around them.
pub struct ColorContrastAnalyzer {
    config: ColorContrastConfig,
}

impl ColorContrastAnalyzer {
    pub fn new(config: ColorContrastConfig) -> Self {
        Self { config }
    }

    /// Average Euclidean RGB distance to the image mean, per column.
    fn distance_profile(field: &ImageField) -> Vec<f64> {
        let [mr, mg, mb] = field.mean_color();
        let mut profile = vec![0f64; field.width() as usize];

        for (x, _, pixel) in field.rgb().enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let dr = r as f64 - mr;
            let dg = g as f64 - mg;
            let db = b as f64 - mb;
            profile[x as usize] += (dr * dr + dg * dg + db * db).sqrt();
        }

        let height = field.height() as f64;
        profile.iter_mut().for_each(|v| *v /= height);
        profile
    }
}

impl Default for ColorContrastAnalyzer {
    fn default() -> Self {
        Self::new(ColorContrastConfig::default())
    }
}

impl GapAnalyzer for ColorContrastAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::ColorContrast
    }

    fn analyze(&self, field: &ImageField) -> Result<Candidate, AnalyzerFailure> {
        let width = field.width();
        let window = self.config.window.window(width);
        let band = self.config.window.band(width);
        let profile = Self::distance_profile(field);

        let stddev_weight = self.config.stddev_weight;
        let hit = profile::scan(&profile, band, window, 1, Extremum::Max, |_, values| {
            let stats = WindowStats::of(values);
            stats.max + stddev_weight * stats.stddev()
        })
        .ok_or(AnalyzerFailure::EmptySearchBand {
            analyzer: self.kind(),
            band: band.1.saturating_sub(band.0),
            window,
        })?;

        Candidate::new(self.kind(), hit.center as i64, hit.score, width)
    }
}
