//! Backstop analyzer: the gap interior is the least edge-dense stretch.
use image::{GrayImage, Luma};
use imageproc::filter::{gaussian_blur_f32, laplacian_filter};

use super::config::ContourFallbackConfig;
use super::core::{AnalyzerKind, Candidate, GapAnalyzer};
use super::field::ImageField;
use super::profile::{self, Extremum, WindowStats};
use crate::error::AnalyzerFailure;

pub struct ContourFallbackAnalyzer {
    config: ContourFallbackConfig,
}

impl ContourFallbackAnalyzer {
    pub fn new(config: ContourFallbackConfig) -> Self {
        Self { config }
    }

    /// Column sums of |Laplacian| over the smoothed color channels.
    fn laplacian_profile(&self, field: &ImageField) -> Vec<f64> {
        let (width, height) = field.dimensions();
        let blurred = gaussian_blur_f32(field.rgb(), self.config.blur_sigma);
        let mut profile = vec![0f64; width as usize];

        for channel in 0..3 {
            let plane =
                GrayImage::from_fn(width, height, |x, y| Luma([blurred.get_pixel(x, y).0[channel]]));
            let laplacian = laplacian_filter(&plane);
            for (x, _, pixel) in laplacian.enumerate_pixels() {
                profile[x as usize] += (pixel.0[0] as f64).abs();
            }
        }
        profile
    }
}

impl Default for ContourFallbackAnalyzer {
    fn default() -> Self {
        Self::new(ContourFallbackConfig::default())
    }
}

impl GapAnalyzer for ContourFallbackAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::ContourFallback
    }

    fn analyze(&self, field: &ImageField) -> Result<Candidate, AnalyzerFailure> {
        let width = field.width();
        let window = self.config.window.window(width);
        let band = self.config.window.band(width);
        let profile = self.laplacian_profile(field);

        let hit = profile::scan(&profile, band, window, 1, Extremum::Min, |_, values| {
            WindowStats::of(values).mean
        })
        .ok_or(AnalyzerFailure::EmptySearchBand {
            analyzer: self.kind(),
            band: band.1.saturating_sub(band.0),
            window,
        })?;

        Candidate::new(self.kind(), hit.center as i64, hit.score, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::fixtures;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_finds_flat_gap_interior() {
        let field = ImageField::from_rgb(fixtures::captcha_with_gap(300, 150, 180, 42)).unwrap();
        let candidate = ContourFallbackAnalyzer::default().analyze(&field).unwrap();

        assert_eq!(candidate.method, AnalyzerKind::ContourFallback);
        assert!(
            (180..=222).contains(&candidate.position),
            "position {}",
            candidate.position
        );
    }

    #[test]
    fn test_uniform_image_has_zero_density() {
        let field =
            ImageField::from_rgb(RgbImage::from_pixel(200, 80, Rgb([50, 60, 70]))).unwrap();
        let candidate = ContourFallbackAnalyzer::default().analyze(&field).unwrap();
        assert_eq!(candidate.confidence_signal, 0.0);
        // band starts at 25, window 15
        assert_eq!(candidate.position, 32);
    }

    #[test]
    fn test_narrow_image_fails_softly() {
        let field = ImageField::from_rgb(RgbImage::from_pixel(12, 12, Rgb([0, 0, 0]))).unwrap();
        assert!(matches!(
            ContourFallbackAnalyzer::default().analyze(&field),
            Err(AnalyzerFailure::EmptySearchBand { window: 15, .. })
        ));
    }
}
