//! Locates the companion slider piece on the background by edge-map
//! template matching.
use image::{imageops, DynamicImage, GrayImage, RgbaImage};
use imageproc::edges::canny;
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use tracing::debug;

use super::config::TemplateMatchConfig;
use super::field::ImageField;
use crate::error::TemplateMismatch;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateHit {
    /// Left edge of the best match.
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

pub struct SliderTemplateMatcher {
    config: TemplateMatchConfig,
}

impl SliderTemplateMatcher {
    pub fn new(config: TemplateMatchConfig) -> Self {
        Self { config }
    }

    pub fn locate(
        &self,
        background: &ImageField,
        slider: &DynamicImage,
    ) -> Result<TemplateHit, TemplateMismatch> {
        let piece = opaque_region(slider)?;
        let (width, height) = background.dimensions();
        let (slider_width, slider_height) = piece.dimensions();
        if slider_width > width || slider_height > height {
            return Err(TemplateMismatch::SliderTooLarge {
                slider_width,
                slider_height,
                width,
                height,
            });
        }

        let piece_edges = canny(&piece, self.config.canny_low, self.config.canny_high);
        if !piece_edges.pixels().any(|p| p.0[0] > 0) {
            return Err(TemplateMismatch::NoEdges);
        }
        let background_edges = canny(
            background.gray(),
            self.config.canny_low,
            self.config.canny_high,
        );

        let scores = match_template(
            &background_edges,
            &piece_edges,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );

        // Empty background patches normalize to NaN; skip them.
        let mut best: Option<TemplateHit> = None;
        for (x, y, pixel) in scores.enumerate_pixels() {
            let score = pixel.0[0];
            if score.is_finite() && best.map_or(true, |b| score > b.score) {
                best = Some(TemplateHit { x, y, score });
            }
        }

        let hit = best.unwrap_or(TemplateHit {
            x: 0,
            y: 0,
            score: 0.0,
        });
        debug!(
            "Template {}x{} best at ({}, {}) score {:.3}",
            slider_width, slider_height, hit.x, hit.y, hit.score
        );

        if hit.score < self.config.min_score {
            return Err(TemplateMismatch::LowScore {
                score: hit.score,
                threshold: self.config.min_score,
            });
        }
        Ok(hit)
    }
}

impl Default for SliderTemplateMatcher {
    fn default() -> Self {
        Self::new(TemplateMatchConfig::default())
    }
}

/// Grayscale slider cropped to its non-transparent bounding box.
fn opaque_region(slider: &DynamicImage) -> Result<GrayImage, TemplateMismatch> {
    if !slider.color().has_alpha() {
        return Ok(slider.to_luma8());
    }

    let rgba: RgbaImage = slider.to_rgba8();
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in rgba.enumerate_pixels() {
        if pixel.0[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    let (x0, y0, x1, y1) = bounds.ok_or(TemplateMismatch::EmptySlider)?;
    let cropped = imageops::crop_imm(&rgba, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image();
    Ok(DynamicImage::ImageRgba8(cropped).to_luma8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::fixtures;
    use image::{Rgb, Rgba, RgbImage};

    fn background() -> RgbImage {
        fixtures::background_with_piece(300, 150, 170, 50, 40)
    }

    fn slider_from(background: &RgbImage, x: u32, y: u32, size: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(imageops::crop_imm(background, x, y, size, size).to_image())
    }

    #[test]
    fn test_locates_cropped_slider() {
        let bg = background();
        let field = ImageField::from_rgb(bg.clone()).unwrap();
        let slider = slider_from(&bg, 165, 45, 50);

        let hit = SliderTemplateMatcher::default()
            .locate(&field, &slider)
            .unwrap();
        assert_eq!((hit.x, hit.y), (165, 45));
        assert!(hit.score > 0.9);
    }

    #[test]
    fn test_locates_low_contrast_outline() {
        // 40 grey levels between piece and background
        let bg = RgbImage::from_fn(300, 150, |x, y| {
            if (120..160).contains(&x) && (60..100).contains(&y) {
                Rgb([168, 168, 168])
            } else {
                Rgb([128, 128, 128])
            }
        });
        let field = ImageField::from_rgb(bg.clone()).unwrap();
        let slider = slider_from(&bg, 112, 52, 56);

        let hit = SliderTemplateMatcher::default()
            .locate(&field, &slider)
            .unwrap();
        assert_eq!((hit.x, hit.y), (112, 52));
    }

    #[test]
    fn test_trims_transparent_border() {
        let bg = background();
        let mut rgba = RgbaImage::from_pixel(60, 60, Rgba([0, 0, 0, 0]));
        for y in 0..50 {
            for x in 0..50 {
                let [r, g, b] = bg.get_pixel(165 + x, 45 + y).0;
                rgba.put_pixel(x + 5, y + 5, Rgba([r, g, b, 255]));
            }
        }

        let region = opaque_region(&DynamicImage::ImageRgba8(rgba)).unwrap();
        assert_eq!(region.dimensions(), (50, 50));
    }

    #[test]
    fn test_fully_transparent_slider_is_rejected() {
        let slider = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([9, 9, 9, 0])));
        assert!(matches!(
            opaque_region(&slider),
            Err(TemplateMismatch::EmptySlider)
        ));
    }

    #[test]
    fn test_oversized_slider_is_rejected() {
        let field = ImageField::from_rgb(RgbImage::new(40, 40)).unwrap();
        let slider = DynamicImage::ImageRgb8(RgbImage::new(50, 20));
        assert!(matches!(
            SliderTemplateMatcher::default().locate(&field, &slider),
            Err(TemplateMismatch::SliderTooLarge { .. })
        ));
    }

    #[test]
    fn test_featureless_slider_is_rejected() {
        let field = ImageField::from_rgb(background()).unwrap();
        let slider = DynamicImage::ImageRgb8(RgbImage::new(30, 30));
        assert_eq!(
            SliderTemplateMatcher::default().locate(&field, &slider),
            Err(TemplateMismatch::NoEdges)
        );
    }
}
