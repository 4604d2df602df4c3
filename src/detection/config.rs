use serde::Deserialize;

use super::core::AnalyzerKind;

/// Configuration for gap detection with tunable parameters.
///
/// Every threshold here was tuned empirically on ~300x150 CAPTCHA backgrounds.
/// They have not been recalibrated for much larger or smaller images.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GapDetectionConfig {
    pub enabled_analyzers: Vec<AnalyzerKind>,
    /// Run the contour backstop even when edge density or color contrast succeeded.
    pub always_run_backstop: bool,
    pub edge_density: EdgeDensityConfig,
    pub color_contrast: ColorContrastConfig,
    pub contour_fallback: ContourFallbackConfig,
    pub puzzle_piece: PuzzlePieceConfig,
    pub fusion: FusionConfig,
    pub template: TemplateMatchConfig,
}

/// Sliding-window geometry shared by the column-profile analyzers.
///
/// Window is `max(min_window, width / window_divisor)`, the search band is
/// `[width / margin_divisor, width - width / margin_divisor)`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WindowConfig {
    pub min_window: u32,
    pub window_divisor: u32,
    pub margin_divisor: u32,
}

impl WindowConfig {
    pub fn window(&self, width: u32) -> u32 {
        self.min_window.max(width / self.window_divisor)
    }

    pub fn band(&self, width: u32) -> (u32, u32) {
        let margin = width / self.margin_divisor;
        (margin, width.saturating_sub(margin))
    }

    fn validate(&self, name: &str) -> Result<(), String> {
        if self.min_window == 0 {
            return Err(format!("{name}: min_window must be greater than 0"));
        }
        if self.window_divisor == 0 || self.margin_divisor == 0 {
            return Err(format!("{name}: divisors must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdgeDensityConfig {
    pub window: WindowConfig,
    pub variance_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColorContrastConfig {
    pub window: WindowConfig,
    pub stddev_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContourFallbackConfig {
    pub window: WindowConfig,
    pub blur_sigma: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PuzzlePieceConfig {
    pub clahe_clip_limit: f32,
    pub clahe_tiles: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub min_piece_area: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Inferred gaps must land strictly inside `(edge_clearance, width - edge_clearance)`.
    pub edge_clearance: u32,
    /// Shift applied to pieces found in the outer thirds, as a fraction of width.
    pub side_shift_ratio: f64,
    pub search_margin_ratio: f64,
    pub min_scan_window: u32,
    pub scan_window_divisor: u32,
    pub scan_step: u32,
    /// Width of the strip centered on each window edge for boundary strength.
    pub flank_width: u32,
    pub verify_score: f64,
    pub weights: PieceScoreWeights,
}

/// Additive weights for the feature-scored window scan.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PieceScoreWeights {
    pub low_density: f64,
    pub flatness: f64,
    pub boundary: f64,
    pub contrast: f64,
    pub position: f64,
    /// Variance is multiplied by this before being capped at 1.
    pub variance_scale: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub edge_density_weight: f64,
    pub color_contrast_weight: f64,
    pub contour_fallback_weight: f64,
    pub puzzle_piece_weight: f64,
    pub puzzle_piece_soft_weight: f64,
    pub puzzle_piece_hard_weight: f64,
    /// Piece deviation from the other candidates' mean that starts reducing its weight.
    pub dissent_soft: f64,
    pub dissent_hard: f64,
    pub consistent_band: f64,
    pub balanced_band: f64,
    pub outlier_band: f64,
    pub anchor_margin_ratio: f64,
    pub fallback_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemplateMatchConfig {
    /// imageproc's `canny` blurs (sigma 1.4) before the Sobel pass, so a
    /// 40-level step peaks near 90; keep the thresholds well under that.
    pub canny_low: f32,
    pub canny_high: f32,
    pub min_score: f32,
}

impl Default for GapDetectionConfig {
    fn default() -> Self {
        Self {
            enabled_analyzers: vec![
                AnalyzerKind::PuzzlePiece,
                AnalyzerKind::ColorContrast,
                AnalyzerKind::EdgeDensity,
                AnalyzerKind::ContourFallback,
            ],
            always_run_backstop: false,
            edge_density: EdgeDensityConfig::default(),
            color_contrast: ColorContrastConfig::default(),
            contour_fallback: ContourFallbackConfig::default(),
            puzzle_piece: PuzzlePieceConfig::default(),
            fusion: FusionConfig::default(),
            template: TemplateMatchConfig::default(),
        }
    }
}

impl Default for EdgeDensityConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig {
                min_window: 10,
                window_divisor: 20,
                margin_divisor: 10,
            },
            variance_weight: 0.5,
        }
    }
}

impl Default for ColorContrastConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig {
                min_window: 8,
                window_divisor: 25,
                margin_divisor: 8,
            },
            stddev_weight: 0.3,
        }
    }
}

impl Default for ContourFallbackConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig {
                min_window: 15,
                window_divisor: 20,
                margin_divisor: 8,
            },
            blur_sigma: 1.5,
        }
    }
}

impl Default for PuzzlePieceConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            canny_low: 50.0,
            canny_high: 150.0,
            min_piece_area: 200.0,
            min_aspect: 0.5,
            max_aspect: 2.0,
            edge_clearance: 20,
            side_shift_ratio: 0.4,
            search_margin_ratio: 0.075,
            min_scan_window: 20,
            scan_window_divisor: 6,
            scan_step: 2,
            flank_width: 2,
            verify_score: 30.0,
            weights: PieceScoreWeights::default(),
        }
    }
}

impl Default for PieceScoreWeights {
    fn default() -> Self {
        Self {
            low_density: 15.0,
            flatness: 5.0,
            boundary: 40.0,
            contrast: 30.0,
            position: 5.0,
            variance_scale: 100.0,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            edge_density_weight: 2.0,
            color_contrast_weight: 2.5,
            contour_fallback_weight: 1.2,
            puzzle_piece_weight: 3.0,
            puzzle_piece_soft_weight: 1.8,
            puzzle_piece_hard_weight: 1.0,
            dissent_soft: 50.0,
            dissent_hard: 80.0,
            consistent_band: 20.0,
            balanced_band: 50.0,
            outlier_band: 60.0,
            anchor_margin_ratio: 0.1,
            fallback_ratio: 0.3,
        }
    }
}

impl Default for TemplateMatchConfig {
    fn default() -> Self {
        Self {
            canny_low: 20.0,
            canny_high: 60.0,
            min_score: 0.2,
        }
    }
}

impl GapDetectionConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled_analyzers.is_empty() {
            return Err("At least one analyzer must be enabled".to_string());
        }

        self.edge_density.window.validate("edge_density")?;
        self.color_contrast.window.validate("color_contrast")?;
        self.contour_fallback.window.validate("contour_fallback")?;

        if self.contour_fallback.blur_sigma <= 0.0 {
            return Err("contour_fallback: blur_sigma must be positive".to_string());
        }

        let piece = &self.puzzle_piece;
        if piece.clahe_tiles == 0 || piece.clahe_clip_limit <= 0.0 {
            return Err("puzzle_piece: CLAHE tiles and clip limit must be positive".to_string());
        }
        if piece.canny_low > piece.canny_high {
            return Err("puzzle_piece: canny_low must not exceed canny_high".to_string());
        }
        if piece.min_aspect > piece.max_aspect {
            return Err("puzzle_piece: min_aspect must not exceed max_aspect".to_string());
        }
        if !(0.0..0.5).contains(&piece.search_margin_ratio) {
            return Err("puzzle_piece: search_margin_ratio must be in [0, 0.5)".to_string());
        }
        if piece.scan_step == 0 || piece.min_scan_window == 0 || piece.scan_window_divisor == 0 {
            return Err("puzzle_piece: scan window and step must be positive".to_string());
        }

        let fusion = &self.fusion;
        if fusion.consistent_band > fusion.balanced_band {
            return Err("fusion: consistent_band must not exceed balanced_band".to_string());
        }
        if fusion.dissent_soft > fusion.dissent_hard {
            return Err("fusion: dissent_soft must not exceed dissent_hard".to_string());
        }
        if !(0.0..0.5).contains(&fusion.anchor_margin_ratio) {
            return Err("fusion: anchor_margin_ratio must be in [0, 0.5)".to_string());
        }
        if !(0.0..1.0).contains(&fusion.fallback_ratio) {
            return Err("fusion: fallback_ratio must be in [0, 1)".to_string());
        }

        if self.template.canny_low > self.template.canny_high {
            return Err("template: canny_low must not exceed canny_high".to_string());
        }

        Ok(())
    }

    /// Enable a specific analyzer
    pub fn enable_analyzer(mut self, kind: AnalyzerKind) -> Self {
        if !self.enabled_analyzers.contains(&kind) {
            self.enabled_analyzers.push(kind);
        }
        self
    }

    /// Disable a specific analyzer
    pub fn disable_analyzer(mut self, kind: AnalyzerKind) -> Self {
        self.enabled_analyzers.retain(|k| *k != kind);
        self
    }

    pub fn with_backstop(mut self, always: bool) -> Self {
        self.always_run_backstop = always;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GapDetectionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_window_geometry() {
        let edge = EdgeDensityConfig::default().window;
        assert_eq!(edge.window(300), 15);
        assert_eq!(edge.window(100), 10);
        assert_eq!(edge.band(300), (30, 270));

        let color = ColorContrastConfig::default().window;
        assert_eq!(color.window(300), 12);
        assert_eq!(color.band(300), (37, 263));
    }

    #[test]
    fn test_rejects_empty_analyzer_list() {
        let config = GapDetectionConfig::default()
            .disable_analyzer(AnalyzerKind::PuzzlePiece)
            .disable_analyzer(AnalyzerKind::ColorContrast)
            .disable_analyzer(AnalyzerKind::EdgeDensity)
            .disable_analyzer(AnalyzerKind::ContourFallback);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_bands() {
        let mut config = GapDetectionConfig::default();
        config.fusion.consistent_band = 70.0;
        assert!(config.validate().is_err());

        let mut config = GapDetectionConfig::default();
        config.edge_density.window.window_divisor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enable_is_idempotent() {
        let config = GapDetectionConfig::default().enable_analyzer(AnalyzerKind::EdgeDensity);
        assert_eq!(
            config
                .enabled_analyzers
                .iter()
                .filter(|k| **k == AnalyzerKind::EdgeDensity)
                .count(),
            1
        );
    }
}
