/// Gap detector - runs the analyzers over one image field and fuses the results
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{
    color_contrast::ColorContrastAnalyzer,
    config::GapDetectionConfig,
    contour_fallback::ContourFallbackAnalyzer,
    core::{AnalyzerKind, Candidate, DecisionPath, FusionResult, GapAnalyzer},
    edge_density::EdgeDensityAnalyzer,
    field::ImageField,
    fusion::FusionDecider,
    puzzle_piece::PuzzlePieceAnalyzer,
    template::SliderTemplateMatcher,
};
use crate::error::{AnalyzerFailure, GapError};

/// Outcome of one analyzer run, tagged with the analyzer that produced it.
pub type AnalyzerOutcome = (AnalyzerKind, Result<Candidate, AnalyzerFailure>);

/// Main entry point for gap detection.
///
/// Primary analyzers always run; the contour backstop runs only when both
/// column-profile analyzers failed, unless configured to always run.
pub struct GapDetector {
    primary: Vec<Arc<dyn GapAnalyzer>>,
    backstop: Option<Arc<dyn GapAnalyzer>>,
    fusion: FusionDecider,
    template: SliderTemplateMatcher,
    config: GapDetectionConfig,
}

impl GapDetector {
    pub fn new(config: GapDetectionConfig) -> Result<Self, GapError> {
        config.validate().map_err(GapError::InvalidConfig)?;

        let mut primary: Vec<Arc<dyn GapAnalyzer>> = Vec::new();
        let mut backstop: Option<Arc<dyn GapAnalyzer>> = None;

        for kind in &config.enabled_analyzers {
            match kind {
                AnalyzerKind::PuzzlePiece => primary.push(Arc::new(PuzzlePieceAnalyzer::new(
                    config.puzzle_piece.clone(),
                ))),
                AnalyzerKind::ColorContrast => primary.push(Arc::new(ColorContrastAnalyzer::new(
                    config.color_contrast.clone(),
                ))),
                AnalyzerKind::EdgeDensity => primary.push(Arc::new(EdgeDensityAnalyzer::new(
                    config.edge_density.clone(),
                ))),
                AnalyzerKind::ContourFallback => {
                    backstop = Some(Arc::new(ContourFallbackAnalyzer::new(
                        config.contour_fallback.clone(),
                    )))
                }
            }
        }

        Ok(Self {
            primary,
            backstop,
            fusion: FusionDecider::new(config.fusion.clone()),
            template: SliderTemplateMatcher::new(config.template.clone()),
            config,
        })
    }

    /// Replace the analyzer set, keeping fusion and template settings.
    pub fn with_analyzers(
        mut self,
        primary: Vec<Arc<dyn GapAnalyzer>>,
        backstop: Option<Arc<dyn GapAnalyzer>>,
    ) -> Self {
        self.primary = primary;
        self.backstop = backstop;
        self
    }

    /// Locate the gap in an encoded background image.
    pub fn detect_gap(&self, image_bytes: &[u8]) -> Result<FusionResult, GapError> {
        let field = ImageField::from_bytes(image_bytes)?;
        Ok(self.detect_in_field(&field))
    }

    /// Prefer matching the slider piece against the background when one is
    /// supplied; fall back to background-only analysis otherwise.
    pub fn detect_gap_with_slider(
        &self,
        background: &[u8],
        slider: Option<&[u8]>,
    ) -> Result<FusionResult, GapError> {
        let field = ImageField::from_bytes(background)?;
        if let Some(slider) = slider.and_then(decode_slider) {
            if let Some(result) = self.match_slider(&field, &slider) {
                return Ok(result);
            }
        }
        Ok(self.detect_in_field(&field))
    }

    pub fn match_slider(
        &self,
        field: &ImageField,
        slider: &image::DynamicImage,
    ) -> Option<FusionResult> {
        match self.template.locate(field, slider) {
            Ok(hit) => {
                info!(
                    "Slider template matched at x={} (score {:.3})",
                    hit.x, hit.score
                );
                Some(FusionResult {
                    distance: hit.x.min(field.width().saturating_sub(1)),
                    image_width: field.width(),
                    decision: DecisionPath::TemplateMatch,
                    candidates: Vec::new(),
                })
            }
            Err(reason) => {
                warn!("Slider template match rejected: {}", reason);
                None
            }
        }
    }

    /// Run every analyzer sequentially over an already decoded field.
    pub fn detect_in_field(&self, field: &ImageField) -> FusionResult {
        let outcomes = self
            .primary
            .iter()
            .map(|analyzer| run_analyzer(analyzer.as_ref(), field))
            .collect();
        self.settle(field, outcomes)
    }

    pub fn primary_analyzers(&self) -> &[Arc<dyn GapAnalyzer>] {
        &self.primary
    }

    /// Apply the backstop policy to the primary outcomes and fuse.
    pub fn settle(&self, field: &ImageField, outcomes: Vec<AnalyzerOutcome>) -> FusionResult {
        let mut candidates = Vec::new();
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(candidate) => candidates.push(candidate),
                Err(failure) => warn!("{} produced no candidate: {}", kind, failure),
            }
        }

        // Disabled counts as unavailable.
        let profiles_unavailable = !candidates.iter().any(|c| {
            matches!(
                c.method,
                AnalyzerKind::EdgeDensity | AnalyzerKind::ColorContrast
            )
        });

        if let Some(backstop) = &self.backstop {
            if profiles_unavailable || self.config.always_run_backstop {
                debug!("Running {} as backstop", backstop.name());
                match run_analyzer(backstop.as_ref(), field).1 {
                    Ok(candidate) => candidates.push(candidate),
                    Err(failure) => warn!("{} produced no candidate: {}", backstop.name(), failure),
                }
            }
        }

        let result = self.fusion.decide(field.width(), candidates);
        info!(
            "Gap detected at x={} of {} via {} ({} candidates)",
            result.distance,
            result.image_width,
            result.decision,
            result.candidates.len()
        );
        result
    }

    pub fn backstop(&self) -> Option<&Arc<dyn GapAnalyzer>> {
        self.backstop.as_ref()
    }
}

/// The slider is optional input: a broken one only costs the template match.
pub fn decode_slider(bytes: &[u8]) -> Option<image::DynamicImage> {
    match image::load_from_memory(bytes) {
        Ok(slider) => Some(slider),
        Err(e) => {
            warn!("Ignoring undecodable slider ({} bytes): {}", bytes.len(), e);
            None
        }
    }
}

pub fn run_analyzer(analyzer: &dyn GapAnalyzer, field: &ImageField) -> AnalyzerOutcome {
    let start = Instant::now();
    let outcome = analyzer.analyze(field);
    if let Ok(candidate) = &outcome {
        debug!(
            "{}: x={} signal {:.2} verified={} in {}us",
            analyzer.name(),
            candidate.position,
            candidate.confidence_signal,
            candidate.verified,
            start.elapsed().as_micros()
        );
    }
    (analyzer.kind(), outcome)
}
