use std::fmt;

use serde::{Deserialize, Serialize};

use super::field::ImageField;
use crate::error::AnalyzerFailure;

/// The heuristic that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    EdgeDensity,
    ColorContrast,
    ContourFallback,
    PuzzlePiece,
}

impl AnalyzerKind {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyzerKind::EdgeDensity => "EdgeDensityAnalyzer",
            AnalyzerKind::ColorContrast => "ColorContrastAnalyzer",
            AnalyzerKind::ContourFallback => "ContourFallbackAnalyzer",
            AnalyzerKind::PuzzlePiece => "PuzzlePieceAnalyzer",
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One analyzer's proposed gap x-coordinate.
///
/// The position is always inside `[0, width)` of the image it was computed
/// on; [`Candidate::new`] is the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub method: AnalyzerKind,
    pub position: u32,
    pub confidence_signal: f64,
    pub verified: bool,
}

impl Candidate {
    pub fn new(
        method: AnalyzerKind,
        position: i64,
        confidence_signal: f64,
        width: u32,
    ) -> Result<Self, AnalyzerFailure> {
        if !confidence_signal.is_finite() {
            return Err(AnalyzerFailure::NonFiniteScore(method));
        }
        if position < 0 || position >= width as i64 {
            return Err(AnalyzerFailure::OutOfBounds {
                analyzer: method,
                position,
                width,
            });
        }

        Ok(Self {
            method,
            position: position as u32,
            confidence_signal,
            verified: false,
        })
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }
}

/// Strategy pattern for gap analysis.
///
/// Implementations are pure functions of the field: no interior state, so a
/// single analyzer can serve concurrent requests.
pub trait GapAnalyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;
    fn analyze(&self, field: &ImageField) -> Result<Candidate, AnalyzerFailure>;

    fn name(&self) -> &'static str {
        self.kind().name()
    }
}

/// Which branch of the fusion procedure produced the final distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPath {
    TemplateMatch,
    AnchorConsistent,
    AnchorBalanced,
    AnchorCenterBias,
    AnchorOnly,
    WeightedVote,
    MedianOverride,
    Fallback,
}

impl DecisionPath {
    pub fn tag(&self) -> &'static str {
        match self {
            DecisionPath::TemplateMatch => "template_match",
            DecisionPath::AnchorConsistent => "anchor_consistent",
            DecisionPath::AnchorBalanced => "anchor_balanced",
            DecisionPath::AnchorCenterBias => "anchor_center_bias",
            DecisionPath::AnchorOnly => "anchor_only",
            DecisionPath::WeightedVote => "weighted_vote",
            DecisionPath::MedianOverride => "median_override",
            DecisionPath::Fallback => "fallback",
        }
    }

    /// Fusion stage: 1-2 anchored, 3 voting, 4 fallback. Template matches
    /// bypass fusion and report 0.
    pub fn stage(&self) -> u8 {
        match self {
            DecisionPath::TemplateMatch => 0,
            DecisionPath::AnchorOnly => 1,
            DecisionPath::AnchorConsistent
            | DecisionPath::AnchorBalanced
            | DecisionPath::AnchorCenterBias => 2,
            DecisionPath::WeightedVote | DecisionPath::MedianOverride => 3,
            DecisionPath::Fallback => 4,
        }
    }
}

impl fmt::Display for DecisionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Final answer for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionResult {
    pub distance: u32,
    pub image_width: u32,
    pub decision: DecisionPath,
    pub candidates: Vec<Candidate>,
}

impl FusionResult {
    /// Map the image-space distance onto the slider track.
    ///
    /// Without a known track the raw distance is capped at 80% of the image
    /// width.
    pub fn drag_distance(&self, track_width: Option<f64>) -> f64 {
        let distance = self.distance as f64;
        let width = self.image_width as f64;

        match track_width {
            Some(track) if track > 0.0 && width > 0.0 => track * distance / width,
            _ if width > 0.0 => distance.min(width * 0.8),
            _ => distance,
        }
    }
}
