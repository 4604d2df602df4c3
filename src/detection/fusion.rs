//! Reconciles analyzer candidates into one gap coordinate.
use tracing::debug;

use super::config::FusionConfig;
use super::core::{AnalyzerKind, Candidate, DecisionPath, FusionResult};
use super::profile;

pub struct FusionDecider {
    config: FusionConfig,
}

impl FusionDecider {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Fuse `candidates` found on an image `width` pixels wide.
    ///
    /// Never fails: disagreement is settled numerically and an empty
    /// candidate set yields the fixed-ratio fallback.
    pub fn decide(&self, width: u32, candidates: Vec<Candidate>) -> FusionResult {
        let (value, decision) = self.fuse(width, &candidates);
        let distance = clamp_to_width(value, width);

        debug!(
            "Fusion chose {} via {} from {} candidates",
            distance,
            decision,
            candidates.len()
        );

        FusionResult {
            distance,
            image_width: width,
            decision,
            candidates,
        }
    }

    fn fuse(&self, width: u32, candidates: &[Candidate]) -> (f64, DecisionPath) {
        if candidates.is_empty() {
            return (self.config.fallback_ratio * width as f64, DecisionPath::Fallback);
        }

        match self.anchor(width, candidates) {
            Some(anchor) => self.fuse_with_anchor(width, anchor, candidates),
            None => self.weighted_vote(candidates),
        }
    }

    /// A verified piece candidate away from the image edges.
    fn anchor<'a>(&self, width: u32, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        let w = width as f64;
        let low = self.config.anchor_margin_ratio * w;
        let high = (1.0 - self.config.anchor_margin_ratio) * w;

        candidates.iter().find(|c| {
            let position = c.position as f64;
            c.method == AnalyzerKind::PuzzlePiece && c.verified && position > low && position < high
        })
    }

    fn fuse_with_anchor(
        &self,
        width: u32,
        anchor: &Candidate,
        candidates: &[Candidate],
    ) -> (f64, DecisionPath) {
        let anchor_pos = anchor.position as f64;
        let Some(color) = find(candidates, AnalyzerKind::ColorContrast) else {
            return (anchor_pos, DecisionPath::AnchorOnly);
        };

        let color_pos = color.position as f64;
        let diff = (anchor_pos - color_pos).abs();

        if diff <= self.config.consistent_band {
            (0.7 * anchor_pos + 0.3 * color_pos, DecisionPath::AnchorConsistent)
        } else if diff <= self.config.balanced_band {
            (0.5 * anchor_pos + 0.5 * color_pos, DecisionPath::AnchorBalanced)
        } else {
            let center = width as f64 / 2.0;
            let value = if (anchor_pos - center).abs() <= (color_pos - center).abs() {
                0.8 * anchor_pos + 0.2 * color_pos
            } else {
                0.8 * color_pos + 0.2 * anchor_pos
            };
            (value, DecisionPath::AnchorCenterBias)
        }
    }

    fn weighted_vote(&self, candidates: &[Candidate]) -> (f64, DecisionPath) {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for candidate in candidates {
            let weight = self.weight(candidate, candidates);
            weighted_sum += weight * candidate.position as f64;
            total_weight += weight;
        }
        let weighted = weighted_sum / total_weight;

        let positions: Vec<f64> = candidates.iter().map(|c| c.position as f64).collect();
        let median = profile::median(&positions).unwrap_or(weighted);

        if (weighted - median).abs() > self.config.outlier_band {
            debug!(
                "Weighted average {:.1} is {:.1}px from median {:.1}, using median",
                weighted,
                (weighted - median).abs(),
                median
            );
            (median, DecisionPath::MedianOverride)
        } else {
            (weighted, DecisionPath::WeightedVote)
        }
    }

    /// Base weight per analyzer; the piece loses weight when it disagrees
    /// with the mean of everyone else.
    pub fn weight(&self, candidate: &Candidate, candidates: &[Candidate]) -> f64 {
        match candidate.method {
            AnalyzerKind::EdgeDensity => self.config.edge_density_weight,
            AnalyzerKind::ColorContrast => self.config.color_contrast_weight,
            AnalyzerKind::ContourFallback => self.config.contour_fallback_weight,
            AnalyzerKind::PuzzlePiece => {
                let others: Vec<f64> = candidates
                    .iter()
                    .filter(|c| c.method != AnalyzerKind::PuzzlePiece)
                    .map(|c| c.position as f64)
                    .collect();
                if others.is_empty() {
                    return self.config.puzzle_piece_weight;
                }

                let mean = others.iter().sum::<f64>() / others.len() as f64;
                let dissent = (candidate.position as f64 - mean).abs();
                if dissent > self.config.dissent_hard {
                    self.config.puzzle_piece_hard_weight
                } else if dissent >= self.config.dissent_soft {
                    self.config.puzzle_piece_soft_weight
                } else {
                    self.config.puzzle_piece_weight
                }
            }
        }
    }
}

impl Default for FusionDecider {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

fn find(candidates: &[Candidate], kind: AnalyzerKind) -> Option<&Candidate> {
    candidates.iter().find(|c| c.method == kind)
}

fn clamp_to_width(value: f64, width: u32) -> u32 {
    let max = width.saturating_sub(1) as f64;
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, max) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(method: AnalyzerKind, position: i64, width: u32) -> Candidate {
        Candidate::new(method, position, 1.0, width).unwrap()
    }

    fn piece(position: i64, width: u32) -> Candidate {
        candidate(AnalyzerKind::PuzzlePiece, position, width).verified(true)
    }

    #[test]
    fn test_no_candidates_falls_back() {
        let result = FusionDecider::default().decide(300, vec![]);
        assert_eq!(result.distance, 90);
        assert_eq!(result.decision, DecisionPath::Fallback);

        let result = FusionDecider::default().decide(257, vec![]);
        assert_eq!(result.distance, 77); // 77.1
    }

    #[test]
    fn test_anchor_consistent_with_color() {
        let result = FusionDecider::default().decide(
            300,
            vec![
                piece(200, 300),
                candidate(AnalyzerKind::ColorContrast, 210, 300),
            ],
        );
        assert_eq!(result.distance, 203);
        assert_eq!(result.decision, DecisionPath::AnchorConsistent);
        assert_eq!(result.candidates.len(), 2);
    }

    #[test]
    fn test_anchor_balanced() {
        let result = FusionDecider::default().decide(
            300,
            vec![
                piece(200, 300),
                candidate(AnalyzerKind::ColorContrast, 160, 300),
                candidate(AnalyzerKind::EdgeDensity, 20, 300),
            ],
        );
        assert_eq!(result.distance, 180);
        assert_eq!(result.decision, DecisionPath::AnchorBalanced);
    }

    #[test]
    fn test_anchor_far_disagreement_leans_to_center() {
        // color 140 is closer to the center (150) than the anchor at 250
        let result = FusionDecider::default().decide(
            300,
            vec![
                piece(250, 300),
                candidate(AnalyzerKind::ColorContrast, 140, 300),
            ],
        );
        assert_eq!(result.distance, 162); // 0.8 * 140 + 0.2 * 250
        assert_eq!(result.decision, DecisionPath::AnchorCenterBias);

        let result = FusionDecider::default().decide(
            300,
            vec![
                piece(160, 300),
                candidate(AnalyzerKind::ColorContrast, 40, 300),
            ],
        );
        assert_eq!(result.distance, 136); // 0.8 * 160 + 0.2 * 40
    }

    #[test]
    fn test_anchor_without_color() {
        let result = FusionDecider::default().decide(
            300,
            vec![
                candidate(AnalyzerKind::EdgeDensity, 60, 300),
                piece(170, 300),
            ],
        );
        assert_eq!(result.distance, 170);
        assert_eq!(result.decision, DecisionPath::AnchorOnly);
    }

    #[test]
    fn test_piece_near_edge_is_not_an_anchor() {
        // 0.1 * 300 = 30 is excluded
        let result = FusionDecider::default().decide(
            300,
            vec![
                piece(30, 300),
                candidate(AnalyzerKind::ColorContrast, 40, 300),
            ],
        );
        assert_eq!(result.decision, DecisionPath::WeightedVote);
        // (3.0 * 30 + 2.5 * 40) / 5.5
        assert_eq!(result.distance, 35);
    }

    #[test]
    fn test_unverified_piece_is_not_an_anchor() {
        let result = FusionDecider::default().decide(
            300,
            vec![
                candidate(AnalyzerKind::PuzzlePiece, 150, 300),
                candidate(AnalyzerKind::EdgeDensity, 150, 300),
            ],
        );
        assert_eq!(result.decision, DecisionPath::WeightedVote);
        assert_eq!(result.distance, 150);
    }

    #[test]
    fn test_weighted_vote() {
        let result = FusionDecider::default().decide(
            300,
            vec![
                candidate(AnalyzerKind::EdgeDensity, 100, 300),
                candidate(AnalyzerKind::ColorContrast, 120, 300),
                candidate(AnalyzerKind::ContourFallback, 110, 300),
            ],
        );
        // (200 + 300 + 132) / 5.7 = 110.88
        assert_eq!(result.distance, 111);
        assert_eq!(result.decision, DecisionPath::WeightedVote);
    }

    #[test]
    fn test_outlier_protection_prefers_median() {
        let width = 1000;
        let result = FusionDecider::default().decide(
            width,
            vec![
                candidate(AnalyzerKind::EdgeDensity, 100, width),
                candidate(AnalyzerKind::ContourFallback, 105, width),
                piece(98, width),
                candidate(AnalyzerKind::ColorContrast, 400, width),
            ],
        );
        // weighted average ~212.5, median 102.5
        assert_eq!(result.decision, DecisionPath::MedianOverride);
        assert_eq!(result.distance, 103);
    }

    #[test]
    fn test_piece_weight_drops_with_dissent() {
        let decider = FusionDecider::default();
        let others = [
            candidate(AnalyzerKind::EdgeDensity, 100, 300),
            candidate(AnalyzerKind::ColorContrast, 110, 300),
        ];

        let close = piece(120, 300);
        let soft = piece(170, 300);
        let hard = piece(200, 300);

        let with = |p: &Candidate| {
            let mut all = others.to_vec();
            all.push(p.clone());
            decider.weight(p, &all)
        };
        assert_eq!(with(&close), 3.0);
        assert_eq!(with(&soft), 1.8);
        assert_eq!(with(&hard), 1.0);
        assert_eq!(decider.weight(&close, std::slice::from_ref(&close)), 3.0);
    }

    #[test]
    fn test_distance_is_clamped() {
        assert_eq!(clamp_to_width(-3.0, 100), 0);
        assert_eq!(clamp_to_width(100.4, 100), 99);
        assert_eq!(clamp_to_width(f64::NAN, 100), 0);
        assert_eq!(clamp_to_width(2.5, 100), 3);
    }
}
