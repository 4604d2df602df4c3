//! Puzzle-piece analyzer.
//!
//! Stage A looks for the piece itself among the external contours of the
//! contrast-enhanced edge map and infers the gap from where the piece sits.
//! Stage B runs only when no contour qualifies: it scores every window of the
//! edge-density profile on a handful of gap-like features.
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::edges::canny;
use tracing::debug;

use super::config::PuzzlePieceConfig;
use super::core::{AnalyzerKind, Candidate, GapAnalyzer};
use super::enhance::clahe;
use super::field::ImageField;
use super::profile::{self, Extremum, WindowStats};
use crate::error::AnalyzerFailure;

/// Bounding box and area of a contour that looks like the piece.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PieceContour {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub area: f64,
}

impl PieceContour {
    fn from_contour(contour: &Contour<i32>) -> Option<Self> {
        let first = contour.points.first()?;
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
        for p in &contour.points {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }

        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
            area: polygon_area(contour),
        })
    }

    pub fn center_x(&self) -> f64 {
        self.x as f64 + self.width as f64 / 2.0
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Shoelace area of the closed contour polygon.
fn polygon_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }

    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice_area as f64 / 2.0).abs()
}

pub struct PuzzlePieceAnalyzer {
    config: PuzzlePieceConfig,
}

impl PuzzlePieceAnalyzer {
    pub fn new(config: PuzzlePieceConfig) -> Self {
        Self { config }
    }

    /// Largest external contour with piece-like area and aspect ratio.
    pub fn locate_piece(&self, edges: &GrayImage) -> Option<PieceContour> {
        let contours = find_contours::<i32>(edges);
        let mut best: Option<PieceContour> = None;

        for contour in contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        {
            let Some(piece) = PieceContour::from_contour(contour) else {
                continue;
            };
            let aspect = piece.aspect_ratio();
            if piece.area <= self.config.min_piece_area
                || aspect < self.config.min_aspect
                || aspect > self.config.max_aspect
            {
                continue;
            }
            if best.map_or(true, |b| piece.area > b.area) {
                best = Some(piece);
            }
        }
        best
    }

    /// Where the gap probably is, given the piece center.
    ///
    /// The gap tends to sit across the image from the piece: pieces in an
    /// outer third shift toward the middle, centered pieces jump to the
    /// quarter mark on the opposite half.
    pub fn infer_gap(&self, piece_center: f64, width: u32) -> f64 {
        let w = width as f64;
        let shift = self.config.side_shift_ratio * w;

        if piece_center < w / 3.0 {
            piece_center + shift
        } else if piece_center > 2.0 * w / 3.0 {
            piece_center - shift
        } else if piece_center < w / 2.0 {
            0.75 * w
        } else {
            0.25 * w
        }
    }

    fn direct_detection(
        &self,
        piece: PieceContour,
        width: u32,
    ) -> Result<Candidate, AnalyzerFailure> {
        let gap = self.infer_gap(piece.center_x(), width).round() as i64;
        let margin = self.config.edge_clearance;
        let limit = width.saturating_sub(margin);

        debug!(
            "Piece contour at x={} ({}x{}, area {:.0}) -> inferred gap {}",
            piece.x, piece.width, piece.height, piece.area, gap
        );

        if gap <= margin as i64 || gap >= limit as i64 {
            return Err(AnalyzerFailure::InferredGapOutOfRange {
                position: gap,
                margin,
                limit,
            });
        }

        Candidate::new(self.kind(), gap, piece.area, width).map(|c| c.verified(true))
    }

    /// Score windows across the edge map; verified only above `verify_score`.
    pub fn feature_scan(&self, edges: &GrayImage) -> Result<Candidate, AnalyzerFailure> {
        let (width, height) = edges.dimensions();
        let profile = edge_fraction_profile(edges);

        let window = self
            .config
            .min_scan_window
            .max(width / self.config.scan_window_divisor);
        let margin = (width as f64 * self.config.search_margin_ratio).round() as u32;
        let band = (margin, width.saturating_sub(margin));

        let weights = &self.config.weights;
        let flank = self.config.flank_width;
        let w = width as f64;

        let hit = profile::scan(
            &profile,
            band,
            window,
            self.config.scan_step,
            Extremum::Max,
            |start, values| {
                let stats = WindowStats::of(values);
                let start = start as i64;
                let end = start + window as i64;
                let half = window as i64 / 2;

                let boundary = (edge_strip_density(&profile, start, flank)
                    + edge_strip_density(&profile, end, flank))
                    / 2.0;
                let surround = (profile::range_mean(&profile, start - half, start)
                    + profile::range_mean(&profile, end, end + half))
                    / 2.0;
                let contrast = (surround - stats.mean).abs();

                let center = (start + half) as f64;
                let position = if center >= 0.2 * w && center <= 0.8 * w {
                    1.0
                } else {
                    0.0
                };

                weights.low_density * (1.0 - stats.mean).clamp(0.0, 1.0)
                    + weights.flatness * (1.0 - (stats.variance * weights.variance_scale).min(1.0))
                    + weights.boundary * boundary.min(1.0)
                    + weights.contrast * contrast.min(1.0)
                    + weights.position * position
            },
        )
        .ok_or(AnalyzerFailure::EmptySearchBand {
            analyzer: self.kind(),
            band: band.1.saturating_sub(band.0),
            window,
        })?;

        debug!(
            "Feature scan best window at x={} score {:.1} ({}x{} edge map)",
            hit.center, hit.score, width, height
        );

        if hit.score <= self.config.verify_score {
            return Err(AnalyzerFailure::Unverified {
                score: hit.score,
                threshold: self.config.verify_score,
            });
        }

        Candidate::new(self.kind(), hit.center as i64, hit.score, width).map(|c| c.verified(true))
    }
}

impl Default for PuzzlePieceAnalyzer {
    fn default() -> Self {
        Self::new(PuzzlePieceConfig::default())
    }
}

impl GapAnalyzer for PuzzlePieceAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::PuzzlePiece
    }

    fn analyze(&self, field: &ImageField) -> Result<Candidate, AnalyzerFailure> {
        let enhanced = clahe(
            field.gray(),
            self.config.clahe_tiles,
            self.config.clahe_clip_limit,
        );
        let edges = canny(&enhanced, self.config.canny_low, self.config.canny_high);

        match self.locate_piece(&edges) {
            Some(piece) => self.direct_detection(piece, field.width()),
            None => {
                debug!("No piece contour qualified, falling back to feature scan");
                self.feature_scan(&edges)
            }
        }
    }
}

/// Fraction of edge pixels in each column.
fn edge_fraction_profile(edges: &GrayImage) -> Vec<f64> {
    let (width, height) = edges.dimensions();
    let mut profile = vec![0f64; width as usize];
    for (x, _, pixel) in edges.enumerate_pixels() {
        if pixel.0[0] > 0 {
            profile[x as usize] += 1.0;
        }
    }

    let height = height.max(1) as f64;
    profile.iter_mut().for_each(|v| *v /= height);
    profile
}

/// Mean edge fraction of the `width`-column strip centered on `edge`.
fn edge_strip_density(profile: &[f64], edge: i64, width: u32) -> f64 {
    let from = edge - width as i64 / 2;
    profile::range_mean(profile, from, from + width as i64)
}
