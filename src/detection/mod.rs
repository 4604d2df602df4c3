pub mod color_contrast;
pub mod config;
pub mod contour_fallback;
pub mod core;
pub mod edge_density;
pub mod enhance;
pub mod field;
pub mod fusion;
pub mod orchestrator;
pub mod profile;
pub mod puzzle_piece;
pub mod service;
pub mod template;

#[cfg(test)]
pub(crate) mod fixtures;

pub use color_contrast::ColorContrastAnalyzer;
pub use self::config::GapDetectionConfig;
pub use contour_fallback::ContourFallbackAnalyzer;
pub use self::core::{AnalyzerKind, Candidate, DecisionPath, FusionResult, GapAnalyzer};
pub use edge_density::EdgeDensityAnalyzer;
pub use field::ImageField;
pub use fusion::FusionDecider;
pub use orchestrator::GapDetector;
pub use puzzle_piece::PuzzlePieceAnalyzer;
pub use service::{GapDetectionService, GapRequest};
pub use template::SliderTemplateMatcher;
