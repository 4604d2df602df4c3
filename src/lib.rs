pub mod config;
pub mod detection;
pub mod error;
pub mod payload;

pub use self::config::Configuration;
pub use error::{AnalyzerFailure, DecodeError, GapError};

pub use detection::{
    AnalyzerKind, Candidate, DecisionPath, FusionDecider, FusionResult, GapAnalyzer,
    GapDetectionConfig, GapDetectionService, GapDetector, GapRequest, ImageField,
};
pub use payload::{SlideRequest, SlideResponse};
