use thiserror::Error;

use crate::detection::AnalyzerKind;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum GapError {
    #[error("Decode Error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Config Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("no background image supplied")]
    MissingBackground,
    #[error("Detection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed request: {0}")]
    Json(#[from] serde_json::Error),
}

// Image / payload decoding. Fatal for the request.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Image has zero extent ({0}x{1})")]
    EmptyImage(u32, u32),
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Image payload too small: {0} bytes")]
    PayloadTooSmall(usize),
}

// A single analyzer could not produce a candidate. Recovered locally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerFailure {
    #[error("{analyzer}: search band too narrow ({band}px) for a {window}px window")]
    EmptySearchBand {
        analyzer: AnalyzerKind,
        band: u32,
        window: u32,
    },
    #[error("{0}: score is not finite")]
    NonFiniteScore(AnalyzerKind),
    #[error("{analyzer}: position {position} outside [0, {width})")]
    OutOfBounds {
        analyzer: AnalyzerKind,
        position: i64,
        width: u32,
    },
    #[error("inferred gap {position} outside ({margin}, {limit})")]
    InferredGapOutOfRange { position: i64, margin: u32, limit: u32 },
    #[error("best window score {score:.1} does not clear {threshold:.1}")]
    Unverified { score: f64, threshold: f64 },
    #[error("{0}: analysis task aborted")]
    Aborted(AnalyzerKind),
}

// Why a slider template could not be placed on the background.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateMismatch {
    #[error("slider is fully transparent")]
    EmptySlider,
    #[error("slider has no edges to match")]
    NoEdges,
    #[error("slider {slider_width}x{slider_height} does not fit background {width}x{height}")]
    SliderTooLarge {
        slider_width: u32,
        slider_height: u32,
        width: u32,
        height: u32,
    },
    #[error("best match score {score:.3} below {threshold:.3}")]
    LowScore { score: f32, threshold: f32 },
}
