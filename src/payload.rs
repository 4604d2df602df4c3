//! JSON request/response shapes for callers that ship images as base64.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::detection::{FusionResult, GapRequest};
use crate::error::{DecodeError, GapError};

/// Anything shorter cannot be a real captcha image.
pub const MIN_PAYLOAD_BYTES: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct SlideRequest {
    /// Base64 background, optionally as a `data:image/...;base64,` URL.
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub slider: Option<String>,
}

impl SlideRequest {
    pub fn into_gap_request(self) -> Result<GapRequest, GapError> {
        if self.background.trim().is_empty() {
            return Err(GapError::MissingBackground);
        }

        let mut request = GapRequest::new(decode_image_payload(&self.background)?);
        if let Some(slider) = self.slider.filter(|s| !s.trim().is_empty()) {
            request = request.with_slider(decode_image_payload(&slider)?);
        }
        Ok(request)
    }
}

/// Strip an optional data-URL header and base64-decode the rest.
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let encoded = match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    };
    let bytes = STANDARD.decode(encoded.trim())?;
    if bytes.len() < MIN_PAYLOAD_BYTES {
        return Err(DecodeError::PayloadTooSmall(bytes.len()));
    }
    Ok(bytes)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SlideResponse {
    pub fn found(distance: u32) -> Self {
        Self {
            success: true,
            distance: Some(distance),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            distance: None,
            error: Some(error.to_string()),
        }
    }
}

/// Distance reported when the image itself is unusable.
pub fn fallback_distance(nominal_width: u32) -> u32 {
    (0.3 * nominal_width as f64).round() as u32
}

/// Turn a detection outcome into the caller-facing response.
///
/// Undecodable image data still yields a guess at the nominal fallback
/// distance; only a missing background or a broken detector is a failure.
pub fn respond(
    outcome: Result<FusionResult, GapError>,
    nominal_width: u32,
) -> SlideResponse {
    match outcome {
        Ok(result) => SlideResponse::found(result.distance),
        Err(GapError::Decode(e)) => {
            warn!("Image unusable ({}), answering with fallback distance", e);
            SlideResponse::found(fallback_distance(nominal_width))
        }
        Err(e) => SlideResponse::failed(e),
    }
}
