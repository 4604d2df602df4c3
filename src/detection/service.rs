use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::join_all;
use image::DynamicImage;
use tower::Service;
use tracing::{info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::core::FusionResult;
use super::field::ImageField;
use super::orchestrator::{decode_slider, run_analyzer, AnalyzerOutcome, GapDetector};
use crate::error::{AnalyzerFailure, DecodeError, GapError};

/// Raw image bytes for one detection request.
#[derive(Debug, Clone)]
pub struct GapRequest {
    pub background: Vec<u8>,
    pub slider: Option<Vec<u8>>,
}

impl GapRequest {
    pub fn new(background: Vec<u8>) -> Self {
        Self {
            background,
            slider: None,
        }
    }

    pub fn with_slider(mut self, slider: Vec<u8>) -> Self {
        self.slider = Some(slider);
        self
    }
}

/// Tower service that fans the analyzers out over blocking tasks.
///
/// The decoded field is shared read-only through an `Arc`; the only
/// synchronization point is the join before fusion.
#[derive(Clone)]
pub struct GapDetectionService {
    detector: Arc<GapDetector>,
}

impl GapDetectionService {
    pub fn new(detector: GapDetector) -> Self {
        Self {
            detector: Arc::new(detector),
        }
    }

    pub fn detector(&self) -> &GapDetector {
        &self.detector
    }
}

impl Service<GapRequest> for GapDetectionService {
    type Response = FusionResult;
    type Error = GapError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GapRequest) -> Self::Future {
        let detector = self.detector.clone();
        let span = info_span!(
            "gap_request",
            id = %Uuid::new_v4(),
            bytes = req.background.len(),
            slider = req.slider.is_some()
        );

        Box::pin(detect_parallel(detector, req).instrument(span))
    }
}

async fn detect_parallel(
    detector: Arc<GapDetector>,
    req: GapRequest,
) -> Result<FusionResult, GapError> {
    let GapRequest { background, slider } = req;
    let (field, slider) = in_span(move || decode(&background, slider.as_deref())).await??;
    let field = Arc::new(field);

    if let Some(slider) = slider {
        let (detector, field) = (detector.clone(), field.clone());
        if let Some(result) = in_span(move || detector.match_slider(&field, &slider)).await? {
            return Ok(result);
        }
    }

    let tasks = detector.primary_analyzers().iter().map(|analyzer| {
        let analyzer = Arc::clone(analyzer);
        let field = Arc::clone(&field);
        let kind = analyzer.kind();
        async move {
            match in_span(move || run_analyzer(analyzer.as_ref(), &field)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("{} task aborted: {}", kind, e);
                    (kind, Err(AnalyzerFailure::Aborted(kind)))
                }
            }
        }
    });
    let outcomes: Vec<AnalyzerOutcome> = join_all(tasks).await;

    let result = in_span(move || detector.settle(&field, outcomes)).await?;
    Ok(result)
}

fn decode(
    background: &[u8],
    slider: Option<&[u8]>,
) -> Result<(ImageField, Option<DynamicImage>), DecodeError> {
    let field = ImageField::from_bytes(background)?;
    Ok((field, slider.and_then(decode_slider)))
}

/// `spawn_blocking` that keeps the caller's tracing span.
async fn in_span<F, T>(f: F) -> Result<T, tokio::task::JoinError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::core::DecisionPath;
    use crate::detection::{fixtures, GapDetectionConfig};
    use image::{imageops, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tower::ServiceExt;

    fn service() -> GapDetectionService {
        GapDetectionService::new(GapDetector::new(GapDetectionConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_service_matches_sequential_detection() {
        let bytes = fixtures::encode_png(&fixtures::captcha_with_gap(300, 150, 180, 42));
        let mut service = service();

        let parallel = service.call(GapRequest::new(bytes.clone())).await.unwrap();
        let sequential = service.detector().detect_gap(&bytes).unwrap();
        assert_eq!(parallel, sequential);
    }

    #[tokio::test]
    async fn test_service_reports_decode_error() {
        let result = service()
            .oneshot(GapRequest::new(b"\x89PNG broken".to_vec()))
            .await;
        assert!(matches!(result, Err(GapError::Decode(_))));
    }

    #[tokio::test]
    async fn test_service_uses_slider_when_supplied() {
        let background = fixtures::background_with_piece(300, 150, 170, 50, 40);
        let slider = imageops::crop_imm(&background, 165, 45, 50, 50).to_image();

        let result = service()
            .oneshot(
                GapRequest::new(fixtures::encode_png(&background))
                    .with_slider(fixtures::encode_png(&slider)),
            )
            .await
            .unwrap();
        assert_eq!(result.decision, DecisionPath::TemplateMatch);
        assert_eq!(result.distance, 165);
    }

    #[tokio::test]
    async fn test_corrupt_slider_does_not_fail_request() {
        let bytes = fixtures::encode_png(&fixtures::captcha_with_gap(300, 150, 180, 42));
        let mut service = service();

        let result = service
            .call(GapRequest::new(bytes.clone()).with_slider(b"not an image at all".to_vec()))
            .await
            .unwrap();
        let background_only = service.detector().detect_gap(&bytes).unwrap();
        assert_eq!(result, background_only);
    }

    #[tokio::test]
    async fn test_featureless_slider_falls_back_to_fusion() {
        let background = fixtures::captcha_with_gap(300, 150, 180, 42);
        let mut slider = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 30, Rgb([5, 5, 5])))
            .write_to(&mut slider, ImageFormat::Png)
            .unwrap();

        let result = service()
            .oneshot(
                GapRequest::new(fixtures::encode_png(&background))
                    .with_slider(slider.into_inner()),
            )
            .await
            .unwrap();
        assert_ne!(result.decision, DecisionPath::TemplateMatch);
        assert!(result.distance < 300);
    }
}
