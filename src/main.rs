use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use tower::ServiceExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gapscan::payload::{self, SlideRequest, SlideResponse};
use gapscan::{
    Candidate, Configuration, DecisionPath, GapDetectionService, GapDetector, GapError, GapRequest,
};

#[derive(Parser, Debug)]
#[command(name = "gapscan")]
#[command(about = "Locate the puzzle gap in a slide-captcha background")]
#[command(version)]
struct Args {
    /// Background image file
    #[arg(required_unless_present = "payload", conflicts_with = "payload")]
    background: Option<PathBuf>,

    /// JSON request with base64 `background` and optional `slider`
    #[arg(long)]
    payload: Option<PathBuf>,

    /// Slider piece image, matched against the background when given
    #[arg(long, conflicts_with = "payload")]
    slider: Option<PathBuf>,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "GAPSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Rendered slider track width; without it the drag distance is the
    /// image distance capped at 80% of the image width
    #[arg(long)]
    track_width: Option<f64>,

    #[arg(short, long)]
    verbose: bool,

    /// Include the decision path and every candidate in the output
    #[arg(long)]
    explain: bool,
}

#[derive(Serialize)]
struct Output {
    #[serde(flatten)]
    response: SlideResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    drag_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<DecisionPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidates: Option<Vec<Candidate>>,
}

impl Output {
    fn bare(response: SlideResponse) -> Self {
        Self {
            response,
            drag_distance: None,
            decision: None,
            candidates: None,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_request(args: &Args) -> Result<GapRequest, GapError> {
    if let Some(path) = &args.payload {
        let request: SlideRequest = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        return request.into_gap_request();
    }

    let mut request = match &args.background {
        Some(path) => GapRequest::new(std::fs::read(path)?),
        None => return Err(GapError::MissingBackground),
    };
    if let Some(slider) = &args.slider {
        request = request.with_slider(std::fs::read(slider)?);
    }
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<(), GapError> {
    let args = Args::parse();
    init_logging(args.verbose);

    let configuration = Configuration::load(args.config.as_deref())?;
    debug!("Loaded configuration: {:?}", configuration);
    let nominal_width = configuration.nominal_width;

    let outcome = match build_request(&args) {
        Ok(request) => {
            let service = GapDetectionService::new(GapDetector::new(configuration.detection)?);
            service.oneshot(request).await
        }
        // bad image data still gets an answer; unreadable input files do not
        Err(e @ (GapError::Decode(_) | GapError::MissingBackground)) => Err(e),
        Err(e) => return Err(e),
    };

    let output = match outcome {
        Ok(result) => {
            info!(
                "Distance {} (stage {} {})",
                result.distance,
                result.decision.stage(),
                result.decision
            );
            let response = SlideResponse::found(result.distance);
            let drag_distance = Some(result.drag_distance(args.track_width));
            if args.explain {
                Output {
                    response,
                    drag_distance,
                    decision: Some(result.decision),
                    candidates: Some(result.candidates),
                }
            } else {
                Output {
                    drag_distance,
                    ..Output::bare(response)
                }
            }
        }
        Err(e) => Output::bare(payload::respond(Err(e), nominal_width)),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
