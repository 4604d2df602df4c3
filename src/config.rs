use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::detection::GapDetectionConfig;
use crate::error::GapError;

/// Environment variables override file values, e.g.
/// `GAPSCAN__DETECTION__FUSION__FALLBACK_RATIO=0.25`.
pub const ENV_PREFIX: &str = "GAPSCAN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub detection: GapDetectionConfig,
    /// Width assumed for the fallback distance when the image cannot be decoded.
    pub nominal_width: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            detection: GapDetectionConfig::default(),
            nominal_width: 300,
        }
    }
}

impl Configuration {
    /// Defaults, then the optional file, then `GAPSCAN__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, GapError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let configuration: Configuration = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        configuration
            .detection
            .validate()
            .map_err(GapError::InvalidConfig)?;
        if configuration.nominal_width == 0 {
            return Err(GapError::InvalidConfig(
                "nominal_width must be greater than 0".to_string(),
            ));
        }
        Ok(configuration)
    }
}

impl GapDetectionConfig {
    /// Load only the detection section.
    pub fn load(path: Option<&Path>) -> Result<Self, GapError> {
        Ok(Configuration::load(path)?.detection)
    }
}
