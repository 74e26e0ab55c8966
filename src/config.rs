//! Service configuration, layered from defaults, an optional TOML file and
//! the environment

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Default log filter when `RUST_LOG` is not set
pub const RUST_LOG: &str = "archaimap=info,actix_web=info";

/// Environment variable naming the TOML settings file
pub const CONFIG_FILE_VAR: &str = "ARCHAIMAP_CONFIG";

/// Soil anomaly detection runs on images resized to this size
pub const SOIL_DETECTION_SIZE: (u32, u32) = (244, 244);

/// Soil classification runs on images resized to this size
pub const SOIL_CLASSIFIER_SIZE: (u32, u32) = (224, 224);

/// Longer side cap for classification annotations
pub const MAX_ANNOTATION_SIDE: u32 = 800;

/// Minimum confidence for a detection to be reported
pub const CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Square input resolution of the vegetation backend
pub const VEGETATION_INPUT_SIZE: u32 = 640;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Cap on the total size of one multipart upload
    pub max_upload_bytes: usize,
}

/// Where model weights are looked up
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelSettings {
    /// Install root that the conventional `models/weights` paths hang off
    pub root: PathBuf,
    #[serde(default)]
    pub vegetation: Option<PathBuf>,
    #[serde(default)]
    pub soil_detection: Option<PathBuf>,
    #[serde(default)]
    pub soil_classifier: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderSettings {
    /// TrueType font used for overlay text
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub models: ModelSettings,
    #[serde(default)]
    pub render: RenderSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let file = env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| "archaimap".into());

        let settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000_i64)?
            .set_default("server.max_upload_bytes", 200_i64 * 1024 * 1024)?
            .set_default("models.root", ".")?
            .add_source(File::with_name(&file).required(false))
            .add_source(
                Environment::with_prefix("ARCHAIMAP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("models.vegetation", env::var("VEGETATION_MODEL_PATH").ok())?
            .set_override_option(
                "models.soil_detection",
                env::var("SOIL_DETECTION_MODEL_PATH").ok(),
            )?
            .set_override_option(
                "models.soil_classifier",
                env::var("SOIL_CLASSIFIER_MODEL_PATH").ok(),
            )?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::load().unwrap();
        assert!(settings.server.max_upload_bytes > 0);
        assert!(!settings.bind_addr().is_empty());
    }
}
