//! Inference backends, what they return, and the registry that lazily loads
//! one backend per analysis kind

use anyhow::Result;
use image::{GrayImage, RgbImage};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

mod registry;
#[cfg(feature = "torch")]
pub mod torch;

pub use registry::{candidate_paths, ModelHandle, ModelRegistry, ModelState, ModelStatus};

/// The three analyses the service can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Vegetation,
    SoilDetection,
    SoilClassifier,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::Vegetation,
        ModelKind::SoilDetection,
        ModelKind::SoilClassifier,
    ];

    /// Environment variable that overrides the weights location
    pub fn env_var(&self) -> &'static str {
        match self {
            ModelKind::Vegetation => "VEGETATION_MODEL_PATH",
            ModelKind::SoilDetection => "SOIL_DETECTION_MODEL_PATH",
            ModelKind::SoilClassifier => "SOIL_CLASSIFIER_MODEL_PATH",
        }
    }

    /// Conventional weights file name
    pub fn weights_file(&self) -> &'static str {
        match self {
            ModelKind::Vegetation => "vegetation_best.pt",
            ModelKind::SoilDetection => "soil_detection_best.pt",
            ModelKind::SoilClassifier => "soil_classifier.pt",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Vegetation => "vegetation",
            ModelKind::SoilDetection => "soil detection",
            ModelKind::SoilClassifier => "soil classifier",
        };
        write!(f, "{name}")
    }
}

/// Where a finding sits in the image
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// `[x_min, y_min, x_max, y_max]` in pixels of the image given to the backend
    BBox([f32; 4]),
    /// Per-pixel foreground probability (0-255), at the backend's own
    /// resolution
    Mask(GrayImage),
}

/// A single detected or classified object
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub class_id: u32,
    pub class_name: Option<String>,
    /// In `[0, 1]`
    pub confidence: f32,
    /// `None` for whole-image classification
    pub region: Option<Region>,
}

/// The output of a model's inference, in detection order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prediction {
    pub findings: Vec<Finding>,
}

/// A loaded model that can run inference on a normalized RGB bitmap
pub trait Backend: Send + Sync {
    fn infer(&self, image: &RgbImage) -> Result<Prediction>;

    /// Name of the inference engine, reported to clients
    fn engine(&self) -> &str;
}

/// Turns a weights file into a backend
pub trait BackendFactory: Send + Sync {
    fn load(&self, kind: ModelKind, path: &Path) -> Result<Arc<dyn Backend>>;
}

/// The factory used when the crate is built without an inference engine.
/// Every load fails, so every analysis takes its fallback path.
#[derive(Debug, Default)]
pub struct NoEngine;

impl BackendFactory for NoEngine {
    fn load(&self, kind: ModelKind, path: &Path) -> Result<Arc<dyn Backend>> {
        Err(anyhow::anyhow!(
            "cannot load {kind} model from {}: built without the `torch` feature",
            path.display()
        ))
    }
}

/// The factory matching the enabled cargo features
pub fn default_factory() -> Arc<dyn BackendFactory> {
    #[cfg(feature = "torch")]
    {
        Arc::new(torch::TorchFactory)
    }
    #[cfg(not(feature = "torch"))]
    {
        Arc::new(NoEngine)
    }
}
