//! The analyses run on each decoded upload. Every analysis turns a decoded
//! image into a report and never returns an error: failures become
//! unsuccessful reports that still carry the original image.

use crate::config::CONFIDENCE_THRESHOLD;
use crate::model::{Finding, ModelRegistry, Prediction};
use crate::upload::DecodedUpload;
use ab_glyph::FontVec;
use tracing::debug;

pub mod mock;
pub mod report;
mod soil_classify;
mod soil_detection;
mod vegetation;

pub use report::{ClassificationReport, CombinedReport, DetectionReport, FileReport, Segment};
pub use soil_classify::SOIL_CLASSES;

/// Runs analyses against the models held by a registry
pub struct Analyzer {
    registry: ModelRegistry,
    font: Option<FontVec>,
}

impl Analyzer {
    pub fn new(registry: ModelRegistry, font: Option<FontVec>) -> Self {
        Analyzer { registry, font }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn font(&self) -> Option<&FontVec> {
        self.font.as_ref()
    }

    /// Run all three analyses on the same decoded image
    pub fn combined(&self, upload: &DecodedUpload) -> CombinedReport {
        debug!("running combined analysis on {}", upload.filename);
        CombinedReport::new(
            &upload.filename,
            self.vegetation(upload),
            self.soil_detection(upload),
            self.soil_classification(upload),
        )
    }
}

/// Findings confident enough to report, in detection order
fn confident(prediction: Prediction) -> Vec<Finding> {
    prediction
        .findings
        .into_iter()
        .filter(|f| f.confidence >= CONFIDENCE_THRESHOLD)
        .collect()
}
