//! Vegetation segmentation on the image at its native size

use super::{confident, Analyzer, DetectionReport, Segment};
use crate::annotate::annotate_detections;
use crate::encode::to_data_uri;
use crate::error::AnalysisError;
use crate::model::ModelKind;
use crate::upload::DecodedUpload;
use tracing::{error, warn};

const NO_DETECTION: &str = "No vegetation detected";

impl Analyzer {
    pub fn vegetation(&self, upload: &DecodedUpload) -> DetectionReport {
        let handle = self.registry.get(ModelKind::Vegetation);

        // Without a model the file is reported as failed, but still gets
        // its original image and the load diagnostics.
        let Some(backend) = handle.backend() else {
            warn!("vegetation model unavailable, returning {} as-is", upload.filename);
            return DetectionReport {
                success: false,
                original_image: Some(upload.original.clone()),
                annotated_image: Some(upload.original.clone()),
                note: Some("Model not available, returned original image".into()),
                model_loaded: Some(false),
                model_error: handle.error().map(String::from),
                model_path: handle.path().map(|p| p.display().to_string()),
                ..DetectionReport::new(&upload.filename)
            }
            .with_segments(vec![]);
        };

        let result = backend
            .infer(&upload.image)
            .map_err(|e| AnalysisError::Inference(format!("{e:#}")))
            .and_then(|prediction| {
                let findings = confident(prediction);
                let annotated =
                    annotate_detections(&upload.image, &findings, self.font(), Some(NO_DETECTION));
                let size = upload.image.dimensions();
                let segments = findings
                    .iter()
                    .map(|f| Segment::from_finding(f, size))
                    .collect::<Vec<_>>();
                Ok((segments, to_data_uri(&annotated)?))
            });

        match result {
            Ok((segments, annotated)) => DetectionReport {
                success: true,
                original_image: Some(upload.original.clone()),
                annotated_image: Some(annotated),
                ..DetectionReport::new(&upload.filename)
            }
            .with_segments(segments),
            Err(e) => {
                error!("vegetation analysis of {} failed: {e}", upload.filename);
                DetectionReport::failed(&upload.filename, &upload.original, &e)
            }
        }
    }
}
