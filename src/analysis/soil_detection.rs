//! Soil anomaly detection on a fixed-size copy of the image

use super::{confident, Analyzer, DetectionReport, Segment};
use crate::annotate::annotate_detections;
use crate::config::SOIL_DETECTION_SIZE;
use crate::encode::to_data_uri;
use crate::error::AnalysisError;
use crate::model::ModelKind;
use crate::upload::DecodedUpload;
use image::imageops::{self, FilterType};
use tracing::{error, warn};

impl Analyzer {
    pub fn soil_detection(&self, upload: &DecodedUpload) -> DetectionReport {
        let (width, height) = upload.image.dimensions();
        let (target_w, target_h) = SOIL_DETECTION_SIZE;
        let resized = imageops::resize(&upload.image, target_w, target_h, FilterType::Lanczos3);
        let sized = DetectionReport {
            original_size: Some([width, height]),
            processed_size: Some([target_w, target_h]),
            original_image: Some(upload.original.clone()),
            ..DetectionReport::new(&upload.filename)
        };

        let handle = self.registry.get(ModelKind::SoilDetection);
        let result = match handle.backend() {
            // Unlike vegetation, a missing model still counts as success
            None => {
                warn!("soil detection model unavailable, returning resized {}", upload.filename);
                to_data_uri(&resized).map(|annotated| DetectionReport {
                    success: true,
                    annotated_image: Some(annotated),
                    note: Some("Model not available, returned resized image".into()),
                    ..sized.clone()
                }
                .with_segments(vec![]))
            }
            Some(backend) => backend
                .infer(&resized)
                .map_err(|e| AnalysisError::Inference(format!("{e:#}")))
                .and_then(|prediction| {
                    let findings = confident(prediction);
                    let segments = findings
                        .iter()
                        .map(|f| Segment::from_finding(f, SOIL_DETECTION_SIZE))
                        .collect::<Vec<_>>();
                    let annotated = annotate_detections(&resized, &findings, self.font(), None);
                    let annotated = imageops::resize(&annotated, width, height, FilterType::Lanczos3);
                    Ok(DetectionReport {
                        success: true,
                        annotated_image: Some(to_data_uri(&annotated)?),
                        ..sized.clone()
                    }
                    .with_segments(segments))
                }),
        };

        result.unwrap_or_else(|e| {
            error!("soil detection of {} failed: {e}", upload.filename);
            DetectionReport::failed(&upload.filename, &upload.original, &e)
        })
    }
}
