//! Soil type classification. When the classifier is unavailable a
//! deterministic mock answers instead, so this analysis only fails when a
//! loaded model errors.

use super::mock::{self, MOCK_ENGINE};
use super::{Analyzer, ClassificationReport};
use crate::annotate::annotate_classification;
use crate::config::SOIL_CLASSIFIER_SIZE;
use crate::encode::to_data_uri;
use crate::error::AnalysisError;
use crate::model::{Backend, ModelKind};
use crate::upload::DecodedUpload;
use image::imageops::{self, FilterType};
use std::sync::Arc;
use tracing::{debug, error};

/// Classifier output labels, indexed by class id
pub const SOIL_CLASSES: [&str; 4] = ["Alluvial Soil", "Black Soil", "Clay Soil", "Red Soil"];

/// Label, confidence and engine name of one classification
type Classified = (String, f64, String);

fn classify(backend: &Arc<dyn Backend>, upload: &DecodedUpload) -> Result<Classified, AnalysisError> {
    let (w, h) = SOIL_CLASSIFIER_SIZE;
    let input = imageops::resize(&upload.image, w, h, FilterType::Lanczos3);
    let prediction = backend
        .infer(&input)
        .map_err(|e| AnalysisError::Inference(format!("{e:#}")))?;

    let best = prediction
        .findings
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .ok_or_else(|| AnalysisError::Inference("classifier returned no prediction".into()))?;

    let label = SOIL_CLASSES
        .get(best.class_id as usize)
        .map(|l| l.to_string())
        .or_else(|| best.class_name.clone())
        .ok_or_else(|| AnalysisError::Inference(format!("unknown soil class {}", best.class_id)))?;

    Ok((label, best.confidence as f64, backend.engine().to_string()))
}

impl Analyzer {
    pub fn soil_classification(&self, upload: &DecodedUpload) -> ClassificationReport {
        let handle = self.registry.get(ModelKind::SoilClassifier);

        let classified = match handle.backend() {
            Some(backend) => classify(backend, upload),
            None => {
                let result = mock::classify(&upload.filename);
                debug!("mock classification for {}: {result:?}", upload.filename);
                Ok((result.label.to_string(), result.confidence, MOCK_ENGINE.to_string()))
            }
        };

        let result = classified.and_then(|(label, confidence, engine)| {
            let annotated = annotate_classification(&upload.image, &label, confidence, self.font());
            Ok(ClassificationReport {
                filename: upload.filename.clone(),
                success: true,
                uploaded_at: super::report::now(),
                soil_type: Some(label),
                confidence: Some(confidence),
                original_image: Some(upload.original.clone()),
                annotated_image: Some(to_data_uri(&annotated)?),
                model: Some(engine),
                error: None,
            })
        });

        result.unwrap_or_else(|e| {
            error!("soil classification of {} failed: {e}", upload.filename);
            ClassificationReport::failed(&upload.filename, &upload.original, &e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelSettings;
    use crate::model::{Finding, ModelRegistry, Prediction};
    use crate::testutil::{png_bytes, weights_file, BrokenBackend, FakeFactory, FixedBackend};
    use crate::upload::UploadedImage;

    fn analyzer(factory: FakeFactory, weights: Option<&str>) -> Analyzer {
        let settings = ModelSettings {
            root: "/nonexistent".into(),
            soil_classifier: weights.map(weights_file),
            ..Default::default()
        };
        Analyzer::new(ModelRegistry::new(settings, Arc::new(factory)), None)
    }

    fn class(class_id: u32, confidence: f32) -> Finding {
        Finding {
            class_id,
            class_name: None,
            confidence,
            region: None,
        }
    }

    #[test]
    fn test_mock_when_model_missing() {
        let analyzer = analyzer(FakeFactory::failing(), None);
        let upload = UploadedImage::new("photo.png", png_bytes(16, 16)).prepare().unwrap();
        let first = analyzer.soil_classification(&upload);
        let second = analyzer.soil_classification(&upload);

        assert!(first.success);
        assert_eq!(first.model.as_deref(), Some("mock"));
        assert_eq!(first.soil_type.as_deref(), Some("Black Soil"));
        let confidence = first.confidence.unwrap();
        assert!((0.6..0.95).contains(&confidence));
        assert!(first.original_image.is_some() && first.annotated_image.is_some());
        assert_eq!(
            (first.soil_type, first.confidence),
            (second.soil_type, second.confidence)
        );
    }

    #[test]
    fn test_model_picks_best_class() {
        let prediction = Prediction {
            findings: vec![class(0, 0.1), class(3, 0.7), class(2, 0.2)],
        };
        let analyzer = analyzer(FakeFactory::serving(FixedBackend(prediction)), Some("soil_cls.pt"));
        let upload = UploadedImage::new("x.jpeg", png_bytes(900, 300)).prepare().unwrap();
        let report = analyzer.soil_classification(&upload);
        assert!(report.success);
        assert_eq!(report.soil_type.as_deref(), Some("Red Soil"));
        assert_eq!(report.model.as_deref(), Some("fake"));
        assert!((report.confidence.unwrap() - 0.7).abs() < 1e-6);
        let annotated = crate::encode::from_data_uri(&report.annotated_image.unwrap()).unwrap();
        assert_eq!(annotated.dimensions(), (800, 266));
    }

    #[test]
    fn test_empty_prediction_fails() {
        let analyzer = analyzer(
            FakeFactory::serving(FixedBackend(Prediction::default())),
            Some("soil_cls_empty.pt"),
        );
        let upload = UploadedImage::new("x.png", png_bytes(8, 8)).prepare().unwrap();
        let report = analyzer.soil_classification(&upload);
        assert!(!report.success);
        assert_eq!(report.original_image, report.annotated_image);
    }

    #[test]
    fn test_broken_model_fails() {
        let analyzer = analyzer(FakeFactory::serving(BrokenBackend), Some("soil_cls_broken.pt"));
        let upload = UploadedImage::new("x.png", png_bytes(8, 8)).prepare().unwrap();
        let report = analyzer.soil_classification(&upload);
        assert!(!report.success);
        assert!(report.model.is_none());
        assert_eq!(report.error.as_deref(), Some("tensor shape mismatch"));
    }
}
