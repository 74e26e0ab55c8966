//! Per-file outcomes, shaped the way clients receive them

use crate::annotate::BinaryMask;
use crate::error::AnalysisError;
use crate::model::{Finding, Region};
use serde::Serialize;

/// Something the batch loop can collect for each uploaded file
pub trait FileReport: Serialize {
    /// The entry for a file that never reached a backend
    fn rejected(filename: String, error: &AnalysisError) -> Self;

    fn success(&self) -> bool;
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// One detected object, as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    #[serde(rename = "class")]
    pub class_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
    /// Foreground pixels of the mask at image resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<usize>,
}

impl Segment {
    /// `size` is the size of the image the finding refers to
    pub fn from_finding(finding: &Finding, size: (u32, u32)) -> Self {
        let (bbox, area) = match &finding.region {
            Some(Region::BBox(bbox)) => (Some(*bbox), None),
            Some(Region::Mask(mask)) => (None, Some(BinaryMask::fit(mask, size.0, size.1).area())),
            None => (None, None),
        };
        Segment {
            class_id: finding.class_id,
            class_name: finding.class_name.clone(),
            confidence: finding.confidence,
            bbox,
            area,
        }
    }
}

/// Result of a vegetation or soil anomaly analysis
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionReport {
    pub filename: String,
    pub success: bool,
    pub uploaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<[u32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_size: Option<[u32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_loaded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
}

impl DetectionReport {
    pub(crate) fn new(filename: &str) -> Self {
        DetectionReport {
            filename: filename.to_string(),
            uploaded_at: now(),
            ..Default::default()
        }
    }

    pub(crate) fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segment_count = Some(segments.len());
        self.segments = Some(segments);
        self
    }

    /// Inference failed: keep the original image in both slots
    pub(crate) fn failed(filename: &str, original: &str, error: &AnalysisError) -> Self {
        DetectionReport {
            error: Some(error.to_string()),
            original_image: Some(original.to_string()),
            annotated_image: Some(original.to_string()),
            ..DetectionReport::new(filename)
        }
    }
}

impl FileReport for DetectionReport {
    fn rejected(filename: String, error: &AnalysisError) -> Self {
        DetectionReport {
            error: Some(error.to_string()),
            ..DetectionReport::new(&filename)
        }
    }

    fn success(&self) -> bool {
        self.success
    }
}

/// Result of a soil type classification
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassificationReport {
    pub filename: String,
    pub success: bool,
    pub uploaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassificationReport {
    pub(crate) fn failed(filename: &str, original: &str, error: &AnalysisError) -> Self {
        ClassificationReport {
            error: Some(error.to_string()),
            original_image: Some(original.to_string()),
            annotated_image: Some(original.to_string()),
            ..Self::rejected(filename.to_string(), error)
        }
    }
}

impl FileReport for ClassificationReport {
    fn rejected(filename: String, error: &AnalysisError) -> Self {
        ClassificationReport {
            filename,
            uploaded_at: now(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    fn success(&self) -> bool {
        self.success
    }
}

/// All three analyses of one file
#[derive(Debug, Clone, Default, Serialize)]
pub struct CombinedReport {
    pub filename: String,
    pub uploaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vegetation_analysis: Option<DetectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_detection_analysis: Option<DetectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_classification: Option<ClassificationReport>,
    /// True only when every analysis succeeded
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CombinedReport {
    pub fn new(
        filename: &str,
        vegetation: DetectionReport,
        soil_detection: DetectionReport,
        soil_classification: ClassificationReport,
    ) -> Self {
        let success = vegetation.success && soil_detection.success && soil_classification.success;
        CombinedReport {
            filename: filename.to_string(),
            uploaded_at: now(),
            vegetation_analysis: Some(vegetation),
            soil_detection_analysis: Some(soil_detection),
            soil_classification: Some(soil_classification),
            success,
            error: None,
        }
    }
}

impl FileReport for CombinedReport {
    fn rejected(filename: String, error: &AnalysisError) -> Self {
        CombinedReport {
            filename,
            uploaded_at: now(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    fn success(&self) -> bool {
        self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(success: bool) -> DetectionReport {
        DetectionReport {
            success,
            ..DetectionReport::new("x.png")
        }
    }

    fn classification(success: bool) -> ClassificationReport {
        ClassificationReport {
            success,
            ..ClassificationReport::default()
        }
    }

    #[test]
    fn test_combined_success_is_conjunction() {
        for mask in 0..8u8 {
            let (a, b, c) = (mask & 1 != 0, mask & 2 != 0, mask & 4 != 0);
            let combined = CombinedReport::new("x.png", detection(a), detection(b), classification(c));
            assert_eq!(combined.success(), a && b && c, "{a} {b} {c}");
        }
    }

    #[test]
    fn test_rejected_entry_has_no_images() {
        let report = DetectionReport::rejected("notes.txt".into(), &AnalysisError::UnsupportedFileType);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Invalid file type. Supported: JPG, PNG, WebP");
        assert!(json.get("original_image").is_none());
        assert!(json.get("segments").is_none());
    }

    #[test]
    fn test_segment_serialization() {
        let segment = Segment::from_finding(
            &Finding {
                class_id: 2,
                class_name: Some("shrub".into()),
                confidence: 0.5,
                region: Some(Region::BBox([1.0, 2.0, 3.0, 4.0])),
            },
            (10, 10),
        );
        let json = serde_json::to_value(&segment).unwrap();
        assert_eq!(json["class"], 2);
        assert_eq!(json["class_name"], "shrub");
        assert_eq!(json["bbox"][3], 4.0);
        assert!(json.get("area").is_none());
    }
}
