//! Deterministic stand-in for the soil classifier. The result is a pure
//! function of the filename, so repeated uploads of the same name always
//! get the same label and confidence without keeping any cache.

use super::soil_classify::SOIL_CLASSES;

/// Engine name reported for mock results
pub const MOCK_ENGINE: &str = "mock";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockClassification {
    pub label: &'static str,
    /// In `[0.6, 0.95)`
    pub confidence: f64,
}

fn filename_hash(filename: &str) -> u128 {
    u128::from_be_bytes(md5::compute(filename.as_bytes()).0)
}

pub fn classify(filename: &str) -> MockClassification {
    let hash = filename_hash(filename);
    MockClassification {
        label: SOIL_CLASSES[(hash % SOIL_CLASSES.len() as u128) as usize],
        confidence: 0.6 + (hash % 35) as f64 / 100.0,
    }
}
