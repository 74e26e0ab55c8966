//! Turns bitmaps into self-contained strings that can travel inside JSON

use crate::error::AnalysisError;
use base64::{engine::general_purpose, Engine as _};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Encode an image as a `data:image/png;base64,...` URI
pub fn to_data_uri(image: &RgbImage) -> Result<String, AnalysisError> {
    let mut png: Vec<u8> = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(format!(
        "{DATA_URI_PREFIX}{}",
        general_purpose::STANDARD.encode(png)
    ))
}

/// Decode a data URI produced by `to_data_uri` back into a bitmap
#[cfg(test)]
pub fn from_data_uri(uri: &str) -> Result<RgbImage, AnalysisError> {
    let payload = uri
        .strip_prefix(DATA_URI_PREFIX)
        .ok_or_else(|| AnalysisError::InvalidImage("not a PNG data URI".into()))?;
    let png = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| AnalysisError::InvalidImage(e.to_string()))?;
    let image = image::load_from_memory_with_format(&png, ImageFormat::Png)
        .map_err(|e| AnalysisError::InvalidImage(e.to_string()))?;
    Ok(image.to_rgb8())
}
