//! Uploaded files: the extension gate and decoding into RGB bitmaps

use crate::encode::to_data_uri;
use crate::error::AnalysisError;
use image::RgbImage;
use std::fmt::Debug;
use std::path::Path;

/// Extensions accepted before any bytes are looked at
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// A file as received from the client
pub struct UploadedImage {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

impl Debug for UploadedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UploadedImage {{ filename: {:?}, bytes: <{} bytes> }}",
            self.filename,
            self.bytes.len()
        )
    }
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: Some(filename.into()),
            bytes,
        }
    }

    /// The filename reported back to the client
    pub fn display_name(&self) -> String {
        self.filename.clone().unwrap_or_default()
    }
}

/// An upload that passed the gate and decoded cleanly
#[derive(Debug, Clone)]
pub struct DecodedUpload {
    pub filename: String,
    pub image: RgbImage,
    /// The decoded image as a data URI, computed once per file
    pub original: String,
}

/// Whether the filename carries one of the allowed image extensions.
/// Magic bytes are not checked here.
pub fn is_allowed_filename(filename: Option<&str>) -> bool {
    let Some(name) = filename else {
        return false;
    };
    Path::new(&name.to_lowercase())
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Decode raw bytes into an RGB bitmap, dropping any alpha channel
pub fn decode(bytes: &[u8]) -> Result<RgbImage, AnalysisError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| AnalysisError::InvalidImage(e.to_string()))
}

impl UploadedImage {
    /// Run the extension gate and the decoder on this upload
    pub fn prepare(&self) -> Result<DecodedUpload, AnalysisError> {
        if !is_allowed_filename(self.filename.as_deref()) {
            return Err(AnalysisError::UnsupportedFileType);
        }
        let image = decode(&self.bytes)?;
        let original = to_data_uri(&image)?;
        Ok(DecodedUpload {
            filename: self.display_name(),
            image,
            original,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::png_bytes;

    #[test]
    fn test_allowed_extensions() {
        for name in ["a.jpg", "b.JPEG", "dir.v2/c.Png", "d.webp"] {
            assert!(is_allowed_filename(Some(name)), "{name}");
        }
    }

    #[test]
    fn test_rejected_extensions() {
        for name in ["notes.txt", "archive.png.zip", "jpg", "", ".png.gif", "image."] {
            assert!(!is_allowed_filename(Some(name)), "{name}");
        }
        assert!(!is_allowed_filename(None));
    }

    #[test]
    fn test_prepare_rejects_before_decoding() {
        let upload = UploadedImage::new("photo.bmp", png_bytes(4, 4));
        assert_eq!(
            upload.prepare().unwrap_err(),
            AnalysisError::UnsupportedFileType
        );
    }

    #[test]
    fn test_prepare_reports_garbage_bytes() {
        let upload = UploadedImage::new("bad.jpg", b"this is a text file".to_vec());
        let err = upload.prepare().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidImage(_)));
        assert!(err.to_string().starts_with("Invalid image"));
    }

    #[test]
    fn test_prepare_decodes_png() {
        let decoded = UploadedImage::new("field.png", png_bytes(6, 3)).prepare().unwrap();
        assert_eq!(decoded.filename, "field.png");
        assert_eq!(decoded.image.dimensions(), (6, 3));
        assert!(decoded.original.starts_with("data:image/png;base64,"));
    }
}
