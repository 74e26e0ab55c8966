use crate::upload::UploadedImage;
use actix_multipart::form::bytes::Bytes;
use actix_multipart::form::MultipartForm;
use serde::Serialize;

/// A multipart batch: every part named `files` is one upload
#[derive(MultipartForm)]
pub struct UploadForm {
    pub files: Vec<Bytes>,
}

impl UploadForm {
    pub fn into_uploads(self) -> Vec<UploadedImage> {
        self.files
            .into_iter()
            .map(|part| UploadedImage {
                filename: part.file_name,
                bytes: part.data.to_vec(),
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}
