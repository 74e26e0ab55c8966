//! The user-facing JSON web server. Each analysis endpoint accepts a
//! multipart batch of images and answers with one entry per file.

use crate::error::AnalysisError;
use actix_multipart::form::MultipartFormConfig;
use actix_multipart::MultipartError;
use actix_web::error::{BlockingError, ResponseError};
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use std::collections::HashMap;

pub mod protocol;
pub mod routes;

#[derive(Debug)]
pub struct WebError {
    err: anyhow::Error,
    status: StatusCode,
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        let err = HashMap::from([("errors", vec![self.to_string()])]);

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(err)
    }

    fn status_code(&self) -> StatusCode {
        self.status
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> WebError {
        WebError {
            err,
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AnalysisError> for WebError {
    fn from(err: AnalysisError) -> Self {
        let status = match err {
            AnalysisError::EmptyBatch | AnalysisError::UnsupportedFileType => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        WebError {
            err: err.into(),
            status,
        }
    }
}

impl From<BlockingError> for WebError {
    fn from(err: BlockingError) -> Self {
        WebError {
            err: anyhow::anyhow!("analysis worker failed: {err}"),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Multipart failures keep the JSON error shape. A form with no parts at all
/// is an empty batch.
fn multipart_error(err: MultipartError, _req: &HttpRequest) -> actix_web::Error {
    let err = match err {
        MultipartError::Incomplete => WebError::from(AnalysisError::EmptyBatch),
        err => WebError {
            status: err.status_code(),
            err: anyhow::anyhow!("{err}"),
        },
    };
    err.into()
}

/// Register every route, with uploads capped at `max_upload_bytes`
pub fn configure(cfg: &mut web::ServiceConfig, max_upload_bytes: usize) {
    cfg.app_data(
        MultipartFormConfig::default()
            .total_limit(max_upload_bytes)
            .memory_limit(max_upload_bytes)
            .error_handler(multipart_error),
    )
    .service(routes::index)
    .service(routes::health)
    .service(routes::vegetation)
    .service(routes::soil_detection)
    .service(routes::soil_classify)
    .service(routes::combined)
    .service(routes::vegetation_status)
    .service(routes::soil_detection_status)
    .service(routes::soil_classify_status);
}
