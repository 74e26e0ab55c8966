//! Route handlers. Analyses are CPU-bound, so each batch runs on the
//! blocking thread pool.

use super::protocol::{Health, ServiceInfo, UploadForm};
use super::WebError;
use crate::analysis::{Analyzer, FileReport};
use crate::batch::{run_batch, BatchResult};
use crate::model::ModelKind;
use crate::upload::DecodedUpload;
use actix_multipart::form::MultipartForm;
use actix_web::{get, post, web, Responder};

type Result<T> = std::result::Result<T, WebError>;

async fn analyze_batch<R, F>(
    form: UploadForm,
    state: web::Data<Analyzer>,
    analyze: F,
) -> Result<web::Json<BatchResult<R>>>
where
    R: FileReport + Send + 'static,
    F: Fn(&Analyzer, &DecodedUpload) -> R + Send + 'static,
{
    let files = form.into_uploads();
    let analyzer = state.into_inner();
    let batch = web::block(move || run_batch(&files, |upload| analyze(&*analyzer, upload))).await??;
    Ok(web::Json(batch))
}

#[get("/")]
pub async fn index() -> impl Responder {
    web::Json(ServiceInfo {
        name: "ArchaiMap API",
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[get("/health")]
pub async fn health() -> impl Responder {
    web::Json(Health { status: "healthy" })
}

#[post("/api/vegetation")]
pub async fn vegetation(
    MultipartForm(form): MultipartForm<UploadForm>,
    state: web::Data<Analyzer>,
) -> Result<impl Responder> {
    analyze_batch(form, state, Analyzer::vegetation).await
}

#[post("/api/soil-detection")]
pub async fn soil_detection(
    MultipartForm(form): MultipartForm<UploadForm>,
    state: web::Data<Analyzer>,
) -> Result<impl Responder> {
    analyze_batch(form, state, Analyzer::soil_detection).await
}

#[post("/api/soil-classify")]
pub async fn soil_classify(
    MultipartForm(form): MultipartForm<UploadForm>,
    state: web::Data<Analyzer>,
) -> Result<impl Responder> {
    analyze_batch(form, state, Analyzer::soil_classification).await
}

#[post("/api/combined")]
pub async fn combined(
    MultipartForm(form): MultipartForm<UploadForm>,
    state: web::Data<Analyzer>,
) -> Result<impl Responder> {
    analyze_batch(form, state, Analyzer::combined).await
}

/// Load diagnostics for the vegetation model
#[get("/api/vegetation/status")]
pub async fn vegetation_status(state: web::Data<Analyzer>) -> impl Responder {
    web::Json(state.registry().status(ModelKind::Vegetation))
}

#[get("/api/soil-detection/status")]
pub async fn soil_detection_status(state: web::Data<Analyzer>) -> impl Responder {
    web::Json(state.registry().status(ModelKind::SoilDetection))
}

#[get("/api/soil-classify/status")]
pub async fn soil_classify_status(state: web::Data<Analyzer>) -> impl Responder {
    web::Json(state.registry().status(ModelKind::SoilClassifier))
}
