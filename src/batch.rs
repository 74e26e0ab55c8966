//! Batch processing: every uploaded file is gated, decoded and analysed on
//! its own, in input order. One file's failure never stops the batch.

use crate::analysis::FileReport;
use crate::error::AnalysisError;
use crate::upload::{DecodedUpload, UploadedImage};
use serde::Serialize;
use tracing::{debug, info};

/// The response for one batch of uploads
#[derive(Debug, Serialize)]
pub struct BatchResult<R> {
    pub total_files: usize,
    /// Number of entries in `results` with `success == true`
    pub processed: usize,
    pub results: Vec<R>,
}

impl<R: FileReport> From<Vec<R>> for BatchResult<R> {
    fn from(results: Vec<R>) -> Self {
        BatchResult {
            total_files: results.len(),
            processed: results.iter().filter(|r| r.success()).count(),
            results,
        }
    }
}

/// Run `analyze` on every file that passes the extension gate and decodes.
/// Files that don't get a rejection entry instead.
pub fn run_batch<R, F>(files: &[UploadedImage], analyze: F) -> Result<BatchResult<R>, AnalysisError>
where
    R: FileReport,
    F: Fn(&DecodedUpload) -> R,
{
    if files.is_empty() {
        return Err(AnalysisError::EmptyBatch);
    }

    let results = files
        .iter()
        .map(|file| match file.prepare() {
            Ok(upload) => analyze(&upload),
            Err(e) => {
                debug!("rejecting {:?}: {e}", file.filename);
                R::rejected(file.display_name(), &e)
            }
        })
        .collect::<Vec<R>>();

    let batch = BatchResult::from(results);
    info!(
        "processed {}/{} uploaded files",
        batch.processed, batch.total_files
    );
    Ok(batch)
}
