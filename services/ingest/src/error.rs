use thiserror::Error;

/// Fatal failures of the ingestion pipeline.
///
/// Validation rejections are not errors: they are normal pipeline outcomes
/// carried as a `REJECTED` status on the image record. Everything here aborts
/// the upload it belongs to.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Decode/transcode failure. The provisional record stays in PROCESSING
    /// with no retry or cleanup.
    #[error("image processing failed: {0}")]
    Processing(#[source] anyhow::Error),

    /// The face detection capability failed (not "no faces found").
    #[error("face detection failed: {0}")]
    FaceDetection(#[source] anyhow::Error),

    /// The object storage backend failed.
    #[error("object storage failed: {0}")]
    ObjectStore(#[source] anyhow::Error),

    /// The record store failed.
    #[error("record store failed: {0}")]
    RecordStore(#[source] anyhow::Error),

    /// Lookup by id + user failed. Mapped to 404, never to a server error.
    #[error("image not found or unauthorized")]
    NotFound,
}

impl PipelineError {
    /// Whether this error should surface as a 404 rather than a 500.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::NotFound)
    }
}
