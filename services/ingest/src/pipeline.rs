use crate::config::ValidationConfig;
use crate::error::PipelineError;
use crate::face_detection::{validate_faces, FaceDetector};
use crate::image_metrics::{blur_score, similarity_hash};
use crate::object_store::{content_type_for_format, ObjectStore};
use crate::processing;
use crate::record_store::{
    ImageRecord, ImageStatus, NewImageRecord, RecordFinalization, RecordStore,
};
use crate::validators::{
    validate_dimensions, validate_format, validate_sharpness, validate_similarity, Verdict,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// A file as received from the transport layer
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    pub original_name: String,
    pub mime_type: String,
}

/// The per-upload ingestion state machine.
///
/// Each upload runs synchronously end-to-end: a provisional PROCESSING record
/// is created, the bytes are normalized, the face gate runs, and the
/// remaining validators decide the terminal ACCEPTED/REJECTED status. A
/// fatal failure mid-pipeline leaves the record in PROCESSING; there is no
/// compensation between the object upload and record finalization.
pub struct IngestionPipeline {
    record_store: Arc<dyn RecordStore>,
    object_store: Arc<dyn ObjectStore>,
    face_detector: Arc<dyn FaceDetector>,
    config: ValidationConfig,
}

impl IngestionPipeline {
    pub fn new(
        record_store: Arc<dyn RecordStore>,
        object_store: Arc<dyn ObjectStore>,
        face_detector: Arc<dyn FaceDetector>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            record_store,
            object_store,
            face_detector,
            config,
        }
    }

    /// Run one upload through the full pipeline and return the finalized
    /// record. Validation rejections are normal outcomes, not errors.
    #[instrument(skip(self, upload), fields(user_id = %user_id, file = %upload.original_name))]
    pub async fn process_upload(
        &self,
        upload: UploadedFile,
        user_id: &str,
    ) -> Result<ImageRecord, PipelineError> {
        // Unique placeholder until the object is uploaded
        let placeholder = format!("pending-{}", Uuid::new_v4());

        let file_name = Path::new(&upload.original_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&upload.original_name)
            .to_string();

        let record = self
            .record_store
            .create(NewImageRecord {
                user_id: user_id.to_string(),
                original_name: upload.original_name.clone(),
                file_name,
                file_size: upload.bytes.len() as i64,
                file_type: upload.mime_type.clone(),
                storage_key: placeholder.clone(),
                access_url: placeholder,
            })
            .await
            .map_err(PipelineError::RecordStore)?;

        // A decode failure aborts here; the record stays in PROCESSING
        let normalized = processing::normalize(
            &upload.bytes,
            &upload.original_name,
            &upload.mime_type,
            self.config.transcode_quality,
        )?;

        let content_type = content_type_for_format(&normalized.format);

        // The face gate runs before everything else
        let faces = self
            .face_detector
            .detect(&normalized.bytes)
            .await
            .map_err(PipelineError::FaceDetection)?;

        let gate = validate_faces(&faces, self.config.min_face_size);

        if let Verdict::Fail { reason } = gate {
            // Persist the bytes anyway for audit, then finalize as rejected
            // without running the remaining validators
            let stored = self
                .object_store
                .put(&normalized.bytes, &upload.original_name, content_type)
                .await
                .map_err(PipelineError::ObjectStore)?;

            let rejected = self
                .record_store
                .finalize(
                    record.id,
                    RecordFinalization {
                        storage_key: stored.key,
                        access_url: stored.url,
                        width: normalized.width as i32,
                        height: normalized.height as i32,
                        status: ImageStatus::Rejected,
                        rejection_reason: Some(reason.clone()),
                        similarity_hash: None,
                    },
                )
                .await
                .map_err(PipelineError::RecordStore)?;

            info!(image_id = %rejected.id, reason = %reason, "Upload rejected by face gate");
            metrics::counter!("ingest.uploads.rejected").increment(1);

            return Ok(rejected);
        }

        let stored = self
            .object_store
            .put(&normalized.bytes, &upload.original_name, content_type)
            .await
            .map_err(PipelineError::ObjectStore)?;

        let hash = similarity_hash(&normalized.bytes);
        let sharpness = blur_score(&normalized.bytes, self.config.blur_failure_score);

        // All four checks are evaluated; the first failure in this fixed
        // order determines the rejection reason
        let verdicts = [
            validate_format(&upload.mime_type, &upload.original_name, &self.config),
            validate_dimensions(normalized.width, normalized.height, &self.config),
            validate_similarity(self.record_store.as_ref(), user_id, &hash, &self.config).await?,
            validate_sharpness(sharpness, &self.config),
        ];

        let rejection_reason = verdicts
            .into_iter()
            .find_map(|v| v.reason().map(str::to_string));

        let status = if rejection_reason.is_some() {
            ImageStatus::Rejected
        } else {
            ImageStatus::Accepted
        };

        let mut finalized = self
            .record_store
            .finalize(
                record.id,
                RecordFinalization {
                    storage_key: stored.key.clone(),
                    access_url: stored.url,
                    width: normalized.width as i32,
                    height: normalized.height as i32,
                    status,
                    rejection_reason: rejection_reason.clone(),
                    similarity_hash: Some(hash),
                },
            )
            .await
            .map_err(PipelineError::RecordStore)?;

        // The stored URL is ephemeral; hand the caller a fresh one
        finalized.access_url = self
            .object_store
            .presign(&stored.key)
            .await
            .map_err(PipelineError::ObjectStore)?
            .url;

        match &rejection_reason {
            Some(reason) => {
                info!(image_id = %finalized.id, reason = %reason, "Upload rejected");
                metrics::counter!("ingest.uploads.rejected").increment(1);
            }
            None => {
                info!(image_id = %finalized.id, "Upload accepted");
                metrics::counter!("ingest.uploads.accepted").increment(1);
            }
        }

        Ok(finalized)
    }
}
