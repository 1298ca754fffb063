use crate::error::PipelineError;
use crate::object_store::{ObjectStore, SignedUrl};
use crate::record_store::{ImageRecord, ImageStatus, RecordStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Pagination envelope returned with every listing
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

/// One page of image records
#[derive(Debug, Clone)]
pub struct ImagePage {
    pub images: Vec<ImageRecord>,
    pub pagination: Pagination,
}

/// Read-side service: paginated listings, signed-URL refresh and deletion.
///
/// Access URLs are time-limited, so every read regenerates them instead of
/// serving whatever was stored at finalization time.
pub struct ListingService {
    record_store: Arc<dyn RecordStore>,
    object_store: Arc<dyn ObjectStore>,
}

impl ListingService {
    pub fn new(record_store: Arc<dyn RecordStore>, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            record_store,
            object_store,
        }
    }

    /// List a user's images, newest first, with fresh URLs for every
    /// terminal-status record on the page.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        user_id: &str,
        status: Option<ImageStatus>,
        page: i64,
        limit: i64,
    ) -> Result<ImagePage, PipelineError> {
        let page = page.max(1);
        let limit = limit.max(1);
        let offset = (page - 1) * limit;

        let mut images = self
            .record_store
            .list(user_id, status, limit, offset)
            .await
            .map_err(PipelineError::RecordStore)?;

        let total = self
            .record_store
            .count(user_id, status)
            .await
            .map_err(PipelineError::RecordStore)?;

        for image in &mut images {
            if matches!(image.status, ImageStatus::Accepted | ImageStatus::Rejected) {
                image.access_url = self
                    .object_store
                    .presign(&image.storage_key)
                    .await
                    .map_err(PipelineError::ObjectStore)?
                    .url;
            }
        }

        let total_pages = (total + limit - 1) / limit;

        Ok(ImagePage {
            images,
            pagination: Pagination {
                total,
                page,
                limit,
                total_pages,
            },
        })
    }

    /// Regenerate a signed URL for one image. Fails with NotFound when the
    /// record does not exist or belongs to a different user.
    #[instrument(skip(self), fields(image_id = %image_id))]
    pub async fn get_url(&self, image_id: Uuid, user_id: &str) -> Result<SignedUrl, PipelineError> {
        let record = self.lookup_owned(image_id, user_id).await?;

        self.object_store
            .presign(&record.storage_key)
            .await
            .map_err(PipelineError::ObjectStore)
    }

    /// Delete an image: the stored object first, then the record. A storage
    /// failure aborts before the record is touched.
    #[instrument(skip(self), fields(image_id = %image_id))]
    pub async fn delete(&self, image_id: Uuid, user_id: &str) -> Result<(), PipelineError> {
        let record = self.lookup_owned(image_id, user_id).await?;

        self.object_store
            .delete(&record.storage_key)
            .await
            .map_err(PipelineError::ObjectStore)?;

        self.record_store
            .delete(record.id)
            .await
            .map_err(PipelineError::RecordStore)?;

        info!("Image deleted");
        Ok(())
    }

    async fn lookup_owned(
        &self,
        image_id: Uuid,
        user_id: &str,
    ) -> Result<ImageRecord, PipelineError> {
        let record = self
            .record_store
            .get(image_id)
            .await
            .map_err(PipelineError::RecordStore)?;

        match record {
            Some(r) if r.user_id == user_id => Ok(r),
            _ => Err(PipelineError::NotFound),
        }
    }
}
