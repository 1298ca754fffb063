use crate::api_client::{ListedImages, RemoteGallery};
use crate::error::ClientError;
use crate::tombstones::TombstoneStore;
use std::sync::Arc;
use tracing::{info, warn};

const DELETE_ALL_BATCH: i64 = 100;

/// Outcome of one optimistic delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Whether the remote delete call succeeded. The image is hidden from
    /// subsequent listings either way.
    pub remote_deleted: bool,
}

/// Aggregate outcome of a delete-all run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteAllReport {
    pub deleted: usize,
    pub failed: usize,
}

/// Gallery view reconciled against local tombstones.
///
/// Every listing is filtered through the tombstone set, and every delete is
/// applied optimistically: the id is tombstoned no matter what the server
/// said, so a failed remote delete still removes the image from the user's
/// view permanently.
pub struct GalleryService {
    remote: Arc<dyn RemoteGallery>,
    tombstones: Arc<dyn TombstoneStore>,
}

impl GalleryService {
    pub fn new(remote: Arc<dyn RemoteGallery>, tombstones: Arc<dyn TombstoneStore>) -> Self {
        Self { remote, tombstones }
    }

    /// Fetch one page of images, dropping anything the user already deleted.
    pub async fn refresh(
        &self,
        user_id: &str,
        status: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<ListedImages, ClientError> {
        let deleted = self.tombstones.load(user_id);
        let mut listed = self.remote.list_images(user_id, status, page, limit).await?;
        listed.images.retain(|img| !deleted.contains(&img.id));
        Ok(listed)
    }

    /// Delete one image. The tombstone is written before the remote call, so
    /// the image disappears from listings even if the server is unreachable.
    pub async fn delete_image(
        &self,
        user_id: &str,
        image_id: &str,
    ) -> Result<DeleteOutcome, ClientError> {
        self.tombstones
            .record(user_id, image_id)
            .map_err(ClientError::Tombstones)?;

        match self.remote.delete_image(image_id, user_id).await {
            Ok(()) => Ok(DeleteOutcome {
                remote_deleted: true,
            }),
            Err(e) => {
                warn!(image_id, error = %e, "Remote delete failed, image stays tombstoned");
                Ok(DeleteOutcome {
                    remote_deleted: false,
                })
            }
        }
    }

    /// Delete every remaining image for a user. Failures are counted, never
    /// fatal; every attempted id is tombstoned.
    pub async fn delete_all(&self, user_id: &str) -> Result<DeleteAllReport, ClientError> {
        let mut report = DeleteAllReport::default();

        loop {
            let page = self.refresh(user_id, None, 1, DELETE_ALL_BATCH).await?;
            if page.images.is_empty() {
                break;
            }

            for image in page.images {
                let outcome = self.delete_image(user_id, &image.id).await?;
                if outcome.remote_deleted {
                    report.deleted += 1;
                } else {
                    report.failed += 1;
                }
            }
        }

        info!(
            deleted = report.deleted,
            failed = report.failed,
            "Delete-all completed"
        );

        Ok(report)
    }

    /// Forget every local tombstone for a user. Purely local; nothing is
    /// restored or deleted on the server.
    pub fn reset_local(&self, user_id: &str) -> Result<(), ClientError> {
        self.tombstones
            .reset(user_id)
            .map_err(ClientError::Tombstones)
    }

    /// Fetch a fresh signed URL for one image.
    pub async fn fresh_url(&self, user_id: &str, image_id: &str) -> Result<String, ClientError> {
        self.remote.fresh_url(image_id, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{ImageEntry, PaginationInfo};
    use crate::tombstones::FileTombstoneStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn entry(id: &str, user_id: &str) -> ImageEntry {
        ImageEntry {
            id: id.to_string(),
            user_id: user_id.to_string(),
            original_name: format!("{id}.png"),
            file_name: format!("{id}.png"),
            file_size: 1024,
            file_type: "image/png".to_string(),
            storage_key: format!("uploads/{id}.png"),
            access_url: format!("https://objects.test/{id}"),
            width: Some(400),
            height: Some(400),
            status: "ACCEPTED".to_string(),
            rejection_reason: None,
            similarity_hash: Some("0".repeat(64)),
            created_at: Utc::now(),
        }
    }

    struct FakeRemote {
        images: Mutex<Vec<ImageEntry>>,
        fail_deletes: AtomicBool,
        delete_calls: AtomicUsize,
    }

    impl FakeRemote {
        fn new(images: Vec<ImageEntry>) -> Self {
            Self {
                images: Mutex::new(images),
                fail_deletes: AtomicBool::new(false),
                delete_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteGallery for FakeRemote {
        async fn list_images(
            &self,
            user_id: &str,
            _status: Option<&str>,
            page: i64,
            limit: i64,
        ) -> Result<ListedImages, ClientError> {
            let images: Vec<_> = self
                .images
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.user_id == user_id)
                .cloned()
                .collect();
            let total = images.len() as i64;

            Ok(ListedImages {
                images,
                pagination: PaginationInfo {
                    total,
                    page,
                    limit,
                    total_pages: (total + limit - 1) / limit,
                },
            })
        }

        async fn delete_image(&self, image_id: &str, _user_id: &str) -> Result<(), ClientError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(ClientError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            self.images.lock().unwrap().retain(|i| i.id != image_id);
            Ok(())
        }

        async fn fresh_url(&self, image_id: &str, _user_id: &str) -> Result<String, ClientError> {
            Ok(format!("https://objects.test/{image_id}?fresh"))
        }
    }

    fn service(remote: Arc<FakeRemote>) -> (GalleryService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let tombstones = Arc::new(FileTombstoneStore::new(dir.path()));
        (GalleryService::new(remote, tombstones), dir)
    }

    #[tokio::test]
    async fn test_refresh_passes_through() {
        let remote = Arc::new(FakeRemote::new(vec![entry("a", "u1"), entry("b", "u1")]));
        let (gallery, _dir) = service(remote);

        let page = gallery.refresh("u1", None, 1, 10).await.unwrap();
        assert_eq!(page.images.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_remotely_and_locally() {
        let remote = Arc::new(FakeRemote::new(vec![entry("a", "u1"), entry("b", "u1")]));
        let (gallery, _dir) = service(remote.clone());

        let outcome = gallery.delete_image("u1", "a").await.unwrap();
        assert!(outcome.remote_deleted);

        let page = gallery.refresh("u1", None, 1, 10).await.unwrap();
        assert_eq!(page.images.len(), 1);
        assert_eq!(page.images[0].id, "b");
    }

    #[tokio::test]
    async fn test_failed_remote_delete_still_hides_image() {
        let remote = Arc::new(FakeRemote::new(vec![entry("a", "u1"), entry("b", "u1")]));
        remote.fail_deletes.store(true, Ordering::SeqCst);
        let (gallery, _dir) = service(remote.clone());

        let outcome = gallery.delete_image("u1", "a").await.unwrap();
        assert!(!outcome.remote_deleted);

        // The server still has it, the user never sees it again
        assert_eq!(remote.images.lock().unwrap().len(), 2);
        let page = gallery.refresh("u1", None, 1, 10).await.unwrap();
        assert_eq!(page.images.len(), 1);
        assert_eq!(page.images[0].id, "b");
    }

    #[tokio::test]
    async fn test_delete_all_counts_failures_and_terminates() {
        let remote = Arc::new(FakeRemote::new(vec![
            entry("a", "u1"),
            entry("b", "u1"),
            entry("c", "u1"),
        ]));
        remote.fail_deletes.store(true, Ordering::SeqCst);
        let (gallery, _dir) = service(remote.clone());

        let report = gallery.delete_all("u1").await.unwrap();
        assert_eq!(report, DeleteAllReport { deleted: 0, failed: 3 });
        assert_eq!(remote.delete_calls.load(Ordering::SeqCst), 3);

        let page = gallery.refresh("u1", None, 1, 10).await.unwrap();
        assert!(page.images.is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_success() {
        let remote = Arc::new(FakeRemote::new(vec![entry("a", "u1"), entry("b", "u1")]));
        let (gallery, _dir) = service(remote);

        let report = gallery.delete_all("u1").await.unwrap();
        assert_eq!(report, DeleteAllReport { deleted: 2, failed: 0 });
    }

    #[tokio::test]
    async fn test_reset_resurfaces_images_still_on_server() {
        let remote = Arc::new(FakeRemote::new(vec![entry("a", "u1")]));
        remote.fail_deletes.store(true, Ordering::SeqCst);
        let (gallery, _dir) = service(remote.clone());

        gallery.delete_image("u1", "a").await.unwrap();
        assert!(gallery.refresh("u1", None, 1, 10).await.unwrap().images.is_empty());

        gallery.reset_local("u1").unwrap();

        // Remote delete failed earlier, so after the reset it comes back
        let page = gallery.refresh("u1", None, 1, 10).await.unwrap();
        assert_eq!(page.images.len(), 1);
    }

    #[tokio::test]
    async fn test_tombstones_isolated_per_user() {
        let remote = Arc::new(FakeRemote::new(vec![entry("a", "u1"), entry("a2", "u2")]));
        remote.fail_deletes.store(true, Ordering::SeqCst);
        let (gallery, _dir) = service(remote);

        gallery.delete_image("u1", "a").await.unwrap();

        let other = gallery.refresh("u2", None, 1, 10).await.unwrap();
        assert_eq!(other.images.len(), 1);
    }
}
