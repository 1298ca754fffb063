//! In-memory doubles for the pipeline's injected ports, plus test image
//! generators. Compiled for tests only.

use crate::face_detection::{DetectedFace, FaceDetector};
use crate::object_store::{ObjectStore, SignedUrl, StoredObject};
use crate::record_store::{
    AcceptedHash, ImageRecord, ImageStatus, NewImageRecord, RecordFinalization, RecordStore,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use image::{DynamicImage, ImageBuffer, Rgb};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// High-contrast checkerboard PNG (sharp, passes the blur check)
pub fn sharp_png(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            Rgb([255u8, 255, 255])
        } else {
            Rgb([0u8, 0, 0])
        }
    });
    encode_png(img)
}

/// Uniform PNG (zero Laplacian response, fails the blur check)
pub fn flat_png(width: u32, height: u32) -> Vec<u8> {
    encode_png(ImageBuffer::from_pixel(width, height, Rgb([120u8, 120, 120])))
}

fn encode_png(img: ImageBuffer<Rgb<u8>, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

/// In-memory record store with deterministic creation ordering
pub struct InMemoryRecordStore {
    records: Mutex<Vec<ImageRecord>>,
    clock: AtomicI64,
    hash_reads: AtomicU64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            clock: AtomicI64::new(0),
            hash_reads: AtomicU64::new(0),
        }
    }

    pub fn all_records(&self) -> Vec<ImageRecord> {
        self.records.lock().unwrap().clone()
    }

    /// How many times the similarity validator read accepted hashes
    pub fn accepted_hash_reads(&self) -> u64 {
        self.hash_reads.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, new: NewImageRecord) -> Result<ImageRecord> {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        let record = ImageRecord {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            original_name: new.original_name,
            file_name: new.file_name,
            file_size: new.file_size,
            file_type: new.file_type,
            storage_key: new.storage_key,
            access_url: new.access_url,
            width: None,
            height: None,
            status: ImageStatus::Processing,
            rejection_reason: None,
            similarity_hash: None,
            created_at: Utc.timestamp_opt(1_700_000_000 + tick, 0).unwrap(),
        };
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn finalize(&self, id: Uuid, outcome: RecordFinalization) -> Result<ImageRecord> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("record {id} not found"))?;

        record.storage_key = outcome.storage_key;
        record.access_url = outcome.access_url;
        record.width = Some(outcome.width);
        record.height = Some(outcome.height);
        record.status = outcome.status;
        record.rejection_reason = outcome.rejection_reason;
        record.similarity_hash = outcome.similarity_hash;

        Ok(record.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ImageRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list(
        &self,
        user_id: &str,
        status: Option<ImageStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImageRecord>> {
        let mut matching: Vec<ImageRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, user_id: &str, status: Option<ImageStatus>) -> Result<i64> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id && status.map_or(true, |s| r.status == s))
            .count() as i64)
    }

    async fn accepted_hashes(&self, user_id: &str) -> Result<Vec<AcceptedHash>> {
        self.hash_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id && r.status == ImageStatus::Accepted)
            .map(|r| AcceptedHash {
                id: r.id,
                similarity_hash: r.similarity_hash.clone(),
            })
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.records.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }
}

/// In-memory object store. Every presign yields a distinct URL so tests can
/// assert that URLs are regenerated rather than cached.
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    presigns: AtomicU64,
    fail_deletes: AtomicBool,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            presigns: AtomicU64::new(0),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn presign_count(&self) -> u64 {
        self.presigns.load(Ordering::Relaxed)
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::Relaxed);
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, bytes: &[u8], file_name: &str, _content_type: &str) -> Result<StoredObject> {
        let key = format!("uploads/{}-{file_name}", Uuid::new_v4());
        self.objects
            .lock()
            .unwrap()
            .insert(key.clone(), bytes.to_vec());
        let url = self.presign(&key).await?.url;
        Ok(StoredObject { key, url })
    }

    async fn presign(&self, key: &str) -> Result<SignedUrl> {
        let n = self.presigns.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(SignedUrl {
            url: format!("https://objects.test/{key}?sig={n}"),
            expires_at: Utc::now() + chrono::Duration::hours(24),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::Relaxed) {
            return Err(anyhow!("simulated object store failure"));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Face detector returning a fixed set of faces
pub struct StubFaceDetector {
    faces: Vec<DetectedFace>,
}

impl StubFaceDetector {
    pub fn new(faces: Vec<DetectedFace>) -> Self {
        Self { faces }
    }
}

#[async_trait]
impl FaceDetector for StubFaceDetector {
    async fn detect(&self, _bytes: &[u8]) -> Result<Vec<DetectedFace>> {
        Ok(self.faces.clone())
    }
}

/// Face detector that always fails, for capability-failure tests
pub struct FailingFaceDetector;

#[async_trait]
impl FaceDetector for FailingFaceDetector {
    async fn detect(&self, _bytes: &[u8]) -> Result<Vec<DetectedFace>> {
        Err(anyhow!("simulated face detection outage"))
    }
}
