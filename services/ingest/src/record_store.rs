use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgArgumentBuffer, PgPool, PgPoolOptions, PgTypeInfo, PgValueRef};
use sqlx::{FromRow, Postgres};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Lifecycle state of an ingested image.
///
/// PROCESSING is transient and set at creation; ACCEPTED and REJECTED are
/// terminal. No transition leaves a terminal state except deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageStatus {
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Processing => "PROCESSING",
            ImageStatus::Accepted => "ACCEPTED",
            ImageStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unknown status strings coming from the database or a query param
#[derive(Debug, Error)]
#[error("unknown image status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for ImageStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(ImageStatus::Processing),
            "ACCEPTED" => Ok(ImageStatus::Accepted),
            "REJECTED" => Ok(ImageStatus::Rejected),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

// Stored as TEXT; delegate the sqlx plumbing to &str
impl sqlx::Type<Postgres> for ImageStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <&str as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, Postgres> for ImageStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as sqlx::Encode<'_, Postgres>>::encode(self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, Postgres> for ImageStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<'_, Postgres>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

/// Stored image record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Unique image ID, assigned at creation
    pub id: Uuid,
    /// Owning user
    pub user_id: String,
    /// Original upload file name
    pub original_name: String,
    /// Base file name
    pub file_name: String,
    /// Upload size in bytes
    pub file_size: i64,
    /// MIME type as submitted by the client
    pub file_type: String,
    /// Object store key
    pub storage_key: String,
    /// Signed access URL. Ephemeral: regenerated on every read, never durable.
    pub access_url: String,
    /// Image width, set once after normalization
    pub width: Option<i32>,
    /// Image height, set once after normalization
    pub height: Option<i32>,
    /// Lifecycle status
    pub status: ImageStatus,
    /// First failing rule, set iff status is REJECTED
    pub rejection_reason: Option<String>,
    /// Perceptual hash, set for every successfully normalized image
    pub similarity_hash: Option<String>,
    /// When the record was created (listing order)
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a provisional record
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    pub user_id: String,
    pub original_name: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    /// Placeholder until the object is uploaded
    pub storage_key: String,
    /// Placeholder until the object is uploaded
    pub access_url: String,
}

/// Terminal outcome written back to a provisional record
#[derive(Debug, Clone)]
pub struct RecordFinalization {
    pub storage_key: String,
    pub access_url: String,
    pub width: i32,
    pub height: i32,
    pub status: ImageStatus,
    pub rejection_reason: Option<String>,
    pub similarity_hash: Option<String>,
}

/// Accepted-image hash used by the similarity validator
#[derive(Debug, Clone, FromRow)]
pub struct AcceptedHash {
    pub id: Uuid,
    pub similarity_hash: Option<String>,
}

/// Persistence port for image records.
///
/// The pipeline only mutates records through this interface so it can be
/// tested with in-memory doubles.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a provisional record with status PROCESSING
    async fn create(&self, new: NewImageRecord) -> Result<ImageRecord>;

    /// Write the terminal outcome of the pipeline
    async fn finalize(&self, id: Uuid, outcome: RecordFinalization) -> Result<ImageRecord>;

    /// Fetch a record by id
    async fn get(&self, id: Uuid) -> Result<Option<ImageRecord>>;

    /// List a user's records, newest first
    async fn list(
        &self,
        user_id: &str,
        status: Option<ImageStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImageRecord>>;

    /// Count a user's records
    async fn count(&self, user_id: &str, status: Option<ImageStatus>) -> Result<i64>;

    /// All similarity hashes of the user's ACCEPTED records
    async fn accepted_hashes(&self, user_id: &str) -> Result<Vec<AcceptedHash>>;

    /// Delete a record
    async fn delete(&self, id: Uuid) -> Result<()>;
}

const RECORD_COLUMNS: &str = "id, user_id, original_name, file_name, file_size, file_type, \
     storage_key, access_url, width, height, status, rejection_reason, \
     similarity_hash, created_at";

/// PostgreSQL-backed record store
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Create a new record store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[instrument(skip(self, new), fields(user_id = %new.user_id, file = %new.original_name))]
    async fn create(&self, new: NewImageRecord) -> Result<ImageRecord> {
        let id = Uuid::new_v4();

        let sql = format!(
            "INSERT INTO images (
                id, user_id, original_name, file_name, file_size, file_type,
                storage_key, access_url, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING {RECORD_COLUMNS}"
        );

        let record = sqlx::query_as::<_, ImageRecord>(&sql)
            .bind(id)
            .bind(&new.user_id)
            .bind(&new.original_name)
            .bind(&new.file_name)
            .bind(new.file_size)
            .bind(&new.file_type)
            .bind(&new.storage_key)
            .bind(&new.access_url)
            .bind(ImageStatus::Processing)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert provisional image record")?;

        debug!(image_id = %record.id, "Provisional record created");

        Ok(record)
    }

    #[instrument(skip(self, outcome), fields(image_id = %id, status = %outcome.status))]
    async fn finalize(&self, id: Uuid, outcome: RecordFinalization) -> Result<ImageRecord> {
        let sql = format!(
            "UPDATE images SET
                storage_key = $2,
                access_url = $3,
                width = $4,
                height = $5,
                status = $6,
                rejection_reason = $7,
                similarity_hash = $8
            WHERE id = $1
            RETURNING {RECORD_COLUMNS}"
        );

        let record = sqlx::query_as::<_, ImageRecord>(&sql)
            .bind(id)
            .bind(&outcome.storage_key)
            .bind(&outcome.access_url)
            .bind(outcome.width)
            .bind(outcome.height)
            .bind(outcome.status)
            .bind(&outcome.rejection_reason)
            .bind(&outcome.similarity_hash)
            .fetch_one(&self.pool)
            .await
            .context("Failed to finalize image record")?;

        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ImageRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM images WHERE id = $1");

        let record = sqlx::query_as::<_, ImageRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query image record")?;

        Ok(record)
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        user_id: &str,
        status: Option<ImageStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ImageRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM images
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4"
        );

        let records = sqlx::query_as::<_, ImageRecord>(&sql)
            .bind(user_id)
            .bind(status.map(|s| s.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list image records")?;

        Ok(records)
    }

    async fn count(&self, user_id: &str, status: Option<ImageStatus>) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM images
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await
        .context("Failed to count image records")?;

        Ok(count.0)
    }

    async fn accepted_hashes(&self, user_id: &str) -> Result<Vec<AcceptedHash>> {
        let hashes = sqlx::query_as::<_, AcceptedHash>(
            r#"
            SELECT id, similarity_hash FROM images
            WHERE user_id = $1 AND status = 'ACCEPTED'
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query accepted hashes")?;

        Ok(hashes)
    }

    #[instrument(skip(self), fields(image_id = %id))]
    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete image record")?;

        debug!("Image record deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ImageStatus::Processing,
            ImageStatus::Accepted,
            ImageStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<ImageStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&ImageStatus::Accepted).unwrap(),
            "\"ACCEPTED\""
        );
        assert!("accepted".parse::<ImageStatus>().is_err());
    }
}
