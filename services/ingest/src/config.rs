use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the ingest service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Rekognition configuration
    pub rekognition: RekognitionConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Image validation configuration
    pub validation: ValidationConfig,
    /// API configuration
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3 object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for uploaded images
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Key prefix for uploaded objects
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Presigned URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
}

/// Rekognition face detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RekognitionConfig {
    /// AWS region for the Rekognition client
    #[serde(default = "default_region")]
    pub region: String,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Acceptance policy for uploaded images
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Minimum image width in pixels
    #[serde(default = "default_min_width")]
    pub min_width: u32,
    /// Minimum image height in pixels
    #[serde(default = "default_min_height")]
    pub min_height: u32,
    /// Maximum image width in pixels (0 disables the check)
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    /// Maximum image height in pixels (0 disables the check)
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    /// Allowed MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    /// Similarity percentage at or above which an upload is a duplicate (0-100)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Minimum Laplacian sharpness score
    #[serde(default = "default_blur_threshold")]
    pub blur_threshold: f64,
    /// Sharpness score reported when blur estimation fails (fail-open)
    #[serde(default = "default_blur_failure_score")]
    pub blur_failure_score: f64,
    /// Minimum face size as percentage of image area
    #[serde(default = "default_min_face_size")]
    pub min_face_size: f64,
    /// JPEG quality used when transcoding HEIC/HEIF uploads
    #[serde(default = "default_transcode_quality")]
    pub transcode_quality: u8,
    /// Maximum number of files per multi-upload request
    #[serde(default = "default_max_upload_files")]
    pub max_upload_files: usize,
    /// Maximum upload size in bytes
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: usize,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "portrait-ingest".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_key_prefix() -> String {
    "uploads".to_string()
}

fn default_presigned_url_expiry_secs() -> u64 {
    86400 // 24 hours
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

fn default_min_width() -> u32 {
    300
}

fn default_min_height() -> u32 {
    300
}

fn default_max_width() -> u32 {
    5000
}

fn default_max_height() -> u32 {
    5000
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/jpg".to_string(),
        "image/png".to_string(),
        "image/heic".to_string(),
        "image/heif".to_string(),
    ]
}

fn default_similarity_threshold() -> f64 {
    85.0
}

fn default_blur_threshold() -> f64 {
    5.0
}

fn default_blur_failure_score() -> f64 {
    100.0
}

fn default_min_face_size() -> f64 {
    5.0
}

fn default_transcode_quality() -> u8 {
    90
}

fn default_max_upload_files() -> usize {
    10
}

fn default_max_file_size_bytes() -> usize {
    120 * 1024 * 1024 // 120MB
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "portrait-ingest")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/ingest").required(false))
            .add_source(config::File::with_name("/etc/portrait/ingest").required(false))
            // Override with environment variables
            // INGEST__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("INGEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.presigned_url_expiry_secs)
    }

    /// Get database connection timeout as Duration
    pub fn db_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connect_timeout_secs)
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_width: default_min_width(),
            min_height: default_min_height(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            allowed_types: default_allowed_types(),
            similarity_threshold: default_similarity_threshold(),
            blur_threshold: default_blur_threshold(),
            blur_failure_score: default_blur_failure_score(),
            min_face_size: default_min_face_size(),
            transcode_quality: default_transcode_quality(),
            max_upload_files: default_max_upload_files(),
            max_file_size_bytes: default_max_file_size_bytes(),
        }
    }
}
