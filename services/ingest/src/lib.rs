//! Portrait Ingest Service
//!
//! Accepts user-submitted photographs, decides whether each is fit for
//! downstream AI processing, and exposes the accepted/rejected result set
//! over a JSON API. Every upload runs through a synchronous per-file
//! pipeline: format normalization (including HEIC transcoding), a face
//! detection gate, perceptual hashing, blur estimation, and a fixed-order
//! set of acceptance checks.
//!
//! ## Architecture
//!
//! ```text
//! Upload bytes          Collaborator ports              Read side
//! ┌──────────────┐     ┌───────────────────┐          ┌──────────────┐
//! │ Format       │     │ FaceDetector      │          │ Listing /    │
//! │ Normalizer   │────▶│ (Rekognition)     │          │ URL Service  │
//! └──────────────┘     └───────────────────┘          └──────────────┘
//!        │             ┌───────────────────┐                 ▲
//!        ▼             │ ObjectStore (S3)  │                 │
//! ┌──────────────┐     └───────────────────┘          ┌──────────────┐
//! │ Hash + Blur  │     ┌───────────────────┐          │ RecordStore  │
//! │ Extractors   │────▶│ Validators        │─────────▶│ (PostgreSQL) │
//! └──────────────┘     └───────────────────┘          └──────────────┘
//! ```
//!
//! Records move PROCESSING -> ACCEPTED | REJECTED exactly once; rejection is
//! a normal outcome carrying a human-readable reason, never an error.

pub mod api;
pub mod config;
pub mod error;
pub mod face_detection;
pub mod image_metrics;
pub mod listing;
pub mod object_store;
pub mod pipeline;
pub mod processing;
pub mod record_store;
pub mod validators;

#[cfg(test)]
pub mod test_support;

pub use config::Config;
pub use error::PipelineError;
pub use face_detection::{DetectedFace, FaceDetector, RekognitionFaceDetector};
pub use listing::{ImagePage, ListingService, Pagination};
pub use object_store::{ObjectStore, S3ObjectStore, SignedUrl, StoredObject};
pub use pipeline::{IngestionPipeline, UploadedFile};
pub use record_store::{ImageRecord, ImageStatus, PgRecordStore, RecordStore};
