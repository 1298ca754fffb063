//! Gallery client for the Portrait ingest service.
//!
//! Wraps the ingest HTTP API and layers local delete reconciliation on top:
//! deletions are applied optimistically and remembered in a per-user
//! tombstone store, so an image the user removed never reappears in a
//! listing, even when the remote delete call failed.

pub mod api_client;
pub mod error;
pub mod gallery;
pub mod tombstones;

pub use api_client::{ApiClient, ImageEntry, ListedImages, RemoteGallery, UploadOutcome};
pub use error::ClientError;
pub use gallery::{DeleteAllReport, DeleteOutcome, GalleryService};
pub use tombstones::{FileTombstoneStore, TombstoneStore};
