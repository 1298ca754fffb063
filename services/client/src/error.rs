use thiserror::Error;

/// Errors surfaced by the gallery client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Tombstone storage error: {0}")]
    Tombstones(#[source] anyhow::Error),
}
