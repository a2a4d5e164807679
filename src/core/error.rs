//! Error taxonomy shared by every storage backend

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A required setting is missing; raised at construction
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Request could not be built or the network call failed (timeouts included)
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Remote API answered with status >= 400; body kept verbatim
    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("no {0} returned after creation")]
    NotCreated(&'static str),

    #[error("media info not available from the {0} backend")]
    MediaUnavailable(&'static str),

    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("conversation resolver is not running")]
    ResolverClosed,

    #[error("local database error: {0}")]
    Local(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True when the backend cannot answer at all, as opposed to having no data
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            StoreError::Unsupported { .. } | StoreError::MediaUnavailable(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
