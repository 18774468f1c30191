//! Error types shared across the store, the remote adapters and the sync engine.

use std::io;

/// A state payload rejected before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid state payload: expected a JSON object")]
    NotAnObject,
    #[error("state payload is too large ({size} bytes, limit {limit})")]
    TooLarge { size: usize, limit: usize },
    #[error("state payload could not be serialized: {0}")]
    Serialize(String),
}

/// Network or backend failure while talking to the remote store.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request failed ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("malformed backend response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A persisted or remote envelope whose shape cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("envelope is empty")]
    Empty,
    #[error("envelope is not valid JSON: {0}")]
    NotJson(String),
    #[error("envelope is not an object")]
    NotAnObject,
    #[error("envelope revision is not a number")]
    BadRevision,
    #[error("envelope state is not an object")]
    BadState,
}

/// Failure of the local durable slot.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid backup: {0}")]
    InvalidBackup(String),
}

/// The item catalog could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure of a trainer operation.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("no phrases available for this session")]
    EmptyPlan,
    #[error("unknown phrase: {0}")]
    UnknownPhrase(String),
    #[error("unknown recitation: {0}")]
    UnknownRecitation(String),
    #[error("recitation {recitation} has no chunk {chunk}")]
    UnknownChunk { recitation: String, chunk: String },
}
