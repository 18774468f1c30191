//! Remote progress storage.
//!
//! Two layers live here:
//! - **Backends** ([`EnvelopeBackend`]): where the server keeps the single
//!   envelope. A key/value store ([`KvBackend`]) and a blob store
//!   ([`BlobBackend`]) are interchangeable; one is picked at startup by
//!   [`select_backend`].
//! - **Transports** ([`ProgressTransport`]): how the client reaches the
//!   progress endpoint, either over HTTP ([`HttpTransport`]) or in-process
//!   ([`DirectTransport`]).
//!
//! Neither layer retries. Every failure propagates to the caller immediately.

mod blob;
mod http;
mod kv;
mod memory;
mod service;

pub use blob::BlobBackend;
pub use http::HttpTransport;
pub use kv::KvBackend;
pub use memory::MemoryBackend;
pub use service::{DirectTransport, ProgressService, ServiceError, WriteAck};

use crate::envelope::{Envelope, MAX_STATE_BYTES};
use crate::error::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Default key for the key/value backend.
pub const DEFAULT_PROGRESS_KEY: &str = "bangla10:progress:v1";
/// Default object path for the blob backend.
pub const DEFAULT_BLOB_PATH: &str = "bangla10/progress.json";
/// Default blob store API base.
pub const DEFAULT_BLOB_API_URL: &str = "https://blob.vercel-storage.com";

/// Read/write contract every storage backend satisfies.
///
/// Writes overwrite unconditionally; revision checks happen in
/// [`ProgressService`], not in the backend.
#[async_trait]
pub trait EnvelopeBackend: Send + Sync {
    /// Short identifier reported to clients (`"kv"`, `"blob"`, ...).
    fn name(&self) -> &'static str;

    /// Read the stored envelope. `Ok(None)` means nothing has been stored yet
    /// (or what is stored is not a valid envelope).
    async fn read_envelope(&self) -> Result<Option<Envelope>, TransportError>;

    /// Overwrite the stored envelope.
    async fn write_envelope(&self, envelope: &Envelope) -> Result<(), TransportError>;
}

/// Credentials and locations for the storage backends.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub kv_url: Option<String>,
    pub kv_token: Option<String>,
    pub blob_token: Option<String>,
    pub blob_api_url: String,
    pub progress_key: String,
    pub blob_path: String,
    pub max_state_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kv_url: None,
            kv_token: None,
            blob_token: None,
            blob_api_url: DEFAULT_BLOB_API_URL.to_string(),
            progress_key: DEFAULT_PROGRESS_KEY.to_string(),
            blob_path: DEFAULT_BLOB_PATH.to_string(),
            max_state_bytes: MAX_STATE_BYTES,
        }
    }
}

/// Pick the first configured backend: key/value, then blob.
///
/// Returns `None` when nothing is configured; the caller treats that as
/// "sync unavailable" for the lifetime of the process.
pub fn select_backend(config: &StorageConfig) -> Option<Arc<dyn EnvelopeBackend>> {
    let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

    if let (Some(url), Some(token)) = (non_empty(&config.kv_url), non_empty(&config.kv_token)) {
        info!("Using key/value progress storage ({})", config.progress_key);
        return Some(Arc::new(KvBackend::new(url, token, config.progress_key.clone())));
    }

    if let Some(token) = non_empty(&config.blob_token) {
        info!("Using blob progress storage ({})", config.blob_path);
        return Some(Arc::new(BlobBackend::new(
            config.blob_api_url.clone(),
            token,
            config.blob_path.clone(),
        )));
    }

    info!("No progress storage configured");
    None
}

/// Body of every `/progress` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub state: Value,
    #[serde(default)]
    pub client_revision: u64,
}

/// What the client learns from reading the remote.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The endpoint says no storage is configured; stop syncing for good.
    Disabled,
    Remote(RemoteProgress),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProgress {
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
    /// `None` when the remote has never been written.
    pub state: Option<Value>,
}

/// Server confirmation of a write.
#[derive(Debug, Clone, PartialEq)]
pub struct PushAck {
    pub revision: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Client side of the progress protocol.
#[async_trait]
pub trait ProgressTransport: Send + Sync {
    /// Read the current remote document.
    async fn fetch(&self) -> Result<FetchOutcome, TransportError>;

    /// Send a full document snapshot. The returned revision replaces whatever
    /// the client believed, regardless of `client_revision`.
    async fn push(&self, state: Value, client_revision: u64) -> Result<PushAck, TransportError>;
}
