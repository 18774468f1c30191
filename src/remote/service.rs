//! Server-side handling of the progress document.
//!
//! Writes read the current envelope first and bump its revision, so the
//! revision stored in a backend never goes backwards no matter what revision
//! the client believed it had.

use super::{
    EnvelopeBackend, FetchOutcome, ProgressTransport, PushAck, RemoteProgress,
};
use crate::envelope::{self, Envelope};
use crate::error::{TransportError, ValidationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("No server storage configured. Set KV_REST_API_URL/KV_REST_API_TOKEN or BLOB_READ_WRITE_TOKEN.")]
    NotConfigured,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteAck {
    pub backend: &'static str,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

pub struct ProgressService {
    backend: Option<Arc<dyn EnvelopeBackend>>,
    max_state_bytes: usize,
}

impl ProgressService {
    pub fn new(backend: Option<Arc<dyn EnvelopeBackend>>, max_state_bytes: usize) -> Self {
        Self {
            backend,
            max_state_bytes,
        }
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    fn backend(&self) -> Result<&Arc<dyn EnvelopeBackend>, ServiceError> {
        self.backend.as_ref().ok_or(ServiceError::NotConfigured)
    }

    /// Current envelope, or `None` when nothing is stored.
    pub async fn read(&self) -> Result<Option<Envelope>, ServiceError> {
        Ok(self.backend()?.read_envelope().await?)
    }

    /// Validate `state`, bump the stored revision and overwrite the envelope.
    ///
    /// The stored copy has its `meta` stamped with the new revision and marked
    /// clean, so whoever reads it next sees a synced document.
    pub async fn write(&self, state: &Value, client_revision: u64) -> Result<WriteAck, ServiceError> {
        let backend = self.backend()?;
        let mut next_state = envelope::validate_state(state, self.max_state_bytes)?;

        let current = backend.read_envelope().await?;
        let revision = current.map(|e| e.revision).unwrap_or(0) + 1;
        let updated_at = Utc::now();
        debug!(
            "Writing progress revision {} (client had {})",
            revision, client_revision
        );

        stamp_meta(&mut next_state, revision, updated_at);

        let envelope = Envelope {
            revision,
            updated_at: Some(updated_at),
            state: next_state,
        };
        backend.write_envelope(&envelope).await?;

        Ok(WriteAck {
            backend: backend.name(),
            revision,
            updated_at,
        })
    }
}

fn stamp_meta(state: &mut Map<String, Value>, revision: u64, updated_at: DateTime<Utc>) {
    let mut meta = match state.remove("meta") {
        Some(Value::Object(meta)) => meta,
        _ => Map::new(),
    };
    meta.insert("revision".to_string(), json!(revision));
    meta.insert("lastSyncedAt".to_string(), json!(updated_at));
    meta.insert("dirty".to_string(), Value::Bool(false));
    state.insert("meta".to_string(), Value::Object(meta));
}

/// Transport that calls a [`ProgressService`] in-process, skipping HTTP.
pub struct DirectTransport {
    service: Arc<ProgressService>,
}

impl DirectTransport {
    pub fn new(service: Arc<ProgressService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ProgressTransport for DirectTransport {
    async fn fetch(&self) -> Result<FetchOutcome, TransportError> {
        match self.service.read().await {
            Ok(Some(envelope)) => Ok(FetchOutcome::Remote(RemoteProgress {
                revision: envelope.revision,
                updated_at: envelope.updated_at,
                state: Some(Value::Object(envelope.state)),
            })),
            Ok(None) => Ok(FetchOutcome::Remote(RemoteProgress {
                revision: 0,
                updated_at: None,
                state: None,
            })),
            Err(ServiceError::NotConfigured) => Ok(FetchOutcome::Disabled),
            Err(ServiceError::Transport(e)) => Err(e),
            Err(ServiceError::Validation(e)) => Err(e.into()),
        }
    }

    async fn push(&self, state: Value, client_revision: u64) -> Result<PushAck, TransportError> {
        match self.service.write(&state, client_revision).await {
            Ok(ack) => Ok(PushAck {
                revision: Some(ack.revision),
                updated_at: Some(ack.updated_at),
            }),
            Err(ServiceError::NotConfigured) => Err(TransportError::Status {
                status: 503,
                message: ServiceError::NotConfigured.to_string(),
            }),
            Err(ServiceError::Transport(e)) => Err(e),
            Err(ServiceError::Validation(e)) => Err(e.into()),
        }
    }
}
