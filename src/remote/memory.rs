use super::EnvelopeBackend;
use crate::envelope::Envelope;
use crate::error::TransportError;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Process-local backend. Used by the server when running without external
/// storage in development, and by tests.
#[derive(Default)]
pub struct MemoryBackend {
    slot: RwLock<Option<Envelope>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_envelope(envelope: Envelope) -> Self {
        Self {
            slot: RwLock::new(Some(envelope)),
        }
    }

    pub async fn current(&self) -> Option<Envelope> {
        self.slot.read().await.clone()
    }
}

#[async_trait]
impl EnvelopeBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read_envelope(&self) -> Result<Option<Envelope>, TransportError> {
        Ok(self.slot.read().await.clone())
    }

    async fn write_envelope(&self, envelope: &Envelope) -> Result<(), TransportError> {
        *self.slot.write().await = Some(envelope.clone());
        Ok(())
    }
}
