//! Key/value backend speaking the Redis-over-REST command protocol.
//!
//! Each command is a JSON array (`["GET", key]`) POSTed to the store URL with a
//! bearer token; the reply is `{"result": ...}` or `{"error": "..."}`.

use super::EnvelopeBackend;
use crate::envelope::{self, Envelope};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

pub struct KvBackend {
    client: Client,
    url: String,
    token: String,
    key: String,
}

impl KvBackend {
    pub fn new(url: String, token: String, key: String) -> Self {
        Self {
            client: Client::new(),
            url,
            token,
            key,
        }
    }

    async fn run_command(&self, command: Value) -> Result<Value, TransportError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await?;

        let status = resp.status();
        // A non-JSON body is treated like an empty one so the status still decides.
        let payload: Value = resp.json().await.unwrap_or_else(|_| json!({}));

        if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
            let detail = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(TransportError::Backend(detail));
        }
        if !status.is_success() {
            return Err(TransportError::Backend(format!(
                "KV request failed ({})",
                status.as_u16()
            )));
        }

        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl EnvelopeBackend for KvBackend {
    fn name(&self) -> &'static str {
        "kv"
    }

    async fn read_envelope(&self) -> Result<Option<Envelope>, TransportError> {
        let raw = self.run_command(json!(["GET", self.key])).await?;
        debug!("KV GET {} -> {}", self.key, if raw.is_null() { "empty" } else { "value" });
        Ok(envelope::decode(&raw))
    }

    async fn write_envelope(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let text = serde_json::to_string(envelope)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        self.run_command(json!(["SET", self.key, text])).await?;
        Ok(())
    }
}
