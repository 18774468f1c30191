//! Blob-store backend: the envelope is one public JSON object at a fixed path.
//!
//! Reads list the store by prefix, pick the exact pathname and fetch its URL.
//! Writes PUT the object in place, overwriting without a random suffix.

use super::EnvelopeBackend;
use crate::envelope::{self, Envelope};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const LIST_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    blobs: Vec<BlobEntry>,
}

#[derive(Debug, Deserialize)]
struct BlobEntry {
    pathname: String,
    url: String,
}

pub struct BlobBackend {
    client: Client,
    api_url: String,
    token: String,
    pathname: String,
}

impl BlobBackend {
    pub fn new(api_url: String, token: String, pathname: String) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            pathname,
        }
    }

    fn list_url(&self) -> String {
        format!(
            "{}?prefix={}&limit={}",
            self.api_url,
            urlencoding::encode(&self.pathname),
            LIST_LIMIT
        )
    }

    fn object_url(&self) -> String {
        let encoded: Vec<String> = self
            .pathname
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.api_url, encoded.join("/"))
    }
}

#[async_trait]
impl EnvelopeBackend for BlobBackend {
    fn name(&self) -> &'static str {
        "blob"
    }

    async fn read_envelope(&self) -> Result<Option<Envelope>, TransportError> {
        let resp = self
            .client
            .get(self.list_url())
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Backend(format!(
                "Blob list failed ({})",
                resp.status().as_u16()
            )));
        }
        let listing: ListResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        let Some(target) = listing.blobs.into_iter().find(|b| b.pathname == self.pathname) else {
            debug!("Blob {} not found", self.pathname);
            return Ok(None);
        };

        let resp = self
            .client
            .get(&target.url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Backend(format!(
                "Blob read failed ({})",
                resp.status().as_u16()
            )));
        }
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        Ok(envelope::decode(&payload))
    }

    async fn write_envelope(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let body = serde_json::to_vec(envelope)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        let resp = self
            .client
            .put(self.object_url())
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=utf-8")
            .header("x-api-version", "7")
            .header("x-add-random-suffix", "0")
            .header("x-allow-overwrite", "1")
            .header("x-cache-control-max-age", "0")
            .header("x-access", "public")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, message });
        }
        Ok(())
    }
}
