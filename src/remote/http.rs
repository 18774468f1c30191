use super::{FetchOutcome, ProgressResponse, ProgressTransport, PushAck, PushRequest, RemoteProgress};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

/// Talks to a `/progress` endpoint over HTTP.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    /// `endpoint` is the full URL of the progress resource,
    /// e.g. `http://localhost:3000/progress`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

async fn read_body(resp: reqwest::Response) -> Result<ProgressResponse, TransportError> {
    resp.json::<ProgressResponse>()
        .await
        .map_err(|e| TransportError::Malformed(e.to_string()))
}

#[async_trait]
impl ProgressTransport for HttpTransport {
    async fn fetch(&self) -> Result<FetchOutcome, TransportError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::SERVICE_UNAVAILABLE {
            debug!("Progress endpoint unavailable ({})", status.as_u16());
            return Ok(FetchOutcome::Disabled);
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: format!("Bootstrap failed ({})", status.as_u16()),
            });
        }

        let payload = read_body(resp).await?;
        if !payload.ok {
            return Err(TransportError::Backend(
                payload.error.unwrap_or_else(|| "Bootstrap failed".to_string()),
            ));
        }

        Ok(FetchOutcome::Remote(RemoteProgress {
            revision: payload.revision.unwrap_or(0),
            updated_at: payload.updated_at,
            state: payload.state.filter(|s| !s.is_null()),
        }))
    }

    async fn push(&self, state: Value, client_revision: u64) -> Result<PushAck, TransportError> {
        let body = PushRequest {
            state,
            client_revision,
        };
        let resp = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: format!("Sync failed ({})", status.as_u16()),
            });
        }

        let payload = read_body(resp).await?;
        if !payload.ok {
            return Err(TransportError::Backend(
                payload.error.unwrap_or_else(|| "Sync failed".to_string()),
            ));
        }

        Ok(PushAck {
            revision: payload.revision,
            updated_at: payload.updated_at,
        })
    }
}
