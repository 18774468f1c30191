use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::remote::{ProgressResponse, ProgressService, ServiceError};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ProgressService>,
}

pub fn router(service: Arc<ProgressService>) -> Router {
    let state = ApiState { service };

    Router::new()
        .route(
            "/progress",
            get(get_progress)
                .post(post_progress)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/progress",
            get(get_progress)
                .post(post_progress)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .with_state(state)
}

fn respond(status: StatusCode, body: ProgressResponse) -> Response {
    (status, [(header::CACHE_CONTROL, "no-store")], Json(body)).into_response()
}

fn failure(status: StatusCode, error: impl ToString) -> Response {
    respond(
        status,
        ProgressResponse {
            ok: false,
            error: Some(error.to_string()),
            ..Default::default()
        },
    )
}

fn not_configured() -> Response {
    respond(
        StatusCode::SERVICE_UNAVAILABLE,
        ProgressResponse {
            ok: false,
            enabled: Some(false),
            error: Some(ServiceError::NotConfigured.to_string()),
            ..Default::default()
        },
    )
}

async fn get_progress(State(state): State<ApiState>) -> Response {
    let Some(backend) = state.service.backend_name() else {
        return not_configured();
    };

    match state.service.read().await {
        Ok(envelope) => {
            let (revision, updated_at, stored) = match envelope {
                Some(e) => (e.revision, e.updated_at, Value::Object(e.state)),
                None => (0, None, Value::Null),
            };
            respond(
                StatusCode::OK,
                ProgressResponse {
                    ok: true,
                    enabled: Some(true),
                    backend: Some(backend.to_string()),
                    revision: Some(revision),
                    updated_at,
                    state: Some(stored),
                    error: None,
                },
            )
        }
        Err(ServiceError::NotConfigured) => not_configured(),
        Err(e) => {
            warn!("[server] Failed to read progress: {}", e);
            failure(StatusCode::BAD_GATEWAY, e)
        }
    }
}

/// Accepts a JSON object, or a JSON string holding one. Anything else is
/// treated as an empty body and rejected for its missing state.
fn incoming_body(bytes: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::String(text)) => serde_json::from_str(&text).unwrap_or(Value::Null),
        Ok(value) => value,
        Err(_) => Value::Null,
    }
}

async fn post_progress(State(state): State<ApiState>, body: Bytes) -> Response {
    if state.service.backend_name().is_none() {
        return not_configured();
    }

    let body = incoming_body(&body);
    let client_revision = body.get("clientRevision").and_then(Value::as_u64).unwrap_or(0);
    let incoming = body.get("state").cloned().unwrap_or(Value::Null);

    match state.service.write(&incoming, client_revision).await {
        Ok(ack) => {
            debug!("[server] Stored revision {} in {}", ack.revision, ack.backend);
            respond(
                StatusCode::OK,
                ProgressResponse {
                    ok: true,
                    backend: Some(ack.backend.to_string()),
                    revision: Some(ack.revision),
                    updated_at: Some(ack.updated_at),
                    ..Default::default()
                },
            )
        }
        Err(ServiceError::NotConfigured) => not_configured(),
        Err(e) => {
            warn!("[server] Rejected progress write: {}", e);
            failure(StatusCode::BAD_REQUEST, e)
        }
    }
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn method_not_allowed() -> Response {
    failure(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_incoming_body_is_lenient() {
        assert_eq!(incoming_body(br#"{"state": {}}"#), json!({"state": {}}));
        assert_eq!(
            incoming_body(br#""{\"state\": {\"a\": 1}}""#),
            json!({"state": {"a": 1}})
        );
        assert_eq!(incoming_body(b"garbage"), Value::Null);
        assert_eq!(incoming_body(b""), Value::Null);
    }
}
