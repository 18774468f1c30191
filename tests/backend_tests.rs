//! Storage adapters against in-process mocks of their REST protocols.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use bangla10_srs::envelope::MAX_STATE_BYTES;
use bangla10_srs::remote::{BlobBackend, EnvelopeBackend, KvBackend, ProgressService};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer secret")
}

// Key/value store

#[derive(Default)]
struct KvMock {
    values: Mutex<Vec<(String, String)>>,
}

async fn kv_command(
    State(kv): State<Arc<KvMock>>,
    headers: HeaderMap,
    Json(command): Json<Vec<Value>>,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "WRONGPASS invalid token"})));
    }
    let arg = |i: usize| command.get(i).and_then(Value::as_str).unwrap_or("").to_string();
    let mut values = kv.values.lock().unwrap();
    match arg(0).as_str() {
        "GET" => {
            let key = arg(1);
            let found = values.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());
            (StatusCode::OK, Json(json!({"result": found})))
        }
        "SET" => {
            let (key, value) = (arg(1), arg(2));
            values.retain(|(k, _)| *k != key);
            values.push((key, value));
            (StatusCode::OK, Json(json!({"result": "OK"})))
        }
        other => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("ERR unknown command {}", other)})),
        ),
    }
}

async fn kv_server() -> (Arc<KvMock>, String) {
    let kv = Arc::new(KvMock::default());
    let app = Router::new()
        .route("/", post(kv_command))
        .with_state(kv.clone());
    (kv, serve(app).await)
}

#[tokio::test]
async fn test_kv_round_trip_through_service() {
    let (kv, url) = kv_server().await;
    let backend = Arc::new(KvBackend::new(url, "secret".to_string(), "test:progress".to_string()));
    let service = ProgressService::new(Some(backend.clone()), MAX_STATE_BYTES);

    assert!(service.read().await.unwrap().is_none(), "empty key reads as nothing stored");

    service.write(&json!({"stats": {"totalSessions": 1}}), 0).await.unwrap();
    let ack = service.write(&json!({"stats": {"totalSessions": 2}}), 1).await.unwrap();
    assert_eq!(ack.backend, "kv");
    assert_eq!(ack.revision, 2);

    let stored = backend.read_envelope().await.unwrap().unwrap();
    assert_eq!(stored.revision, 2);
    assert_eq!(stored.state["stats"]["totalSessions"], 2);

    // The value is kept as serialized text under the configured key.
    let values = kv.values.lock().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].0, "test:progress");
    let raw: Value = serde_json::from_str(&values[0].1).unwrap();
    assert_eq!(raw["revision"], 2);
}

#[tokio::test]
async fn test_kv_corrupt_value_reads_as_absent() {
    let (kv, url) = kv_server().await;
    kv.values
        .lock()
        .unwrap()
        .push(("test:progress".to_string(), "{not json".to_string()));

    let backend = KvBackend::new(url, "secret".to_string(), "test:progress".to_string());
    assert!(backend.read_envelope().await.unwrap().is_none());
}

#[tokio::test]
async fn test_kv_error_reply_is_propagated() {
    let (_kv, url) = kv_server().await;
    let backend = KvBackend::new(url, "wrong".to_string(), "test:progress".to_string());

    let err = backend.read_envelope().await.unwrap_err();
    assert!(err.to_string().contains("WRONGPASS"));
}

// Blob store

struct BlobMock {
    base: Mutex<String>,
    object: Mutex<Option<Bytes>>,
    put_headers: Mutex<Option<HeaderMap>>,
}

async fn blob_list(State(blob): State<Arc<BlobMock>>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "forbidden"})));
    }
    let blobs = if blob.object.lock().unwrap().is_some() {
        let base = blob.base.lock().unwrap().clone();
        json!([
            {"pathname": "bangla10/progress.json.bak", "url": format!("{}/files/other", base)},
            {"pathname": "bangla10/progress.json", "url": format!("{}/files/progress.json", base)}
        ])
    } else {
        json!([])
    };
    (StatusCode::OK, Json(json!({"blobs": blobs})))
}

async fn blob_put(State(blob): State<Arc<BlobMock>>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::FORBIDDEN;
    }
    *blob.object.lock().unwrap() = Some(body);
    *blob.put_headers.lock().unwrap() = Some(headers);
    StatusCode::OK
}

async fn blob_read(State(blob): State<Arc<BlobMock>>) -> impl IntoResponse {
    match blob.object.lock().unwrap().clone() {
        Some(body) => (StatusCode::OK, body),
        None => (StatusCode::NOT_FOUND, Bytes::new()),
    }
}

async fn blob_server() -> (Arc<BlobMock>, String) {
    let blob = Arc::new(BlobMock {
        base: Mutex::new(String::new()),
        object: Mutex::new(None),
        put_headers: Mutex::new(None),
    });
    let app = Router::new()
        .route("/", get(blob_list))
        .route("/bangla10/progress.json", put(blob_put))
        .route("/files/progress.json", get(blob_read))
        .with_state(blob.clone());
    let base = serve(app).await;
    *blob.base.lock().unwrap() = base.clone();
    (blob, base)
}

#[tokio::test]
async fn test_blob_round_trip_through_service() {
    let (blob, base) = blob_server().await;
    let backend = Arc::new(BlobBackend::new(
        base,
        "secret".to_string(),
        "bangla10/progress.json".to_string(),
    ));
    let service = ProgressService::new(Some(backend.clone()), MAX_STATE_BYTES);

    assert!(service.read().await.unwrap().is_none(), "missing object reads as nothing stored");

    let ack = service.write(&json!({"phrases": {"hello": {"box": 2}}}), 0).await.unwrap();
    assert_eq!(ack.backend, "blob");
    assert_eq!(ack.revision, 1);

    let stored = service.read().await.unwrap().unwrap();
    assert_eq!(stored.revision, 1);
    assert_eq!(stored.state["phrases"]["hello"]["box"], 2);

    let headers = blob.put_headers.lock().unwrap().clone().unwrap();
    assert_eq!(headers["x-add-random-suffix"], "0");
    assert_eq!(headers["x-allow-overwrite"], "1");
}

#[tokio::test]
async fn test_blob_list_failure_is_an_error() {
    let (_blob, base) = blob_server().await;
    let backend = BlobBackend::new(base, "wrong".to_string(), "bangla10/progress.json".to_string());

    let err = backend.read_envelope().await.unwrap_err();
    assert!(err.to_string().contains("403"));
}
