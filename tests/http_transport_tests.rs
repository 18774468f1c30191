use bangla10_srs::remote::{FetchOutcome, HttpTransport, ProgressTransport};
use bangla10_srs::{create_router, create_router_with_config, RouterConfig};
use serde_json::json;

/// Serve `app` on an ephemeral local port and return the progress URL.
async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/progress", addr)
}

#[tokio::test]
async fn test_fetch_push_fetch() {
    let transport = HttpTransport::new(serve(create_router()).await);

    let FetchOutcome::Remote(empty) = transport.fetch().await.unwrap() else {
        panic!("configured endpoint should not be disabled");
    };
    assert_eq!(empty.revision, 0);
    assert!(empty.state.is_none(), "nothing stored yet");

    let ack = transport
        .push(json!({"stats": {"totalSessions": 2}}), 0)
        .await
        .unwrap();
    assert_eq!(ack.revision, Some(1));
    assert!(ack.updated_at.is_some());

    let FetchOutcome::Remote(stored) = transport.fetch().await.unwrap() else {
        panic!("configured endpoint should not be disabled");
    };
    assert_eq!(stored.revision, 1);
    assert_eq!(stored.updated_at, ack.updated_at);
    assert_eq!(stored.state.unwrap()["stats"]["totalSessions"], 2);
}

#[tokio::test]
async fn test_unconfigured_server_disables_sync() {
    let app = create_router_with_config(RouterConfig {
        backend: None,
        max_state_bytes: 900_000,
    });
    let transport = HttpTransport::new(serve(app).await);

    assert_eq!(transport.fetch().await.unwrap(), FetchOutcome::Disabled);
    assert!(transport.push(json!({}), 0).await.is_err());
}

#[tokio::test]
async fn test_rejected_push_reports_status() {
    let app = create_router_with_config(RouterConfig {
        max_state_bytes: 16,
        ..Default::default()
    });
    let transport = HttpTransport::new(serve(app).await);

    let err = transport
        .push(json!({"blob": "far more than sixteen bytes"}), 0)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_an_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(format!("http://{}/progress", addr));
    assert!(transport.fetch().await.is_err());
}
