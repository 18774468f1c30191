//! bangla10-server: the `/progress` endpoint the trainer syncs against.

use bangla10_srs::cli::ServerArgs;
use bangla10_srs::remote::{select_backend, EnvelopeBackend, MemoryBackend};
use bangla10_srs::{create_router_with_config, RouterConfig};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut backend = select_backend(&args.storage_config());
    if backend.is_none() && args.memory {
        tracing::info!("[server] Using in-memory progress storage");
        backend = Some(Arc::new(MemoryBackend::new()) as Arc<dyn EnvelopeBackend>);
    }
    if backend.is_none() {
        tracing::warn!("[server] No storage configured; /progress will answer 503");
    }

    let app = create_router_with_config(RouterConfig {
        backend,
        max_state_bytes: args.max_state_bytes,
    });

    let addr = format!("{}:{}", args.host, args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("[server] Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("[server] Listening on http://{}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("[server] Server error: {}", e);
        std::process::exit(1);
    }
}
