pub mod api;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod prayer;
pub mod progress;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod sync;

use axum::{routing::get, Router};
use remote::{EnvelopeBackend, MemoryBackend, ProgressService};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Configuration for the progress server router.
pub struct RouterConfig {
    /// Storage backend. `None` makes every progress request answer 503.
    pub backend: Option<Arc<dyn EnvelopeBackend>>,
    pub max_state_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            backend: Some(Arc::new(MemoryBackend::new())),
            max_state_bytes: envelope::MAX_STATE_BYTES,
        }
    }
}

/// Router backed by process-local storage.
pub fn create_router() -> Router {
    create_router_with_config(RouterConfig::default())
}

pub fn create_router_with_config(config: RouterConfig) -> Router {
    let service = Arc::new(ProgressService::new(config.backend, config.max_state_bytes));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(api::router(service))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
