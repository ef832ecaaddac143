//! Natural-language UI descriptions over a stateless MCP endpoint.

pub mod adapter;
pub mod app;
pub mod cli;
pub mod protocol;
pub mod store;
pub mod tools;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use url::Url;

pub use app::{build_router, AppState};
pub use store::InstanceStore;

/// Everything the server needs besides a bound listener.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Page that renders stored instances; references append `instanceId`.
    pub base_url: Url,
    pub sweep_interval: Duration,
    pub cors: Option<CorsLayer>,
}

impl ServerConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            sweep_interval: store::DEFAULT_SWEEP_INTERVAL,
            cors: None,
        }
    }
}

/// Serves until `shutdown` resolves, then stops the sweep task.
pub async fn serve<S>(listener: TcpListener, config: ServerConfig, shutdown: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let store = Arc::new(InstanceStore::new());
    let sweeper = store.spawn_sweeper(config.sweep_interval);
    let state = AppState::new(store, config.base_url);

    let mut router = build_router(state);
    if let Some(cors) = config.cors {
        router = router.layer(cors);
    }

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await;
    sweeper.abort();
    tracing::info!("server stopped");
    result
}
