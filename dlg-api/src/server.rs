//! The HTTP Server (SPEC_FULL.md §2 component 9): an axum [`Router`] wrapped
//! in a layered middleware stack, served with graceful shutdown.
//!
//! Grounded on `lexe-api::server::LayerConfig` and its `build_server_fut`,
//! simplified: no TLS (the spec scopes "HTTP transport details beyond
//! timeouts/retries" out), so `axum::serve` over a plain
//! [`tokio::net::TcpListener`] replaces `axum_server`.

use std::time::Duration;

use axum::{error_handling::HandleErrorLayer, extract::DefaultBodyLimit, Router};
use dlg_api_core::error::{GatewayApiError, GatewayErrorKind};
use dlg_tokio::{notify_once::NotifyOnce, task::GwTask};
use tower::{
    buffer::BufferLayer, limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer,
    timeout::TimeoutLayer, ServiceBuilder,
};
use tracing::info;

/// Tunable knobs for the inbound axum server's middleware stack (SPEC_FULL.md
/// §5's ambient HTTP Server concurrency controls).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LayerConfig {
    /// Maximum request body size in bytes (`None` disables the limit).
    /// Meshes can carry thousands of triangles as flat float arrays, so this
    /// is set well above the teacher's own 16KiB sidecar default; see
    /// DESIGN.md.
    pub body_limit: Option<usize>,
    /// Whether to shed load once the concurrency limit is saturated, rather
    /// than queue unboundedly.
    pub load_shed: bool,
    /// Work buffer size ahead of the concurrency limit (`None` disables it).
    pub buffer_size: Option<usize>,
    /// Maximum in-flight requests (`None` disables the limit).
    pub concurrency: Option<usize>,
    /// Ceiling on one inbound request's total handling time, covering every
    /// pipeline stage and fan-out — distinct from the 300s per-downstream-
    /// call read timeout in [`crate::client::ServiceClient`].
    pub handling_timeout: Option<Duration>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            // 4MiB: generous enough for mesh payloads.
            body_limit: Some(4 * 1024 * 1024),
            load_shed: true,
            buffer_size: Some(1024),
            concurrency: Some(256),
            handling_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Applies [`LayerConfig`]'s middleware stack to a fully-built router.
/// Requests flow top to bottom; responses bottom to top.
pub fn apply_layers(router: Router, config: &LayerConfig) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            config
                .body_limit
                .map(DefaultBodyLimit::max)
                .unwrap_or_else(DefaultBodyLimit::disable),
        )
        .layer(HandleErrorLayer::new(capacity_error))
        .option_layer(config.load_shed.then(LoadShedLayer::new))
        .option_layer(config.buffer_size.map(BufferLayer::new))
        .option_layer(config.concurrency.map(ConcurrencyLimitLayer::new))
        .layer(HandleErrorLayer::new(timeout_error))
        .option_layer(config.handling_timeout.map(TimeoutLayer::new));
    router.layer(middleware)
}

/// SPEC_FULL.md §5: the `LoadShedLayer` should "fail fast with 503", not 500 -
/// reuses [`GatewayErrorKind::Connection`] (already mapped to 503) since
/// spec.md §7's closed taxonomy has no dedicated "overloaded" kind.
async fn capacity_error(error: tower::BoxError) -> GatewayApiError {
    GatewayApiError::new(
        GatewayErrorKind::Connection {
            service: "gateway".to_owned(),
            endpoint: "request queue".to_owned(),
        },
        format!("gateway is at capacity, retry later: {error}"),
    )
}

async fn timeout_error(error: tower::BoxError) -> GatewayApiError {
    GatewayApiError::new(
        GatewayErrorKind::Internal,
        format!("gateway timed out handling the request: {error}"),
    )
}

/// Binds, layers, and spawns the router as a named, panic-propagating task
/// (SPEC_FULL.md §2 component 12), returning the task and the bound URL.
/// Shuts down gracefully when `shutdown` fires.
pub async fn spawn_server(
    bind_addr: std::net::SocketAddr,
    router: Router,
    layer_config: LayerConfig,
    mut shutdown: NotifyOnce,
) -> anyhow::Result<(GwTask<()>, String)> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let local_addr = listener.local_addr()?;
    let server_url = format!("http://{local_addr}");
    info!("daylight gateway listening on {server_url}");

    let layered = apply_layers(router, &layer_config);
    let server_fut = async move {
        axum::serve(listener, layered.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown.recv().await;
                info!("shutting down HTTP server");
            })
            .await
            .expect("axum::serve should not error after a bound listener");
    };
    let task = GwTask::spawn("http-server", server_fut);
    Ok((task, server_url))
}
