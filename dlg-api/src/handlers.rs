//! Axum handlers and router assembly: wires the Request Parser/Validator,
//! [`crate::executor::PipelineExecutor`], and [`crate::shaper`] together
//! behind the public HTTP surface (spec.md §6), and the root health probe
//! (SPEC_FULL.md §6's supplement).

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dlg_api_core::endpoints::Endpoint;
use dlg_api_core::error::GatewayApiError;
use dlg_api_core::registry::{DeploymentMode, ServiceRegistry};
use dlg_api_core::validation::validate_and_build;
use serde_json::{json, Value};

use crate::auth::{auth_middleware, AuthConfig};
use crate::executor::PipelineExecutor;

/// Shared state every handler closes over.
pub struct GatewayState {
    pub executor: PipelineExecutor,
    pub registry: ServiceRegistry,
    pub deployment_mode: DeploymentMode,
}

/// Every `/v1/*` endpoint this gateway mounts, paired with its canonical
/// path segment and the `run` alias for `/v1/simulate` (spec.md §6).
const ROUTED_ENDPOINTS: &[Endpoint] = &[
    Endpoint::CalculateDirection,
    Endpoint::GetReferencePoint,
    Endpoint::Obstruction,
    Endpoint::Horizon,
    Endpoint::Zenith,
    Endpoint::ObstructionAll,
    Endpoint::ObstructionParallel,
    Endpoint::Encode,
    Endpoint::EncodeRaw,
    Endpoint::Simulate,
    Endpoint::Merge,
    Endpoint::Stats,
];

/// Builds the full router: the unauthenticated root health probe, the
/// `/v1/*` endpoint surface gated by the auth pre-filter, and the `/run`
/// alias of `/v1/simulate` (spec.md §6: "`POST /v1/simulate` (alias
/// `/run`)" - mounted at the bare top-level path, matching the source's own
/// alias placement).
pub fn build_router(state: Arc<GatewayState>, auth_config: Arc<AuthConfig>) -> Router {
    let mut v1 = Router::new();
    for &endpoint in ROUTED_ENDPOINTS {
        v1 = v1.route(
            &format!("/{}", endpoint.path_segment()),
            post(move |State(state): State<Arc<GatewayState>>, Json(body): Json<Value>| {
                handle_endpoint(state, endpoint, body)
            }),
        );
    }
    v1 = v1.layer(axum::middleware::from_fn_with_state(
        auth_config.clone(),
        auth_middleware,
    ));

    Router::new()
        .route("/", get(health))
        .route(
            "/run",
            post(move |State(state): State<Arc<GatewayState>>, Json(body): Json<Value>| {
                handle_endpoint(state, Endpoint::Simulate, body)
            })
            .layer(axum::middleware::from_fn_with_state(auth_config, auth_middleware)),
        )
        .nest("/v1", v1)
        .with_state(state)
}

async fn handle_endpoint(
    state: Arc<GatewayState>,
    endpoint: Endpoint,
    body: Value,
) -> Result<Response, GatewayApiError> {
    let accumulator = validate_and_build(endpoint, &body)?;
    let accumulator = state.executor.run(endpoint, accumulator).await?;
    crate::shaper::shape_response(endpoint, &accumulator)
}

/// `GET /` (SPEC_FULL.md §6's root health endpoint): reports each
/// registered service's base URL as reachable if it's a well-formed URL.
/// This is a lightweight connectivity signal, not a live round-trip
/// healthcheck against each downstream's own `/health` (out of scope per
/// spec.md's OUT OF SCOPE list; see DESIGN.md).
async fn health(State(state): State<Arc<GatewayState>>) -> Response {
    let services: serde_json::Map<String, Value> = state
        .registry
        .iter_services()
        .map(|(name, url)| {
            let reachable = reqwest::Url::parse(url).is_ok();
            (name.to_string(), Value::from(if reachable { "ready" } else { "unreachable" }))
        })
        .collect();
    Json(json!({ "status": "success", "services": services })).into_response()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::client::ServiceClient;

    #[tokio::test]
    async fn health_reports_every_registered_service() {
        let registry = ServiceRegistry::resolve(DeploymentMode::Local, None, |_| None);
        let state = Arc::new(GatewayState {
            executor: PipelineExecutor::new(ServiceClient::new(None), registry.clone()),
            registry,
            deployment_mode: DeploymentMode::Local,
        });
        let response = health(State(state)).await;
        assert_eq!(response.status(), http::StatusCode::OK);
    }
}
