//! Gateway CLI, grounded on `sdk-sidecar::cli::SidecarArgs`: every field is
//! optional and is filled from its environment variable counterpart when
//! absent, so the gateway can be run purely from env (the deployment's
//! usual mode) or with explicit flags (local development).

/// Daylight simulation orchestration gateway.
#[derive(argh::FromArgs)]
pub struct GatewayArgs {
    /// the `<ip-address:port>` to listen on.
    ///
    /// Default: `0.0.0.0:8080`.
    /// Env: `PORT` (port only; binds on all interfaces).
    #[argh(option)]
    pub listen_addr: Option<std::net::SocketAddr>,

    /// deployment mode, one of: ["local", "production"].
    ///
    /// Default: "local".
    /// Env: `DEPLOYMENT_MODE`.
    #[argh(option)]
    pub deployment_mode: Option<String>,

    /// the production host used to derive a downstream service's base URL
    /// when it has no `<SERVICE>_SERVICE_URL` override.
    ///
    /// Only consulted in `production` deployment mode.
    /// Env: `SERVICE_HOST`.
    #[argh(option)]
    pub service_host: Option<String>,
}

impl GatewayArgs {
    pub fn from_cli() -> Self {
        argh::from_env()
    }
}
