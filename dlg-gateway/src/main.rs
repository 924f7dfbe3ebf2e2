//! Daylight simulation orchestration gateway entrypoint.
//!
//! Grounded on `sdk-sidecar`'s `main`/`run` split: parse CLI args, load
//! `.env` if present, init the logger, build every long-lived component once,
//! then run the HTTP server until a shutdown signal arrives.

mod cli;
mod config;

use std::sync::Arc;

use anyhow::Context;
use dlg_api::client::ServiceClient;
use dlg_api::executor::PipelineExecutor;
use dlg_api::handlers::{build_router, GatewayState};
use dlg_api::server::{spawn_server, LayerConfig};
use dlg_api_core::registry::ServiceRegistry;
use dlg_tokio::notify_once::NotifyOnce;
use dlg_tokio::task::GwTask;
use tracing::info;

use crate::cli::GatewayArgs;
use crate::config::GatewayConfig;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    dlg_logger::init();

    let config = GatewayConfig::from_args(GatewayArgs::from_cli())?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(run(config))
}

async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let registry = ServiceRegistry::resolve(
        config.deployment_mode,
        config.service_host.as_deref(),
        |var| std::env::var(var).ok(),
    );

    let client = ServiceClient::new(config.api_token.clone())
        .with_deployment_mode(config.deployment_mode);
    let executor = PipelineExecutor::new(client, registry.clone());

    let auth_config = Arc::new(config.to_auth_config());
    let state = Arc::new(GatewayState {
        executor,
        registry,
        deployment_mode: config.deployment_mode,
    });
    let router = build_router(state, auth_config);

    let shutdown = NotifyOnce::new();
    let (server_task, server_url): (GwTask<()>, String) =
        spawn_server(config.listen_addr, router, LayerConfig::default(), shutdown.clone()).await?;
    info!("daylight gateway ready at {server_url}");

    let ctrl_c_shutdown = shutdown.clone();
    let signal_task = GwTask::spawn("ctrl-c-handler", async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down");
            ctrl_c_shutdown.send();
        }
    });

    dlg_tokio::task::try_join_tasks_and_shutdown(
        vec![server_task],
        tokio::sync::mpsc::channel(1).1,
        shutdown,
        std::time::Duration::from_secs(30),
    )
    .await
    .map_err(|e| anyhow::anyhow!("gateway task error: {e:#}"))?;

    signal_task.abort();
    Ok(())
}
