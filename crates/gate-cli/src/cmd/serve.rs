use anyhow::Context;
use gate_server::AppState;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::load_config;

pub fn run(config: &Path, port: Option<u16>) -> anyhow::Result<()> {
    let cfg = load_config(config)?;
    let port = port.unwrap_or(cfg.server.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let state = AppState::from_config(&cfg)?;
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind port {port}"))?;

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("shutdown requested");
                    trigger.cancel();
                }
                Err(e) => tracing::warn!("cannot listen for ctrl-c: {e}"),
            }
        });

        gate_server::serve_on(state, listener, shutdown).await
    })
}
