//! funcie bastion binary.
//!
//! Usage: `funcie-bastion [config.yaml]` (defaults to `funcie.yaml`).
//! Filter logs with `RUST_LOG`.

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use funcie_bastion::{app_state, config, router};
use funcie_core::{FuncieError, Result};

const DEFAULT_CONFIG_PATH: &str = "funcie.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "funcie-bastion exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.bastion.listen_addr()?;
    let role = cfg.bastion.role;

    let state = app_state::AppState::new(cfg).await?;
    let cancel = CancellationToken::new();
    let consumer = state.start_consumer(cancel.clone()).await?;

    let app = router::build_router(state);
    tracing::info!(%listen, ?role, config = %path, "funcie-bastion starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| FuncieError::Transport(format!("bind {listen} failed: {e}")))?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        shutdown.cancel();
    });

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .map_err(|e| FuncieError::Transport(format!("server failed: {e}")));
    cancel.cancel();

    if let Some(task) = consumer {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "consumer stopped with error"),
            Err(e) => tracing::warn!(error = %e, "consumer task failed"),
        }
    }
    served
}
