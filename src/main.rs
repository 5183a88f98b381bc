#![forbid(unsafe_code)]

//! `peerlink`: serves a `Calculator` to peers over a local socket.
//!
//! Each accepted connection gets its own runner exporting the calculator
//! under the name `calc`. The connection lives until the peer runs the
//! exit handshake or the server receives a shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use peerlink::calculator::{self, Calculator, CALCULATOR, EXPORT_NAME};
use peerlink::config::RunnerConfig;
use peerlink::transport;
use peerlink::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "peerlink", about = "Serve a calculator to local peers", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured local socket name.
    #[arg(long)]
    ipc_name: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("peerlink server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RunnerConfig::load_from_path(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(name) = args.ipc_name {
        config.ipc_name = name;
        config.validate()?;
    }

    let listener = transport::listen(&config.ipc_name)?;
    let ct = CancellationToken::new();
    let mut connections = Vec::new();
    let mut next_peer: u64 = 0;

    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            () = &mut signal => {
                info!("shutdown signal received");
                break;
            }
            accepted = transport::accept(&listener) => {
                match accepted {
                    Ok(stream) => {
                        next_peer += 1;
                        let mut peer_config = config.clone();
                        peer_config.name = format!("peer-{next_peer}");
                        let span = info_span!("peer", peer = next_peer);
                        connections.push(tokio::spawn(
                            serve_peer(peer_config, stream, ct.clone()).instrument(span),
                        ));
                    }
                    Err(err) => warn!(%err, "accept failed"),
                }
            }
        }
    }

    ct.cancel();
    for handle in connections {
        if let Err(err) = handle.await {
            error!(%err, "peer task panicked");
        }
    }

    info!("peerlink server stopped");
    Ok(())
}

async fn serve_peer(
    config: RunnerConfig,
    stream: interprocess::local_socket::tokio::Stream,
    ct: CancellationToken,
) {
    let catalog = match calculator::catalog() {
        Ok(catalog) => catalog,
        Err(err) => {
            error!(%err, "failed to build catalog");
            return;
        }
    };
    let runner = match transport::run_over(config, catalog, stream) {
        Ok(runner) => runner,
        Err(err) => {
            error!(%err, "failed to start runner");
            return;
        }
    };

    if let Err(err) = runner
        .register(Some(EXPORT_NAME), Arc::new(Calculator), &[CALCULATOR])
        .await
    {
        error!(%err, "failed to export calculator");
        runner.close().await;
        return;
    }
    info!(export = EXPORT_NAME, "calculator exported");

    tokio::select! {
        () = runner.join() => info!("peer disconnected"),
        () = ct.cancelled() => runner.close().await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
