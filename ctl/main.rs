#![forbid(unsafe_code)]

//! `peerlink-ctl`: local client for the `peerlink` server.
//!
//! Connects to the server's local socket, looks up the exported `calc`
//! instance, runs one calculation, prints the result, and closes the
//! connection with the exit handshake.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use peerlink::calculator::{self, EXPORT_NAME};
use peerlink::config::RunnerConfig;
use peerlink::transport;
use peerlink::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "peerlink-ctl",
    about = "Local client for the peerlink server",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the server's `ipc_name` config).
    #[arg(long, default_value = "peerlink")]
    ipc_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add two integers on the server.
    Sum {
        /// First operand.
        a: i64,
        /// Second operand.
        b: i64,
    },
}

fn main() {
    let args = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("Failed to init tracing: {err}");
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to build tokio runtime: {err}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(&args)) {
        Ok(value) => println!("{value}"),
        Err(AppError::Ipc(err)) => {
            eprintln!("Failed to connect to server: {err}");
            eprintln!("Is peerlink running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

async fn run(args: &Cli) -> Result<i64> {
    let stream = transport::connect(&args.ipc_name).await?;
    let runner = transport::run_over(RunnerConfig::named("ctl"), calculator::catalog()?, stream)?;

    let outcome = match args.command {
        Command::Sum { a, b } => {
            let sum = calculator::sum_method()?;
            runner
                .invoke_named(EXPORT_NAME, &sum, &mut [a.into(), b.into()])
                .await
        }
    };

    runner.close().await;

    let value = outcome?;
    value
        .as_int()
        .ok_or_else(|| AppError::Protocol(format!("expected an integer result, got {value:?}")))
}
