//! Local socket transport for runners.
//!
//! Uses a named pipe (Windows) or Unix domain socket (Linux/macOS) from the
//! `interprocess` crate. Each accepted or connected stream is split into
//! its read and write halves and handed to a [`Runner`].

use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
use interprocess::local_socket::{GenericNamespaced, ListenerOptions, Name};
use tracing::{debug, info};

use crate::capability::Catalog;
use crate::config::RunnerConfig;
use crate::runner::Runner;
use crate::{AppError, Result};

fn socket_name(ipc_name: &str) -> Result<Name<'static>> {
    ipc_name
        .to_owned()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{ipc_name}': {err}")))
}

/// Listen on the local socket `ipc_name`.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the name is invalid or the listener cannot be
/// created.
pub fn listen(ipc_name: &str) -> Result<Listener> {
    let listener = ListenerOptions::new()
        .name(socket_name(ipc_name)?)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;
    info!(ipc_name, "listening for peers");
    Ok(listener)
}

/// Accept the next peer connection.
///
/// # Errors
///
/// Returns `AppError::Ipc` if accepting fails.
pub async fn accept(listener: &Listener) -> Result<Stream> {
    let stream = listener
        .accept()
        .await
        .map_err(|err| AppError::Ipc(format!("ipc accept failed: {err}")))?;
    debug!("peer connected");
    Ok(stream)
}

/// Connect to the peer listening on `ipc_name`.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the name is invalid or nobody is listening.
pub async fn connect(ipc_name: &str) -> Result<Stream> {
    let stream = Stream::connect(socket_name(ipc_name)?)
        .await
        .map_err(|err| AppError::Ipc(format!("failed to connect to '{ipc_name}': {err}")))?;
    debug!(ipc_name, "connected to peer");
    Ok(stream)
}

/// Start a runner over a connected local socket stream.
///
/// # Errors
///
/// Returns `AppError::Config` if `config` fails validation.
pub fn run_over(config: RunnerConfig, catalog: Catalog, stream: Stream) -> Result<Runner> {
    let (input, output) = stream.split();
    Runner::new(config, catalog, input, output)
}
