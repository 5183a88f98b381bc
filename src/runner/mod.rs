//! RPC runner.
//!
//! A [`Runner`] joins one [`CommandChannel`] to an [`InstanceRegistry`]
//! and an [`OverrideSet`]. It exports local objects to the peer, hands out
//! [`RemoteProxy`] stand-ins for the peer's exports, and answers the peer's
//! requests on a background dispatch task.
//!
//! Lifecycle: `Open → Closing → Closed`. Closing starts when either side
//! begins the `Exit` handshake; once a runner leaves `Open`, every public
//! operation except [`state`](Runner::state) and [`is_closed`](Runner::is_closed)
//! fails with [`AppError::Closed`].
//!
//! Background tasks per runner:
//! - **dispatch** (`take → process → put`), one request at a time;
//! - **cleanup**, which deregisters anonymous stand-ins once the last
//!   handle to them is dropped.
//!
//! Dispatch is sequential. A call chain that re-enters a peer whose
//! dispatch task is already busy waits for that task and can deadlock.
//!
//! The background tasks hold their own [`Runner`] handles, so dropping
//! every user handle does not stop them. Call [`close`](Runner::close) to
//! end a session; otherwise the tasks and the channel live until the peer
//! closes the stream.

mod cleanup;
mod dispatch;
mod invoke;
pub mod proxy;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use proxy::RemoteProxy;

use crate::capability::Catalog;
use crate::channel::CommandChannel;
use crate::config::RunnerConfig;
use crate::marshal::{OverrideSet, RpcOverride};
use crate::object::ObjectRef;
use crate::protocol::{CommandRequest, CommandResponse, InstanceId, RequestBody};
use crate::registry::{Backing, InstanceKey, InstanceRegistry};
use crate::{AppError, Result};

/// Lifecycle state of a [`Runner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Accepting operations.
    Open,
    /// `Exit` sent or received; the in-flight exchange may finish.
    Closing,
    /// No further sends; background tasks stopped.
    Closed,
}

/// State shared by the runner handle, its tasks, and its proxies.
#[derive(Debug)]
pub(crate) struct RunnerShared {
    name: String,
    config: RunnerConfig,
    catalog: Arc<Catalog>,
    channel: CommandChannel,
    registry: InstanceRegistry,
    overrides: OverrideSet,
    state: Mutex<RunnerState>,
    cancel: CancellationToken,
    release_tx: mpsc::UnboundedSender<InstanceId>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RunnerShared {
    fn state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move from `from` to `to`; returns `false` if the state was not `from`.
    fn transition(&self, from: RunnerState, to: RunnerState) -> bool {
        let mut state = self.state();
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }
}

/// Handle to one side of a peer connection. Clones share the same runner.
///
/// Dropping the last handle does not stop the runner; call
/// [`close`](Self::close).
#[derive(Debug, Clone)]
pub struct Runner {
    shared: Arc<RunnerShared>,
}

impl Runner {
    /// Start a runner over `input` and `output`.
    ///
    /// Spawns the channel pumps and the dispatch and cleanup tasks, so it
    /// must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if `config` fails validation.
    pub fn new<R, W>(config: RunnerConfig, catalog: Catalog, input: R, output: W) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        config.validate()?;
        let name = config.label().to_owned();
        let channel = CommandChannel::new(name.clone(), input, output, config.max_frame_bytes);
        let (release_tx, release_rx) = mpsc::unbounded_channel();

        let runner = Self {
            shared: Arc::new(RunnerShared {
                name: name.clone(),
                config,
                catalog: Arc::new(catalog),
                channel,
                registry: InstanceRegistry::new(),
                overrides: OverrideSet::new(),
                state: Mutex::new(RunnerState::Open),
                cancel: CancellationToken::new(),
                release_tx,
                tasks: Mutex::new(Vec::new()),
            }),
        };

        let dispatch = tokio::spawn(
            dispatch::run_dispatch(runner.clone())
                .instrument(info_span!("runner_dispatch", runner = %name)),
        );
        let cleanup = tokio::spawn(
            cleanup::run_cleanup(runner.clone(), release_rx)
                .instrument(info_span!("runner_cleanup", runner = %name)),
        );
        runner.tasks().extend([dispatch, cleanup]);

        info!(runner = %name, "runner started");
        Ok(runner)
    }

    pub(crate) fn from_shared(shared: Arc<RunnerShared>) -> Self {
        Self { shared }
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.shared
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Log label of this runner.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Capabilities this runner knows about.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.shared.catalog
    }

    /// Local instance registry.
    #[must_use]
    pub fn registry(&self) -> &InstanceRegistry {
        &self.shared.registry
    }

    /// Overrides currently applied by this runner.
    #[must_use]
    pub fn overrides(&self) -> &OverrideSet {
        &self.shared.overrides
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        *self.shared.state()
    }

    /// Whether the runner has left the `Open` state.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() != RunnerState::Open
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(AppError::Closed(format!("runner {} is closed", self.shared.name)))
        } else {
            Ok(())
        }
    }

    /// Export `object` to the peer under `capabilities`.
    ///
    /// The instance is registered locally before the peer is told about
    /// it. Without a name it is exported as `anonymous-<id>`. An empty
    /// `capabilities` slice falls back to [`Object::capabilities`](crate::object::Object::capabilities).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] if the runner is closed,
    /// [`AppError::Argument`] if a capability is not a known interface or
    /// none is given, and any channel error from the `Register` exchange.
    pub async fn register(
        &self,
        name: Option<&str>,
        object: ObjectRef,
        capabilities: &[&str],
    ) -> Result<InstanceId> {
        self.ensure_open()?;
        let capabilities = if capabilities.is_empty() {
            object.capabilities()
        } else {
            capabilities.iter().map(|&c| c.to_owned()).collect()
        };
        if capabilities.is_empty() {
            return Err(AppError::Argument(
                "an export needs at least one capability".into(),
            ));
        }
        self.export(name.map(str::to_owned), object, capabilities)
            .await
    }

    /// Export `object` under its own [`Object::capabilities`](crate::object::Object::capabilities).
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub async fn register_object(&self, name: Option<&str>, object: ObjectRef) -> Result<InstanceId> {
        self.register(name, object, &[]).await
    }

    /// Register locally, then announce to the peer.
    pub(crate) async fn export(
        &self,
        name: Option<String>,
        object: ObjectRef,
        capabilities: Vec<String>,
    ) -> Result<InstanceId> {
        self.shared.catalog.check_interfaces(&capabilities)?;
        let id = Uuid::new_v4();
        let entry = self
            .shared
            .registry
            .register(name, id, capabilities.clone(), Backing::Object(object));
        let request = CommandRequest::register(entry.name.clone(), id, capabilities);
        drop(entry);

        let exchange = self.shared.channel.call(request).await;
        match exchange.and_then(|response| expect_op(&response, "register")) {
            Ok(()) => {
                debug!(runner = %self.shared.name, instance_id = %id, "instance exported");
                Ok(id)
            }
            Err(err) => {
                self.shared.registry.remove(id);
                Err(err)
            }
        }
    }

    /// Withdraw an instance: tell the peer, then remove it locally.
    ///
    /// Returns `false` if nothing is registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] if the runner is closed, and any channel
    /// error from the `Deregister` exchange.
    pub async fn deregister(&self, key: impl Into<InstanceKey>) -> Result<bool> {
        self.ensure_open()?;
        let key = key.into();
        let Some(entry) = self.shared.registry.try_get(&key) else {
            debug!(runner = %self.shared.name, %key, "deregister: nothing registered");
            return Ok(false);
        };
        let id = entry.id;
        drop(entry);
        self.withdraw(id).await?;
        Ok(true)
    }

    pub(crate) async fn withdraw(&self, id: InstanceId) -> Result<()> {
        let response = self
            .shared
            .channel
            .call(CommandRequest::deregister(id))
            .await?;
        expect_op(&response, "deregister")?;
        self.shared.registry.remove(id);
        debug!(runner = %self.shared.name, instance_id = %id, "instance withdrawn");
        Ok(())
    }

    /// Instance registered under `key`, waiting until it is registered.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] if the runner is closed,
    /// [`AppError::Interrupted`] if it closes while waiting, and
    /// [`AppError::NullReference`] if the instance was a released stand-in.
    pub async fn get(&self, key: impl Into<InstanceKey>) -> Result<ObjectRef> {
        self.ensure_open()?;
        let key = key.into();
        let entry = self.shared.registry.get_or_wait(&key).await?;
        entry
            .instance()
            .ok_or_else(|| AppError::NullReference(format!("instance {key} was released")))
    }

    /// Instance registered under `key`, if any; never waits.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] if the runner is closed.
    pub fn try_get(&self, key: impl Into<InstanceKey>) -> Result<Option<ObjectRef>> {
        self.ensure_open()?;
        Ok(self
            .shared
            .registry
            .try_get(&key.into())
            .and_then(|entry| entry.instance()))
    }

    /// Apply `rpc_override` locally and on the peer.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] if the runner is closed, and any channel
    /// error from the exchange.
    pub async fn add_rpc_override(&self, rpc_override: RpcOverride) -> Result<()> {
        self.ensure_open()?;
        if !self.shared.overrides.add(rpc_override.clone()) {
            debug!(runner = %self.shared.name, %rpc_override, "override already active");
        }
        let response = self
            .shared
            .channel
            .call(CommandRequest::new(RequestBody::AddRpcOverride { rpc_override }))
            .await?;
        expect_op(&response, "add_rpc_override")
    }

    /// Stop applying `rpc_override` locally and on the peer.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] if the runner is closed, and any channel
    /// error from the exchange.
    pub async fn remove_rpc_override(&self, rpc_override: &RpcOverride) -> Result<()> {
        self.ensure_open()?;
        if !self.shared.overrides.remove(rpc_override) {
            debug!(runner = %self.shared.name, %rpc_override, "override was not active");
        }
        let response = self
            .shared
            .channel
            .call(CommandRequest::new(RequestBody::RemoveRpcOverride {
                rpc_override: rpc_override.clone(),
            }))
            .await?;
        expect_op(&response, "remove_rpc_override")
    }

    /// Run the `Exit` handshake and stop background processing.
    ///
    /// Waits up to the configured shutdown timeout for the peer's
    /// acknowledgement. Idempotent.
    pub async fn close(&self) {
        if !self
            .shared
            .transition(RunnerState::Open, RunnerState::Closing)
        {
            debug!(runner = %self.shared.name, "close: already closing");
            return;
        }
        info!(runner = %self.shared.name, "closing runner");

        let timeout = self.shared.config.shutdown_timeout();
        let exit = self.shared.channel.call(CommandRequest::exit());
        match tokio::time::timeout(timeout, exit).await {
            Ok(Ok(response)) if response.is_exit() => {
                debug!(runner = %self.shared.name, "exit acknowledged");
            }
            Ok(Ok(response)) => {
                warn!(runner = %self.shared.name, op = response.op(), "unexpected reply to exit");
            }
            Ok(Err(err)) => {
                debug!(runner = %self.shared.name, %err, "exit handshake interrupted");
            }
            Err(_) => {
                warn!(
                    runner = %self.shared.name,
                    timeout_seconds = self.shared.config.shutdown_timeout_seconds,
                    "exit handshake timed out"
                );
            }
        }

        self.finish();
    }

    /// Stop tasks, interrupt waiters, and close the channel. Idempotent.
    pub(crate) fn finish(&self) {
        {
            let mut state = self.shared.state();
            if *state == RunnerState::Closed {
                return;
            }
            *state = RunnerState::Closed;
        }
        self.shared.cancel.cancel();
        self.shared.registry.shutdown();
        self.shared.channel.close();
        info!(runner = %self.shared.name, "runner closed");
    }

    /// Wait for the background tasks and channel pumps to finish.
    ///
    /// They finish once the runner is closed from either side or the
    /// stream ends.
    pub async fn join(&self) {
        let handles: Vec<_> = self.tasks().drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(runner = %self.shared.name, %err, "runner task ended abnormally");
            }
        }
        self.shared.channel.join().await;
    }
}

fn expect_op(response: &CommandResponse, expected: &str) -> Result<()> {
    if response.op() == expected {
        Ok(())
    } else {
        Err(AppError::Protocol(format!(
            "expected {expected} response to {}, got {}",
            response.message_id,
            response.op()
        )))
    }
}
