//! Local stand-ins for the peer's exports.

use std::fmt::{Debug, Formatter};
use std::sync::Weak;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Runner, RunnerShared};
use crate::capability::MethodDesc;
use crate::object::{Object, Value};
use crate::protocol::InstanceId;
use crate::{AppError, Result};

/// Stand-in forwarding every call on its capabilities to the peer.
///
/// Proxies for anonymous exports carry a release sender: dropping the
/// last handle to one queues its instance id for the cleanup task, which
/// withdraws the registration on both sides. Keep the handle alive for as
/// long as the peer's object is needed.
pub struct RemoteProxy {
    runner: Weak<RunnerShared>,
    instance_id: InstanceId,
    capabilities: Vec<String>,
    release: Option<mpsc::UnboundedSender<InstanceId>>,
}

impl RemoteProxy {
    pub(crate) fn new(
        runner: Weak<RunnerShared>,
        instance_id: InstanceId,
        capabilities: Vec<String>,
        release: Option<mpsc::UnboundedSender<InstanceId>>,
    ) -> Self {
        Self {
            runner,
            instance_id,
            capabilities,
            release,
        }
    }

    /// Instance id of the peer's export.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }
}

impl Object for RemoteProxy {
    fn invoke<'a>(
        &'a self,
        method: &'a MethodDesc,
        args: &'a mut [Value],
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            if !self
                .capabilities
                .iter()
                .any(|c| c == method.declaring_type())
            {
                return Err(AppError::Argument(format!(
                    "instance {} does not implement {}",
                    self.instance_id,
                    method.declaring_type()
                )));
            }
            let shared = self.runner.upgrade().ok_or_else(|| {
                AppError::Closed(format!(
                    "runner for instance {} has been dropped",
                    self.instance_id
                ))
            })?;
            Runner::from_shared(shared)
                .invoke(Some(self.instance_id), method, args)
                .await
        })
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }
}

impl Debug for RemoteProxy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("instance_id", &self.instance_id)
            .field("capabilities", &self.capabilities)
            .field("released_on_drop", &self.release.is_some())
            .finish()
    }
}

impl Drop for RemoteProxy {
    fn drop(&mut self) {
        if let Some(release) = &self.release {
            if release.send(self.instance_id).is_err() {
                debug!(instance_id = %self.instance_id, "release queue closed, skipping cleanup");
            }
        }
    }
}
