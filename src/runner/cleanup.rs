//! Cleanup task for released anonymous stand-ins.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::Runner;
use crate::protocol::InstanceId;

/// Drain the release queue, withdrawing each released instance.
///
/// Stops when the runner finishes.
pub(crate) async fn run_cleanup(runner: Runner, mut release_rx: mpsc::UnboundedReceiver<InstanceId>) {
    let cancel = runner.shared.cancel.clone();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("cleanup: cancellation received, stopping");
                break;
            }

            released = release_rx.recv() => {
                let Some(instance_id) = released else {
                    debug!("cleanup: release queue closed, stopping");
                    break;
                };

                if runner.is_closed() {
                    runner.shared.registry.remove(instance_id);
                    continue;
                }

                debug!(%instance_id, "cleanup: withdrawing released stand-in");
                if let Err(err) = runner.withdraw(instance_id).await {
                    warn!(%instance_id, %err, "cleanup: withdraw failed");
                    runner.shared.registry.remove(instance_id);
                }
            }
        }
    }
}
