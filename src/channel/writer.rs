//! Channel writer task.
//!
//! Drains the outbound queue and writes each `OutboundFrame` as one
//! NDJSON line through [`CommandCodec`]. Frames leave in enqueue order.
//! They were encoded and size-checked when queued.
//!
//! The task exits when:
//! - the channel is cancelled,
//! - every sender is dropped,
//! - an `Exit` response has been written (it is always the last frame), or
//! - a write fails, in which case pending calls are interrupted.

use std::sync::Arc;

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tracing::{debug, warn};

use super::{ChannelShared, OutboundFrame};
use crate::protocol::codec::CommandCodec;

/// Writer loop; see the module docs for exit conditions.
pub(crate) async fn run_writer<W>(
    output: W,
    shared: Arc<ChannelShared>,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    max_frame_bytes: usize,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut sink = FramedWrite::new(output, CommandCodec::with_max_frame_bytes(max_frame_bytes));

    loop {
        tokio::select! {
            biased;

            () = shared.cancel.cancelled() => {
                debug!("channel writer: cancellation received, stopping");
                break;
            }

            frame = outbound_rx.recv() => {
                let Some(OutboundFrame { message_id, is_exit, line }) = frame else {
                    debug!("channel writer: outbound queue closed, stopping");
                    break;
                };

                if let Err(e) = sink.send(line).await {
                    warn!(%message_id, error = %e, "channel writer: write failed");
                    shared.interrupt_pending();
                    return;
                }

                if is_exit {
                    debug!(%message_id, "channel writer: exit acknowledged, no further writes");
                    break;
                }
            }
        }
    }

    if let Err(e) = SinkExt::<String>::close(&mut sink).await {
        debug!(error = %e, "channel writer: close failed");
    }
}
