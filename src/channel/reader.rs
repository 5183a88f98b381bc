//! Channel reader task.
//!
//! Decodes frames from the inbound byte stream and routes each command:
//!
//! | Frame             | Action                                       |
//! |-------------------|----------------------------------------------|
//! | response          | resolve the pending call with the same id    |
//! | `exit` request    | queue it, then stop reading                  |
//! | any other request | queue it for [`take`](super::CommandChannel::take) |
//!
//! Malformed frames are logged and skipped. End of stream, an I/O error,
//! or a framing error ends the task and interrupts pending calls.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use super::ChannelShared;
use crate::protocol::codec::{decode_frame, CommandCodec};
use crate::protocol::{Command, CommandRequest};

/// Reader loop; runs until exit, end of stream, error, or channel close.
pub(crate) async fn run_reader<R>(
    input: R,
    shared: Arc<ChannelShared>,
    inbound_tx: mpsc::UnboundedSender<CommandRequest>,
    max_frame_bytes: usize,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(input, CommandCodec::with_max_frame_bytes(max_frame_bytes));

    loop {
        tokio::select! {
            biased;

            () = shared.cancel.cancelled() => {
                debug!("channel reader: cancellation received, stopping");
                return;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("channel reader: EOF detected");
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "channel reader: stream error, stopping");
                        break;
                    }

                    Some(Ok(line)) => match decode_frame(&line) {
                        Ok(Some(Command::Response(response))) => shared.resolve(response),
                        Ok(Some(Command::Request(request))) => {
                            let is_exit = request.is_exit();
                            debug!(
                                message_id = %request.message_id,
                                op = request.op(),
                                "channel reader: request received"
                            );
                            if inbound_tx.send(request).is_err() {
                                debug!("channel reader: inbound queue closed, stopping");
                                break;
                            }
                            if is_exit {
                                debug!("channel reader: peer announced exit, no further reads");
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, raw_line = %line, "channel reader: bad frame, skipping");
                        }
                    },
                }
            }
        }
    }

    shared.interrupt_pending();
}
