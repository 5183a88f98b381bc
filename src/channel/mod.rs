//! Full-duplex command channel.
//!
//! A [`CommandChannel`] owns two background tasks over one byte stream:
//!
//! - the **reader** ([`reader::run_reader`]) decodes inbound frames, resolves
//!   pending calls with responses, and queues requests for [`take`](CommandChannel::take);
//! - the **writer** ([`writer::run_writer`]) drains the outbound queue in
//!   enqueue order, one frame per command.
//!
//! Requests issued through [`call`](CommandChannel::call) or
//! [`call_async`](CommandChannel::call_async) register a one-shot slot keyed
//! by message id before the request is queued, so a response can never
//! arrive ahead of its slot.
//!
//! Commands are encoded before they are queued. One that would exceed the
//! peer's frame limit fails for its caller with [`AppError::Codec`] and is
//! never written.
//!
//! Queues are unbounded; there is no flow control between peers.

pub mod reader;
pub mod writer;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::protocol::codec::encode_frame_within;
use crate::protocol::{Command, CommandRequest, CommandResponse, MessageId};
use crate::{AppError, Result};

type PendingSlots = HashMap<MessageId, oneshot::Sender<CommandResponse>>;

/// State shared between the channel handle and its pump tasks.
#[derive(Debug)]
pub(crate) struct ChannelShared {
    name: String,
    pending: Mutex<PendingSlots>,
    interrupted: AtomicBool,
    cancel: CancellationToken,
}

impl ChannelShared {
    fn new(name: String) -> Self {
        Self {
            name,
            pending: Mutex::new(HashMap::new()),
            interrupted: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingSlots> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `response` to the caller waiting on its message id.
    pub(crate) fn resolve(&self, response: CommandResponse) {
        let message_id = response.message_id;
        let Some(slot) = self.pending().remove(&message_id) else {
            debug!(channel = %self.name, %message_id, "response without pending call, dropping");
            return;
        };
        if slot.send(response).is_err() {
            debug!(channel = %self.name, %message_id, "caller stopped waiting, dropping response");
        }
    }

    /// Wake every pending caller with an interruption.
    pub(crate) fn interrupt_pending(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        let dropped: Vec<_> = self.pending().drain().collect();
        if !dropped.is_empty() {
            debug!(channel = %self.name, count = dropped.len(), "interrupting pending calls");
        }
    }

    fn slot_dropped(&self, message_id: MessageId) -> AppError {
        if self.interrupted.load(Ordering::SeqCst) {
            AppError::Interrupted(format!("call {message_id} interrupted by channel shutdown"))
        } else {
            AppError::Protocol(format!("call {message_id} woken without a response"))
        }
    }
}

/// One encoded command waiting for the writer.
#[derive(Debug)]
pub(crate) struct OutboundFrame {
    pub(crate) message_id: MessageId,
    pub(crate) is_exit: bool,
    pub(crate) line: String,
}

/// Bidirectional command transport over one byte stream.
#[derive(Debug)]
pub struct CommandChannel {
    shared: Arc<ChannelShared>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<CommandRequest>>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    max_frame_bytes: usize,
    reader: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl CommandChannel {
    /// Start the reader and writer tasks over `input` and `output`.
    ///
    /// `max_frame_bytes` bounds frames in both directions.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new<R, W>(name: impl Into<String>, input: R, output: W, max_frame_bytes: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let name = name.into();
        let shared = Arc::new(ChannelShared::new(name.clone()));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(
            reader::run_reader(input, Arc::clone(&shared), inbound_tx, max_frame_bytes)
                .instrument(info_span!("channel_reader", channel = %name)),
        );
        let writer = tokio::spawn(
            writer::run_writer(output, Arc::clone(&shared), outbound_rx, max_frame_bytes)
                .instrument(info_span!("channel_writer", channel = %name)),
        );

        Self {
            shared,
            inbound: tokio::sync::Mutex::new(inbound_rx),
            outbound: outbound_tx,
            max_frame_bytes,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        }
    }

    /// Label used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Wait for the next inbound request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Interrupted`] if the channel is closed while
    /// waiting or the inbound stream has ended.
    pub async fn take(&self) -> Result<CommandRequest> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;

            () = self.shared.cancel.cancelled() => {
                Err(AppError::Interrupted("channel closed while waiting for a request".into()))
            }

            request = inbound.recv() => {
                request.ok_or_else(|| AppError::Interrupted("inbound stream ended".into()))
            }
        }
    }

    /// Queue `response` for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] if the outbound side has shut down, and
    /// [`AppError::Codec`] if the response does not fit in one frame.
    pub fn put(&self, response: CommandResponse) -> Result<()> {
        self.ensure_open()?;
        let frame = self.frame(&Command::Response(response))?;
        self.send(frame)
    }

    /// Send `request` and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] if the channel is closed,
    /// [`AppError::Interrupted`] if it closes while waiting, and
    /// [`AppError::Protocol`] if the slot is dropped without a response.
    pub async fn call(&self, request: CommandRequest) -> Result<CommandResponse> {
        self.call_async(request)?.await
    }

    /// Send `request` and return a handle resolving to its response.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] if the request cannot be queued, and
    /// [`AppError::Codec`] if it does not fit in one frame. No slot is left
    /// behind in either case.
    pub fn call_async(&self, request: CommandRequest) -> Result<PendingCall> {
        self.ensure_open()?;
        let message_id = request.message_id;
        let frame = self.frame(&Command::Request(request))?;
        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(message_id, tx);

        if let Err(err) = self.send(frame) {
            self.shared.pending().remove(&message_id);
            return Err(err);
        }

        Ok(PendingCall {
            message_id,
            rx,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop both pumps and interrupt pending calls. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(channel = %self.shared.name, "closing channel");
        self.shared.cancel.cancel();
        self.shared.interrupt_pending();
    }

    /// Wait until the writer task has finished.
    ///
    /// The writer finishes on its own after writing an `Exit` response.
    pub async fn join_writer(&self) {
        let handle = self.writer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                debug!(channel = %self.shared.name, %err, "writer task ended abnormally");
            }
        }
    }

    /// Wait until both pump tasks have finished.
    pub async fn join(&self) {
        self.join_writer().await;
        let handle = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                debug!(channel = %self.shared.name, %err, "reader task ended abnormally");
            }
        }
    }

    fn frame(&self, command: &Command) -> Result<OutboundFrame> {
        let message_id = command.message_id();
        let line = encode_frame_within(command, self.max_frame_bytes).inspect_err(|err| {
            debug!(channel = %self.shared.name, %message_id, %err, "command not queued");
        })?;
        Ok(OutboundFrame {
            message_id,
            is_exit: matches!(command, Command::Response(resp) if resp.is_exit()),
            line,
        })
    }

    fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| AppError::Closed("outbound side of the channel is closed".into()))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(AppError::Closed(format!("channel {} is closed", self.shared.name)))
        } else {
            Ok(())
        }
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to an in-flight call; resolves to the matching response.
///
/// Dropping the handle abandons the wait and releases its slot.
#[derive(Debug)]
pub struct PendingCall {
    message_id: MessageId,
    rx: oneshot::Receiver<CommandResponse>,
    shared: Arc<ChannelShared>,
}

impl PendingCall {
    /// Message id of the request.
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }
}

impl Future for PendingCall {
    type Output = Result<CommandResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(response)) => Poll::Ready(Ok(response)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(self.shared.slot_dropped(self.message_id))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.shared.pending().remove(&self.message_id);
    }
}
