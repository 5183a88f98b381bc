//! NDJSON frame codec for command streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length. Each newline-terminated UTF-8 line is one frame holding exactly
//! one JSON-encoded [`Command`]; frames share no state, so every frame
//! decodes on its own.
//!
//! Decoding is split in two steps: the codec yields raw lines, and
//! [`decode_frame`] turns a line into a [`Command`]. A malformed line
//! therefore costs one frame, not the whole stream.
//!
//! The limit applies in both directions. Senders check a frame with
//! [`encode_frame_within`] before queueing it, so an oversized command fails
//! for its caller instead of ending the peer's read loop.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::protocol::Command;
use crate::{AppError, Result};

/// Default maximum frame length: 1 MiB.
pub const MAX_FRAME_BYTES: usize = 1_048_576;

/// Line codec for [`Command`] frames.
#[derive(Debug)]
pub struct CommandCodec {
    lines: LinesCodec,
    max_frame_bytes: usize,
}

impl CommandCodec {
    /// Codec with the default [`MAX_FRAME_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_bytes(MAX_FRAME_BYTES)
    }

    /// Codec rejecting frames longer than `max_frame_bytes`.
    #[must_use]
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_bytes),
            max_frame_bytes,
        }
    }

    fn map_error(&self, e: LinesCodecError) -> AppError {
        match e {
            LinesCodecError::MaxLineLengthExceeded => AppError::Codec(format!(
                "frame too long: exceeded {} bytes",
                self.max_frame_bytes
            )),
            LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
        }
    }
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for CommandCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.lines.decode(src).map_err(|e| self.map_error(e))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.lines.decode_eof(src).map_err(|e| self.map_error(e))
    }
}

impl Encoder<String> for CommandCodec {
    type Error = AppError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<()> {
        check_frame_len(&line, self.max_frame_bytes)?;
        self.lines.encode(line, dst).map_err(|e| self.map_error(e))
    }
}

impl Encoder<Command> for CommandCodec {
    type Error = AppError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<()> {
        let line = encode_frame(&item)?;
        <Self as Encoder<String>>::encode(self, line, dst)
    }
}

/// Serialize `command` as a single-line JSON frame (without the newline).
///
/// # Errors
///
/// Returns [`AppError::Codec`] if serialization fails.
pub fn encode_frame(command: &Command) -> Result<String> {
    serde_json::to_string(command).map_err(|e| AppError::Codec(format!("encode failed: {e}")))
}

/// Serialize `command` and check it fits in `max_frame_bytes`.
///
/// # Errors
///
/// Returns [`AppError::Codec`] if serialization fails or the frame is too
/// long for the peer to read.
pub fn encode_frame_within(command: &Command, max_frame_bytes: usize) -> Result<String> {
    let line = encode_frame(command)?;
    check_frame_len(&line, max_frame_bytes)?;
    Ok(line)
}

fn check_frame_len(line: &str, max_frame_bytes: usize) -> Result<()> {
    if line.len() > max_frame_bytes {
        return Err(AppError::Codec(format!(
            "frame too long: {} bytes exceeds {max_frame_bytes}",
            line.len()
        )));
    }
    Ok(())
}

/// Parse one frame.
///
/// Returns `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns [`AppError::Codec`] if the line is not a valid command.
pub fn decode_frame(line: &str) -> Result<Option<Command>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| AppError::Codec(format!("malformed frame: {e}")))
}
