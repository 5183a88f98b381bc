//! Error types shared across the runtime.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Shared runtime result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Trace frame inserted where a fault crossed the peer boundary.
pub const RPC_BOUNDARY_FRAME: &str = "........................ RPC ..........................";

/// Application fault raised by remotely invoked code.
///
/// Faults are plain data so they can travel inside an `Invoke` response.
/// `kind` plays the role of an exception type: callers match on it to tell
/// one application failure from another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Fault classification, e.g. `sql` or `class_cast`.
    pub kind: String,
    /// Human-readable detail.
    pub message: String,
    /// Trace frames, innermost first.
    #[serde(default)]
    pub trace: Vec<String>,
}

impl Fault {
    /// Create a fault with an empty trace.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    /// Append a trace frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }

    /// Mark the point where this fault re-entered the calling peer.
    ///
    /// Appends the boundary marker followed by the `Type::method` frame the
    /// caller invoked.
    #[must_use]
    pub fn crossed_boundary(self, declaring_type: &str, method_name: &str) -> Self {
        self.with_frame(RPC_BOUNDARY_FRAME)
            .with_frame(format!("{declaring_type}::{method_name}"))
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Runtime error enumeration covering every failure mode of the RPC layer.
#[derive(Debug)]
pub enum AppError {
    /// The remotely invoked method itself failed.
    Invocation(Fault),
    /// Host or protocol failure during remote execution.
    Internal(String),
    /// A reference named an instance that is no longer registered.
    NullReference(String),
    /// Operation attempted on a closed runner or channel.
    Closed(String),
    /// Configuration parsing, validation, or override construction failure.
    Config(String),
    /// A pending call was woken without a response.
    Protocol(String),
    /// A blocked wait was interrupted by shutdown.
    Interrupted(String),
    /// Caller supplied arguments of the wrong shape.
    Argument(String),
    /// Frame encoding or decoding failure.
    Codec(String),
    /// Local socket setup failure.
    Ipc(String),
    /// File-system or stream I/O failure.
    Io(String),
}

impl AppError {
    /// Fold this error into an application fault for transport in an
    /// `Invoke` response.
    #[must_use]
    pub fn into_fault(self) -> Fault {
        match self {
            Self::Invocation(fault) => fault,
            other => Fault::new(other.kind(), other.detail()),
        }
    }

    /// Short classification used as the fault kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invocation(_) => "invocation",
            Self::Internal(_) => "internal",
            Self::NullReference(_) => "null_reference",
            Self::Closed(_) => "closed",
            Self::Config(_) => "config",
            Self::Protocol(_) => "protocol",
            Self::Interrupted(_) => "interrupted",
            Self::Argument(_) => "argument",
            Self::Codec(_) => "codec",
            Self::Ipc(_) => "ipc",
            Self::Io(_) => "io",
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Invocation(fault) => fault.to_string(),
            Self::Internal(msg)
            | Self::NullReference(msg)
            | Self::Closed(msg)
            | Self::Config(msg)
            | Self::Protocol(msg)
            | Self::Interrupted(msg)
            | Self::Argument(msg)
            | Self::Codec(msg)
            | Self::Ipc(msg)
            | Self::Io(msg) => msg.clone(),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invocation(fault) => write!(f, "invocation: {fault}"),
            Self::Internal(msg) => write!(f, "internal: {msg}"),
            Self::NullReference(msg) => write!(f, "null reference: {msg}"),
            Self::Closed(msg) => write!(f, "closed: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Interrupted(msg) => write!(f, "interrupted: {msg}"),
            Self::Argument(msg) => write!(f, "argument: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
