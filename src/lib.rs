#![forbid(unsafe_code)]

//! Live-object RPC between two peers over one duplex byte stream.
//!
//! Each peer runs a [`Runner`]. Exporting an object on one side gives the
//! other side a [`RemoteProxy`](runner::RemoteProxy) that forwards calls
//! across the stream; arguments and results cross by copy or, when marked,
//! by live reference.

pub mod calculator;
pub mod capability;
pub mod channel;
pub mod config;
pub mod errors;
pub mod marshal;
pub mod object;
pub mod protocol;
pub mod registry;
pub mod runner;
pub mod transport;

pub use capability::{Capability, Catalog, MethodDesc, TypeDesc, TypeKind};
pub use config::RunnerConfig;
pub use errors::{AppError, Fault, Result};
pub use marshal::{OverrideTarget, RpcOverride};
pub use object::{Object, ObjectRef, Value};
pub use registry::InstanceKey;
pub use runner::{Runner, RunnerState};
