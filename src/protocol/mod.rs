//! Command protocol model.
//!
//! Every frame on the wire is one [`Command`]: either a [`CommandRequest`]
//! or a [`CommandResponse`]. A request carries a fresh message id; the
//! single response to it carries the identical id, which is how the
//! channel matches interleaved traffic back to waiting callers.
//!
//! | Request             | Response            |
//! |---------------------|---------------------|
//! | `register`          | `register`          |
//! | `deregister`        | `deregister`        |
//! | `invoke`            | `invoke` + outcome  |
//! | `add_rpc_override`  | `add_rpc_override`  |
//! | `remove_rpc_override` | `remove_rpc_override` |
//! | `exit`              | `exit` (last frame) |

pub mod codec;
pub mod value;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::TypeDesc;
use crate::errors::Fault;
use crate::marshal::RpcOverride;

pub use value::{Reference, ReferenceArray, WireValue};

/// Correlation id shared by one request and its response.
pub type MessageId = Uuid;

/// Identity of a registered instance.
pub type InstanceId = Uuid;

/// One unit of protocol data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Request for the peer to act.
    Request(CommandRequest),
    /// Reply to an earlier request.
    Response(CommandResponse),
}

impl Command {
    /// Correlation id of the wrapped request or response.
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::Request(req) => req.message_id,
            Self::Response(resp) => resp.message_id,
        }
    }
}

impl From<CommandRequest> for Command {
    fn from(req: CommandRequest) -> Self {
        Self::Request(req)
    }
}

impl From<CommandResponse> for Command {
    fn from(resp: CommandResponse) -> Self {
        Self::Response(resp)
    }
}

/// Request with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Fresh id for this request.
    pub message_id: MessageId,
    /// Request payload.
    pub body: RequestBody,
}

impl CommandRequest {
    /// Wrap `body` under a new message id.
    #[must_use]
    pub fn new(body: RequestBody) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            body,
        }
    }

    /// `Register` request.
    #[must_use]
    pub fn register(name: String, instance_id: InstanceId, capabilities: Vec<String>) -> Self {
        Self::new(RequestBody::Register {
            name,
            instance_id,
            capabilities,
        })
    }

    /// `Deregister` request.
    #[must_use]
    pub fn deregister(instance_id: InstanceId) -> Self {
        Self::new(RequestBody::Deregister { instance_id })
    }

    /// `Exit` request.
    #[must_use]
    pub fn exit() -> Self {
        Self::new(RequestBody::Exit)
    }

    /// Whether this is an `Exit` request.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        matches!(self.body, RequestBody::Exit)
    }

    /// Operation name for logging.
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self.body {
            RequestBody::Register { .. } => "register",
            RequestBody::Deregister { .. } => "deregister",
            RequestBody::Invoke(_) => "invoke",
            RequestBody::AddRpcOverride { .. } => "add_rpc_override",
            RequestBody::RemoveRpcOverride { .. } => "remove_rpc_override",
            RequestBody::Exit => "exit",
        }
    }
}

/// Request payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RequestBody {
    /// Create a local stand-in for the sender's export.
    Register {
        /// Export name; anonymous exports use the `anonymous-` prefix.
        name: String,
        /// Instance id allocated by the exporter.
        instance_id: InstanceId,
        /// Capability names the stand-in implements.
        capabilities: Vec<String>,
    },
    /// Forget an instance.
    Deregister {
        /// Instance to drop.
        instance_id: InstanceId,
    },
    /// Call a method.
    Invoke(InvokeRequest),
    /// Start applying an override.
    AddRpcOverride {
        /// Override to add.
        rpc_override: RpcOverride,
    },
    /// Stop applying an override.
    RemoveRpcOverride {
        /// Override to remove.
        rpc_override: RpcOverride,
    },
    /// Graceful shutdown.
    Exit,
}

/// Method call shipped to the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Target instance; `None` for static methods.
    pub instance_id: Option<InstanceId>,
    /// Type declaring the method.
    pub declaring_type: String,
    /// Method name.
    pub method_name: String,
    /// Parameter types identifying the overload.
    pub parameter_types: Vec<TypeDesc>,
    /// Marshalled arguments.
    pub arguments: Vec<WireValue>,
}

/// Response with the correlation id of its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Id of the answered request.
    pub message_id: MessageId,
    /// Response payload.
    pub body: ResponseBody,
}

impl CommandResponse {
    /// Response to the request with `message_id`.
    #[must_use]
    pub fn new(message_id: MessageId, body: ResponseBody) -> Self {
        Self { message_id, body }
    }

    /// Whether this is an `Exit` response.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        matches!(self.body, ResponseBody::Exit)
    }

    /// Operation name for logging.
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self.body {
            ResponseBody::Register => "register",
            ResponseBody::Deregister => "deregister",
            ResponseBody::Invoke(_) => "invoke",
            ResponseBody::AddRpcOverride => "add_rpc_override",
            ResponseBody::RemoveRpcOverride => "remove_rpc_override",
            ResponseBody::Exit => "exit",
        }
    }
}

/// Response payloads, one per request kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Registration acknowledged.
    Register,
    /// Deregistration acknowledged.
    Deregister,
    /// Method call finished.
    Invoke(InvokeResponse),
    /// Override added.
    AddRpcOverride,
    /// Override removed.
    RemoveRpcOverride,
    /// Shutdown acknowledged.
    Exit,
}

/// Result of a remote method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// Outcome of the call.
    pub outcome: InvokeOutcome,
    /// Array arguments to copy back into the caller's originals.
    #[serde(default)]
    pub reference_arrays: Vec<ReferenceArray>,
}

impl InvokeResponse {
    /// Successful call.
    #[must_use]
    pub fn result(value: WireValue, reference_arrays: Vec<ReferenceArray>) -> Self {
        Self {
            outcome: InvokeOutcome::Result(value),
            reference_arrays,
        }
    }

    /// The invoked code failed.
    #[must_use]
    pub fn invocation_exception(fault: Fault) -> Self {
        Self {
            outcome: InvokeOutcome::InvocationException(fault),
            reference_arrays: Vec::new(),
        }
    }

    /// The RPC machinery failed.
    #[must_use]
    pub fn internal_error(fault: Fault) -> Self {
        Self {
            outcome: InvokeOutcome::InternalError(fault),
            reference_arrays: Vec::new(),
        }
    }
}

/// Tagged outcome of a remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InvokeOutcome {
    /// Returned value.
    Result(WireValue),
    /// Application fault raised by the invoked method.
    InvocationException(Fault),
    /// Host or protocol failure while executing the call.
    InternalError(Fault),
}
