//! Inbound request processing.
//!
//! The dispatch task takes one request at a time from the channel,
//! processes it, and puts exactly one response back:
//!
//! | Request               | Effect                                        |
//! |-----------------------|-----------------------------------------------|
//! | `register`            | stand-in registered (lazy when anonymous)     |
//! | `deregister`          | local entry removed, no-op if absent          |
//! | `invoke`              | method executed, result or fault returned     |
//! | `add_rpc_override`    | override applied locally                      |
//! | `remove_rpc_override` | override dropped locally                      |
//! | `exit`                | runner closes after the reply is written      |

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{RemoteProxy, Runner, RunnerState};
use crate::capability::MethodDesc;
use crate::marshal::result_by_ref;
use crate::object::{ObjectRef, Value};
use crate::protocol::{
    CommandResponse, InstanceId, InvokeRequest, InvokeResponse, MessageId, Reference,
    ReferenceArray, RequestBody, ResponseBody, WireValue,
};
use crate::registry::{Backing, InstanceKey, LazyInstance, ANONYMOUS_PREFIX};
use crate::{AppError, Result};

/// Dispatch loop; runs until the peer exits or the channel ends.
pub(crate) async fn run_dispatch(runner: Runner) {
    loop {
        let request = match runner.shared.channel.take().await {
            Ok(request) => request,
            Err(err) => {
                debug!(%err, "dispatch: channel ended, stopping");
                break;
            }
        };

        let message_id = request.message_id;
        let is_exit = request.is_exit();
        debug!(%message_id, op = request.op(), "dispatch: processing request");

        if is_exit {
            runner
                .shared
                .transition(RunnerState::Open, RunnerState::Closing);
        }

        let body = runner.process(request.body).await;
        if let Err(err) = runner.reply(message_id, body) {
            warn!(%message_id, %err, "dispatch: failed to queue response");
            break;
        }

        if is_exit {
            info!("dispatch: peer requested exit");
            let timeout = runner.shared.config.shutdown_timeout();
            if tokio::time::timeout(timeout, runner.shared.channel.join_writer())
                .await
                .is_err()
            {
                warn!("dispatch: exit reply not flushed before timeout");
            }
            break;
        }
    }

    runner.finish();
}

/// A resolved inbound call, ready to execute.
struct PreparedCall {
    method: MethodDesc,
    target: ObjectRef,
    args: Vec<Value>,
    /// Index and shape of each array argument to copy back.
    copy_back: Vec<(usize, &'static str)>,
}

impl Runner {
    /// Queue the response to `message_id`.
    ///
    /// An invoke result too large for one frame is replaced by an internal
    /// error, so the caller still gets an answer.
    fn reply(&self, message_id: MessageId, body: ResponseBody) -> Result<()> {
        let is_invoke = matches!(body, ResponseBody::Invoke(_));
        match self.shared.channel.put(CommandResponse::new(message_id, body)) {
            Err(err @ AppError::Codec(_)) if is_invoke => {
                warn!(%message_id, %err, "dispatch: invoke reply does not fit in a frame");
                let fault = err.into_fault();
                self.shared.channel.put(CommandResponse::new(
                    message_id,
                    ResponseBody::Invoke(InvokeResponse::internal_error(fault)),
                ))
            }
            other => other,
        }
    }

    /// Handle one inbound request and build its response.
    pub(crate) async fn process(&self, body: RequestBody) -> ResponseBody {
        match body {
            RequestBody::Register {
                name,
                instance_id,
                capabilities,
            } => {
                self.import(name, instance_id, capabilities);
                ResponseBody::Register
            }
            RequestBody::Deregister { instance_id } => {
                if self.shared.registry.remove(instance_id).is_none() {
                    debug!(%instance_id, "deregister: instance not registered");
                }
                ResponseBody::Deregister
            }
            RequestBody::Invoke(request) => ResponseBody::Invoke(self.execute(request).await),
            RequestBody::AddRpcOverride { rpc_override } => {
                debug!(%rpc_override, "override added by peer");
                if !self.shared.overrides.add(rpc_override) {
                    debug!("override was already active");
                }
                ResponseBody::AddRpcOverride
            }
            RequestBody::RemoveRpcOverride { rpc_override } => {
                debug!(%rpc_override, "override removed by peer");
                if !self.shared.overrides.remove(&rpc_override) {
                    debug!("override was not active");
                }
                ResponseBody::RemoveRpcOverride
            }
            RequestBody::Exit => ResponseBody::Exit,
        }
    }

    /// Register a stand-in for the peer's export.
    fn import(&self, name: String, instance_id: InstanceId, capabilities: Vec<String>) {
        if let Err(err) = self.shared.catalog.check_interfaces(&capabilities) {
            warn!(%instance_id, %err, "peer exported unknown capabilities");
        }

        let runner = Arc::downgrade(&self.shared);
        let backing = if name.starts_with(ANONYMOUS_PREFIX) {
            let release = self.shared.release_tx.clone();
            let proxy_caps = capabilities.clone();
            Backing::Lazy(Arc::new(LazyInstance::new(move || -> ObjectRef {
                Arc::new(RemoteProxy::new(
                    runner.clone(),
                    instance_id,
                    proxy_caps.clone(),
                    Some(release.clone()),
                ))
            })))
        } else {
            Backing::Object(Arc::new(RemoteProxy::new(
                runner,
                instance_id,
                capabilities.clone(),
                None,
            )))
        };

        let entry = self
            .shared
            .registry
            .register(Some(name), instance_id, capabilities, backing);
        debug!(name = %entry.name, %instance_id, lazy = entry.is_lazy(), "stand-in registered");
    }

    /// Execute an inbound call.
    ///
    /// Faults raised by the target become `InvocationException`; every
    /// other failure becomes `InternalError`.
    async fn execute(&self, request: InvokeRequest) -> InvokeResponse {
        let PreparedCall {
            method,
            target,
            mut args,
            copy_back,
        } = match self.prepare(request) {
            Ok(call) => call,
            Err(err) => {
                warn!(%err, "invoke: could not prepare call");
                return InvokeResponse::internal_error(err.into_fault());
            }
        };

        let value = match target.invoke(&method, &mut args).await {
            Ok(value) => value,
            Err(err) => {
                debug!(%method, %err, "invoke: target raised");
                let frame = format!("{}::{}", method.declaring_type(), method.name());
                return InvokeResponse::invocation_exception(err.into_fault().with_frame(frame));
            }
        };

        match self.marshal_reply(&method, value, &args, copy_back).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%method, %err, "invoke: could not marshal result");
                InvokeResponse::internal_error(err.into_fault())
            }
        }
    }

    fn prepare(&self, request: InvokeRequest) -> Result<PreparedCall> {
        let method = self
            .shared
            .catalog
            .resolve(
                &request.declaring_type,
                &request.method_name,
                &request.parameter_types,
            )?
            .clone();

        if request.arguments.len() != method.parameter_types().len() {
            return Err(AppError::Internal(format!(
                "{method} takes {} argument(s), request carries {}",
                method.parameter_types().len(),
                request.arguments.len()
            )));
        }

        let mut args = Vec::with_capacity(request.arguments.len());
        let mut copy_back = Vec::new();
        for (index, argument) in request.arguments.into_iter().enumerate() {
            let value = match argument {
                WireValue::Reference(reference) => self
                    .resolve_reference(reference)
                    .map(Value::Object)
                    .ok_or_else(|| {
                        AppError::NullReference(format!(
                            "argument {index} of {method} refers to unknown instance {}",
                            reference.instance_id
                        ))
                    })?,
                WireValue::ReferenceArray(array) => {
                    let value = array.into_value()?;
                    copy_back.push((index, value.type_name()));
                    value
                }
                plain => plain.into_plain()?,
            };
            args.push(value);
        }

        let target = self.resolve_target(&method, request.instance_id)?;
        Ok(PreparedCall {
            method,
            target,
            args,
            copy_back,
        })
    }

    fn resolve_target(
        &self,
        method: &MethodDesc,
        instance_id: Option<InstanceId>,
    ) -> Result<ObjectRef> {
        match instance_id {
            Some(id) => {
                let entry = self
                    .shared
                    .registry
                    .try_get(&InstanceKey::Id(id))
                    .ok_or_else(|| AppError::Internal(format!("no instance {id} for {method}")))?;
                if !entry
                    .capabilities
                    .iter()
                    .any(|c| c == method.declaring_type())
                {
                    return Err(AppError::Internal(format!(
                        "instance {id} does not implement {}",
                        method.declaring_type()
                    )));
                }
                entry.instance().ok_or_else(|| {
                    AppError::NullReference(format!("instance {id} was released"))
                })
            }
            None if method.is_static() => self
                .shared
                .catalog
                .static_receiver(method.declaring_type())
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "no static receiver for {}",
                        method.declaring_type()
                    ))
                }),
            None => Err(AppError::Internal(format!(
                "{method} is an instance method but no target was given"
            ))),
        }
    }

    async fn marshal_reply(
        &self,
        method: &MethodDesc,
        value: Value,
        args: &[Value],
        copy_back: Vec<(usize, &'static str)>,
    ) -> Result<InvokeResponse> {
        let result = if result_by_ref(method, &self.shared.overrides) {
            match (method.return_type().interface_name(), value) {
                (_, Value::Unit) => WireValue::Unit,
                (Some(interface), Value::Object(object)) => {
                    let id = self
                        .export(None, object, vec![interface.to_owned()])
                        .await?;
                    WireValue::Reference(Reference::new(id))
                }
                (_, other) => {
                    return Err(AppError::Internal(format!(
                        "{method} returned {} for a by-reference result",
                        other.type_name()
                    )))
                }
            }
        } else {
            WireValue::from_plain(&value)?
        };

        let reference_arrays = copy_back
            .into_iter()
            .map(|(index, shape)| {
                let arg = args.get(index).ok_or_else(|| {
                    AppError::Internal(format!("copy-back index {index} out of range"))
                })?;
                if arg.type_name() != shape {
                    return Err(AppError::Internal(format!(
                        "{method} replaced array parameter {index} ({shape}) with {}",
                        arg.type_name()
                    )));
                }
                ReferenceArray::snapshot(index, arg)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(InvokeResponse::result(result, reference_arrays))
    }
}
