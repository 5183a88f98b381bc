//! Outbound method calls.

use std::sync::Arc;

use tracing::debug;

use super::Runner;
use crate::capability::MethodDesc;
use crate::marshal::param_by_ref;
use crate::object::{ObjectRef, Value};
use crate::protocol::{
    CommandRequest, InstanceId, InvokeOutcome, InvokeRequest, InvokeResponse, Reference,
    ReferenceArray, RequestBody, ResponseBody, WireValue,
};
use crate::registry::InstanceKey;
use crate::{AppError, Result};

impl Runner {
    /// Call `method` on the peer.
    ///
    /// `target` names the peer's instance; pass `None` for static methods.
    /// Arguments crossing by reference are exported or wrapped first, and
    /// arrays the peer modified are copied back into `args` before this
    /// returns.
    ///
    /// # Errors
    ///
    /// - [`AppError::Closed`] if the runner is closed.
    /// - [`AppError::Argument`] for a missing target on an instance
    ///   method, a wrong argument count, or an argument that cannot cross.
    /// - [`AppError::Invocation`] carrying the fault the remote method
    ///   raised, with the call boundary appended to its trace.
    /// - [`AppError::Internal`] if the peer failed to execute the call.
    pub async fn invoke(
        &self,
        target: Option<InstanceId>,
        method: &MethodDesc,
        args: &mut [Value],
    ) -> Result<Value> {
        self.ensure_open()?;
        if target.is_none() && !method.is_static() {
            return Err(AppError::Argument(format!(
                "{method} is an instance method and needs a target instance"
            )));
        }
        if args.len() != method.parameter_types().len() {
            return Err(AppError::Argument(format!(
                "{method} takes {} argument(s), got {}",
                method.parameter_types().len(),
                args.len()
            )));
        }

        let mut arguments = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            arguments.push(self.marshal_argument(method, index, arg).await?);
        }

        let request = CommandRequest::new(RequestBody::Invoke(InvokeRequest {
            instance_id: target,
            declaring_type: method.declaring_type().to_owned(),
            method_name: method.name().to_owned(),
            parameter_types: method.parameter_types().to_vec(),
            arguments,
        }));
        let message_id = request.message_id;
        debug!(runner = %self.shared.name, %message_id, %method, "invoking remote method");

        let response = self.shared.channel.call(request).await?;
        let ResponseBody::Invoke(InvokeResponse {
            outcome,
            reference_arrays,
        }) = response.body
        else {
            return Err(AppError::Protocol(format!(
                "expected invoke response to {message_id}, got {}",
                response.op()
            )));
        };

        match outcome {
            InvokeOutcome::Result(value) => {
                for array in reference_arrays {
                    let index = array.parameter_index;
                    let dst = args.get_mut(index).ok_or_else(|| {
                        AppError::Protocol(format!(
                            "copy-back for parameter {index} of {method} is out of range"
                        ))
                    })?;
                    array.copy_into(dst)?;
                }
                self.unmarshal_result(value)
            }
            InvokeOutcome::InvocationException(fault) => {
                debug!(runner = %self.shared.name, %message_id, %fault, "remote method raised");
                Err(AppError::Invocation(
                    fault.crossed_boundary(method.declaring_type(), method.name()),
                ))
            }
            InvokeOutcome::InternalError(fault) => Err(AppError::Internal(format!(
                "peer failed to execute {method}: {fault}"
            ))),
        }
    }

    /// Call `method` on the instance the peer exported as `name`.
    ///
    /// Waits for the export if the peer has not registered it yet.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get) and [`invoke`](Self::invoke).
    pub async fn invoke_named(
        &self,
        name: &str,
        method: &MethodDesc,
        args: &mut [Value],
    ) -> Result<Value> {
        let object = self.get(name).await?;
        object.invoke(method, args).await
    }

    /// Call the static `method` on the peer.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke).
    pub async fn invoke_static(&self, method: &MethodDesc, args: &mut [Value]) -> Result<Value> {
        self.invoke(None, method, args).await
    }

    async fn marshal_argument(
        &self,
        method: &MethodDesc,
        index: usize,
        arg: &Value,
    ) -> Result<WireValue> {
        if !param_by_ref(method, index, &self.shared.overrides) {
            return WireValue::from_plain(arg);
        }
        let ty = method.parameter_types().get(index).ok_or_else(|| {
            AppError::Argument(format!("parameter {index} out of range for {method}"))
        })?;

        match (ty.interface_name(), arg) {
            (_, Value::Unit) => Ok(WireValue::Unit),
            (Some(interface), Value::Object(object)) => {
                let id = self
                    .export(None, Arc::clone(object), vec![interface.to_owned()])
                    .await?;
                Ok(WireValue::Reference(Reference::new(id)))
            }
            (Some(interface), other) => Err(AppError::Argument(format!(
                "parameter {index} of {method} crosses as {interface} but the argument is {}",
                other.type_name()
            ))),
            (None, array) => Ok(WireValue::ReferenceArray(ReferenceArray::snapshot(
                index, array,
            )?)),
        }
    }

    fn unmarshal_result(&self, value: WireValue) -> Result<Value> {
        match value {
            WireValue::Reference(reference) => {
                Ok(self.resolve_reference(reference).map_or_else(
                    || {
                        debug!(
                            runner = %self.shared.name,
                            instance_id = %reference.instance_id,
                            "result reference not registered, returning unit"
                        );
                        Value::Unit
                    },
                    Value::Object,
                ))
            }
            WireValue::ReferenceArray(_) => Err(AppError::Protocol(
                "reference array is not a valid result".into(),
            )),
            plain => plain.into_plain(),
        }
    }

    /// Live object behind `reference` in the local registry.
    pub(crate) fn resolve_reference(&self, reference: Reference) -> Option<ObjectRef> {
        self.shared
            .registry
            .try_get(&InstanceKey::Id(reference.instance_id))
            .and_then(|entry| entry.instance())
    }
}
