//! `Calculator` capability served by the `peerlink` binaries.

use futures_util::future::BoxFuture;

use crate::capability::{Capability, Catalog, MethodDesc, TypeDesc};
use crate::errors::Fault;
use crate::object::{Object, Value};
use crate::{AppError, Result};

/// Interface name.
pub const CALCULATOR: &str = "Calculator";

/// Export name used by the server binary.
pub const EXPORT_NAME: &str = "calc";

/// `Calculator::sum(int, int) -> int`.
///
/// # Errors
///
/// Never fails in practice; the descriptor carries no by-reference markers.
pub fn sum_method() -> Result<MethodDesc> {
    MethodDesc::interface(CALCULATOR, "sum")
        .param(TypeDesc::Int)
        .param(TypeDesc::Int)
        .returns(TypeDesc::Int)
        .build()
}

/// Catalog holding the `Calculator` interface.
///
/// # Errors
///
/// Propagates descriptor construction errors.
pub fn catalog() -> Result<Catalog> {
    Ok(Catalog::new().with(Capability::interface(CALCULATOR).method(sum_method()?)))
}

/// Integer calculator.
#[derive(Debug, Default)]
pub struct Calculator;

impl Object for Calculator {
    fn invoke<'a>(
        &'a self,
        method: &'a MethodDesc,
        args: &'a mut [Value],
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            match (method.name(), &*args) {
                ("sum", [a, b]) => {
                    let (Some(a), Some(b)) = (a.as_int(), b.as_int()) else {
                        return Err(AppError::Invocation(Fault::new(
                            "illegal_argument",
                            "sum takes two integers",
                        )));
                    };
                    a.checked_add(b).map(Value::Int).ok_or_else(|| {
                        AppError::Invocation(Fault::new("arithmetic", "integer overflow"))
                    })
                }
                (other, _) => Err(AppError::Invocation(Fault::new(
                    "unsupported_operation",
                    format!("Calculator has no method {other}"),
                ))),
            }
        })
    }

    fn capabilities(&self) -> Vec<String> {
        vec![CALCULATOR.to_owned()]
    }
}
