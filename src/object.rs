//! Local values and the object abstraction shared by exports and proxies.
//!
//! Every callable thing in the runtime implements [`Object`]: objects a
//! process exports to its peer, and the [`RemoteProxy`](crate::runner::RemoteProxy)
//! stand-ins it receives in return. Callers see only [`ObjectRef`] handles,
//! so a method can hand a proxy back to the peer as easily as a local
//! object.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::capability::MethodDesc;
use crate::Result;

/// Shared handle to an [`Object`].
pub type ObjectRef = Arc<dyn Object>;

/// A callable object addressed by method descriptor.
///
/// `args` is mutable so array arguments can be updated in place; the
/// runtime copies such updates back to the caller when the parameter
/// crosses by reference. Such an argument must keep its shape: replacing a
/// `Bytes` or `Array` with another variant fails the call with
/// [`AppError::Internal`](crate::AppError::Internal) after the method ran.
///
/// Application failures are reported as
/// [`AppError::Invocation`](crate::AppError::Invocation). Any other error
/// returned here is still delivered to the caller as an application fault
/// of the matching kind.
pub trait Object: Send + Sync {
    /// Invoke `method` with `args`.
    fn invoke<'a>(
        &'a self,
        method: &'a MethodDesc,
        args: &'a mut [Value],
    ) -> BoxFuture<'a, Result<Value>>;

    /// Capability names this object is exported under when the caller does
    /// not name any.
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Value held on the local side of a call.
#[derive(Clone, Default)]
pub enum Value {
    /// No value; also the null reference.
    #[default]
    Unit,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Byte array.
    Bytes(Vec<u8>),
    /// Array of values.
    Array(Vec<Value>),
    /// Live object.
    Object(ObjectRef),
}

impl Value {
    /// Integer payload, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Object handle, if this is an `Object`.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Whether this is `Unit`.
    #[must_use]
    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Unit)
    }

    /// Whether this value is array-shaped (`Bytes` or `Array`).
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Bytes(_) | Self::Array(_))
    }

    /// Short variant name for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "Unit"),
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Self::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Self::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Self::Bytes(v) => f.debug_tuple("Bytes").field(v).finish(),
            Self::Array(v) => f.debug_tuple("Array").field(v).finish(),
            Self::Object(obj) => write!(f, "Object({:p})", Arc::as_ptr(obj)),
        }
    }
}

/// Objects compare by identity, everything else structurally.
impl PartialEq for Value {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}
