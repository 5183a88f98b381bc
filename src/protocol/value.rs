//! Wire-level values and the reference markers.

use serde::{Deserialize, Serialize};

use crate::object::Value;
use crate::protocol::InstanceId;
use crate::{AppError, Result};

/// Serializable value carried inside an `Invoke` request or response.
///
/// Live objects never cross by copy: an object either becomes a
/// [`Reference`] or marshalling fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireValue {
    /// No value.
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
    Array(Vec<WireValue>),
    /// Resolve through the instance registry.
    Reference(Reference),
    /// Array that crossed by copy and must be copied back.
    ReferenceArray(ReferenceArray),
}

impl WireValue {
    /// Convert a plain local value for by-copy crossing.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Argument`] if `value` is or contains an object.
    pub fn from_plain(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Unit => Self::Unit,
            Value::Bool(v) => Self::Bool(*v),
            Value::Int(v) => Self::Int(*v),
            Value::Float(v) => Self::Float(*v),
            Value::Str(v) => Self::Str(v.clone()),
            Value::Bytes(v) => Self::Bytes(v.clone()),
            Value::Array(items) => Self::Array(
                items
                    .iter()
                    .map(Self::from_plain)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(_) => {
                return Err(AppError::Argument(
                    "object value cannot cross by copy; mark it to cross by reference".into(),
                ))
            }
        })
    }

    /// Convert back into a plain local value.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] if a reference marker appears where
    /// only plain data is allowed.
    pub fn into_plain(self) -> Result<Value> {
        Ok(match self {
            Self::Unit => Value::Unit,
            Self::Bool(v) => Value::Bool(v),
            Self::Int(v) => Value::Int(v),
            Self::Float(v) => Value::Float(v),
            Self::Str(v) => Value::Str(v),
            Self::Bytes(v) => Value::Bytes(v),
            Self::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Self::into_plain)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Self::Reference(_) | Self::ReferenceArray(_) => {
                return Err(AppError::Internal(
                    "nested reference marker in plain value".into(),
                ))
            }
        })
    }
}

/// Marker: the value at this position is the registered instance `instance_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Registered instance.
    pub instance_id: InstanceId,
}

impl Reference {
    /// Reference to `instance_id`.
    #[must_use]
    pub fn new(instance_id: InstanceId) -> Self {
        Self { instance_id }
    }
}

/// Marker: the array argument at `parameter_index` crossed as a snapshot
/// and its final contents must be copied back into the caller's array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceArray {
    /// Index of the parameter the array belongs to.
    pub parameter_index: usize,
    /// Array snapshot (`Bytes` or `Array`).
    pub array: Box<WireValue>,
}

impl ReferenceArray {
    /// Snapshot `value` as the array for `parameter_index`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Argument`] if `value` is not array-shaped or
    /// contains objects.
    pub fn snapshot(parameter_index: usize, value: &Value) -> Result<Self> {
        if !value.is_array() {
            return Err(AppError::Argument(format!(
                "parameter {parameter_index} crosses as an array but the argument is {}",
                value.type_name()
            )));
        }
        Ok(Self {
            parameter_index,
            array: Box::new(WireValue::from_plain(value)?),
        })
    }

    /// Number of elements in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.array.as_ref() {
            WireValue::Bytes(b) => b.len(),
            WireValue::Array(items) => items.len(),
            _ => 0,
        }
    }

    /// Whether the snapshot has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unwrap the snapshot into a plain local array.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] if the payload is not plain data.
    pub fn into_value(self) -> Result<Value> {
        self.array.into_plain()
    }

    /// Copy the leading `len()` elements into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Argument`] if `dst` has a different shape or is
    /// shorter than the snapshot.
    pub fn copy_into(self, dst: &mut Value) -> Result<()> {
        let index = self.parameter_index;
        match (self.array.into_plain()?, dst) {
            (Value::Bytes(src), Value::Bytes(dst)) => {
                let target = dst.get_mut(..src.len()).ok_or_else(|| too_short(index))?;
                target.copy_from_slice(&src);
                Ok(())
            }
            (Value::Array(src), Value::Array(dst)) => {
                let len = src.len();
                let target = dst.get_mut(..len).ok_or_else(|| too_short(index))?;
                for (slot, item) in target.iter_mut().zip(src) {
                    *slot = item;
                }
                Ok(())
            }
            (src, dst) => Err(AppError::Argument(format!(
                "cannot copy {} back into {} argument at parameter {index}",
                src.type_name(),
                dst.type_name()
            ))),
        }
    }
}

fn too_short(index: usize) -> AppError {
    AppError::Argument(format!(
        "array argument at parameter {index} is shorter than the returned copy"
    ))
}
