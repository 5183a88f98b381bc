//! Reference-crossing policy and runtime overrides.
//!
//! A parameter or result crosses by reference when its method descriptor
//! marks it so, or when an active [`RpcOverride`] names it. Interfaces
//! cross as a [`Reference`](crate::protocol::Reference) to an anonymous
//! export; arrays cross as a [`ReferenceArray`](crate::protocol::ReferenceArray)
//! snapshot that is copied back after the call.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::capability::{is_ref_eligible_param, MethodDesc, TypeDesc};
use crate::{AppError, Result};

/// Position an override applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "at", content = "index", rename_all = "snake_case")]
pub enum OverrideTarget {
    /// Parameter at the given index.
    Parameter(usize),
    /// The return value.
    Return,
}

/// Rule forcing by-reference crossing for one parameter or result.
///
/// Equality is structural over the declaring type, method name, parameter
/// types, and target, so an override built on one peer matches the same
/// method on the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RpcOverride {
    declaring_type: String,
    method_name: String,
    parameter_types: Vec<TypeDesc>,
    target: OverrideTarget,
}

impl RpcOverride {
    /// Override for parameter `index` of `method`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if `method` is an instance method of a
    /// concrete type, if `index` is out of range, or if the parameter is
    /// neither an interface nor an array.
    pub fn for_parameter(method: &MethodDesc, index: usize) -> Result<Self> {
        check_overridable(method)?;
        let ty = method.parameter_types().get(index).ok_or_else(|| {
            AppError::Config(format!(
                "parameter index {index} out of range for {method}"
            ))
        })?;
        if !is_ref_eligible_param(ty) {
            return Err(AppError::Config(format!(
                "parameter {index} of {method} is {ty}; only interfaces and arrays cross by reference"
            )));
        }
        Ok(Self::new(method, OverrideTarget::Parameter(index)))
    }

    /// Override for the return value of `method`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if `method` is an instance method of a
    /// concrete type or does not return an interface.
    pub fn for_result(method: &MethodDesc) -> Result<Self> {
        check_overridable(method)?;
        if method.return_type().interface_name().is_none() {
            return Err(AppError::Config(format!(
                "result of {method} is {}; only interfaces cross by reference",
                method.return_type()
            )));
        }
        Ok(Self::new(method, OverrideTarget::Return))
    }

    fn new(method: &MethodDesc, target: OverrideTarget) -> Self {
        Self {
            declaring_type: method.declaring_type().to_owned(),
            method_name: method.name().to_owned(),
            parameter_types: method.parameter_types().to_vec(),
            target,
        }
    }

    /// Declaring type of the targeted method.
    #[must_use]
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Name of the targeted method.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Targeted position.
    #[must_use]
    pub fn target(&self) -> OverrideTarget {
        self.target
    }
}

fn check_overridable(method: &MethodDesc) -> Result<()> {
    if method.is_overridable() {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "{method} is an instance method of a concrete type; only interface or static methods can be overridden"
        )))
    }
}

impl Display for RpcOverride {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let OverrideTarget::Parameter(index) = self.target {
            write!(f, "parameterIndex={index} ")?;
        }
        write!(f, "{}::{}(", self.declaring_type, self.method_name)?;
        for (i, ty) in self.parameter_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        write!(f, ")")
    }
}

/// Overrides active on one runner.
#[derive(Debug, Default)]
pub struct OverrideSet {
    active: RwLock<HashSet<RpcOverride>>,
}

impl OverrideSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override; returns `false` if it was already active.
    #[must_use]
    pub fn add(&self, rpc_override: RpcOverride) -> bool {
        self.write().insert(rpc_override)
    }

    /// Remove an override; returns `false` if it was not active.
    #[must_use]
    pub fn remove(&self, rpc_override: &RpcOverride) -> bool {
        self.write().remove(rpc_override)
    }

    /// Whether an override for `target` of `method` is active.
    #[must_use]
    pub fn contains(&self, method: &MethodDesc, target: OverrideTarget) -> bool {
        let wanted = RpcOverride::new(method, target);
        self.read().contains(&wanted)
    }

    /// Number of active overrides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no override is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashSet<RpcOverride>> {
        self.active
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<RpcOverride>> {
        self.active
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Whether argument `index` of `method` crosses by reference.
#[must_use]
pub fn param_by_ref(method: &MethodDesc, index: usize, overrides: &OverrideSet) -> bool {
    method.param_marked_by_ref(index)
        || overrides.contains(method, OverrideTarget::Parameter(index))
}

/// Whether the result of `method` crosses by reference.
#[must_use]
pub fn result_by_ref(method: &MethodDesc, overrides: &OverrideSet) -> bool {
    method.result_marked_by_ref() || overrides.contains(method, OverrideTarget::Return)
}
