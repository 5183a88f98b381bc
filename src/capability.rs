//! Capability sets, method descriptors, and the catalog peers share.
//!
//! Peers cannot reflect over each other's code, so both sides build the
//! same [`Catalog`] up front: one [`Capability`] per interface or concrete
//! type, each listing its [`MethodDesc`]s. A remote `Invoke` names a method
//! by declaring type, name, and parameter types; the receiving side
//! resolves that triple against its catalog.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::object::ObjectRef;
use crate::{AppError, Result};

/// Structural type descriptor for parameters and return values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum TypeDesc {
    /// No value.
    Unit,
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// UTF-8 string.
    Str,
    /// Byte array.
    Bytes,
    /// Capability (interface) type, by name.
    Interface(String),
    /// Array of the element type.
    Array(Box<TypeDesc>),
}

impl TypeDesc {
    /// Interface type with the given capability name.
    #[must_use]
    pub fn interface(name: impl Into<String>) -> Self {
        Self::Interface(name.into())
    }

    /// Array of `elem`.
    #[must_use]
    pub fn array(elem: TypeDesc) -> Self {
        Self::Array(Box::new(elem))
    }

    /// Whether values of this type are array-shaped.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Bytes | Self::Array(_))
    }

    /// Capability name, if this is an interface type.
    #[must_use]
    pub fn interface_name(&self) -> Option<&str> {
        match self {
            Self::Interface(name) => Some(name),
            _ => None,
        }
    }
}

impl Display for TypeDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Str => write!(f, "str"),
            Self::Bytes => write!(f, "bytes"),
            Self::Interface(name) => write!(f, "{name}"),
            Self::Array(elem) => write!(f, "[{elem}]"),
        }
    }
}

/// Whether a type is a capability set or a concrete implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    /// Capability set; instance methods are addressable across peers.
    Interface,
    /// Concrete type; only its static methods are addressable.
    Concrete,
}

/// Descriptor of one callable method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDesc {
    declaring_type: String,
    declaring_kind: TypeKind,
    name: String,
    parameter_types: Vec<TypeDesc>,
    return_type: TypeDesc,
    is_static: bool,
    by_ref_params: Vec<bool>,
    by_ref_result: bool,
}

impl MethodDesc {
    /// Start describing an instance method of an interface.
    #[must_use]
    pub fn interface(declaring_type: impl Into<String>, name: impl Into<String>) -> MethodBuilder {
        MethodBuilder::new(declaring_type.into(), TypeKind::Interface, name.into(), false)
    }

    /// Start describing a static method of `declaring_type`.
    #[must_use]
    pub fn static_fn(
        declaring_type: impl Into<String>,
        kind: TypeKind,
        name: impl Into<String>,
    ) -> MethodBuilder {
        MethodBuilder::new(declaring_type.into(), kind, name.into(), true)
    }

    /// Start describing an instance method of a concrete type.
    ///
    /// Such methods can be called locally but cannot carry overrides.
    #[must_use]
    pub fn concrete(declaring_type: impl Into<String>, name: impl Into<String>) -> MethodBuilder {
        MethodBuilder::new(declaring_type.into(), TypeKind::Concrete, name.into(), false)
    }

    /// Name of the declaring type.
    #[must_use]
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Kind of the declaring type.
    #[must_use]
    pub fn declaring_kind(&self) -> TypeKind {
        self.declaring_kind
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter types in declaration order.
    #[must_use]
    pub fn parameter_types(&self) -> &[TypeDesc] {
        &self.parameter_types
    }

    /// Return type.
    #[must_use]
    pub fn return_type(&self) -> &TypeDesc {
        &self.return_type
    }

    /// Whether the method is static (called without a target instance).
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether parameter `index` carries the static by-reference marker.
    #[must_use]
    pub fn param_marked_by_ref(&self, index: usize) -> bool {
        self.by_ref_params.get(index).copied().unwrap_or(false)
    }

    /// Whether the return value carries the static by-reference marker.
    #[must_use]
    pub fn result_marked_by_ref(&self) -> bool {
        self.by_ref_result
    }

    /// Whether this method can be identified across peers by signature.
    #[must_use]
    pub fn is_overridable(&self) -> bool {
        self.is_static || self.declaring_kind == TypeKind::Interface
    }

    /// Whether this descriptor matches a wire-level method identity.
    #[must_use]
    pub fn matches(&self, declaring_type: &str, name: &str, parameter_types: &[TypeDesc]) -> bool {
        self.declaring_type == declaring_type
            && self.name == name
            && self.parameter_types == parameter_types
    }
}

impl Display for MethodDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}(", self.declaring_type, self.name)?;
        for (i, ty) in self.parameter_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

/// Builder for [`MethodDesc`].
#[derive(Debug)]
pub struct MethodBuilder {
    desc: MethodDesc,
}

impl MethodBuilder {
    fn new(declaring_type: String, declaring_kind: TypeKind, name: String, is_static: bool) -> Self {
        Self {
            desc: MethodDesc {
                declaring_type,
                declaring_kind,
                name,
                parameter_types: Vec::new(),
                return_type: TypeDesc::Unit,
                is_static,
                by_ref_params: Vec::new(),
                by_ref_result: false,
            },
        }
    }

    /// Append a by-value parameter.
    #[must_use]
    pub fn param(mut self, ty: TypeDesc) -> Self {
        self.desc.parameter_types.push(ty);
        self.desc.by_ref_params.push(false);
        self
    }

    /// Append a parameter marked to cross by reference.
    #[must_use]
    pub fn param_by_ref(mut self, ty: TypeDesc) -> Self {
        self.desc.parameter_types.push(ty);
        self.desc.by_ref_params.push(true);
        self
    }

    /// Set the return type.
    #[must_use]
    pub fn returns(mut self, ty: TypeDesc) -> Self {
        self.desc.return_type = ty;
        self
    }

    /// Set the return type and mark the result to cross by reference.
    #[must_use]
    pub fn returns_by_ref(mut self, ty: TypeDesc) -> Self {
        self.desc.return_type = ty;
        self.desc.by_ref_result = true;
        self
    }

    /// Validate markers and produce the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if a by-reference parameter is neither
    /// an interface nor an array, or if a by-reference result is not an
    /// interface.
    pub fn build(self) -> Result<MethodDesc> {
        let desc = self.desc;
        for (index, ty) in desc.parameter_types.iter().enumerate() {
            if desc.by_ref_params[index] && !is_ref_eligible_param(ty) {
                return Err(AppError::Config(format!(
                    "parameter {index} of {desc} is {ty}; only interfaces and arrays cross by reference"
                )));
            }
        }
        if desc.by_ref_result && desc.return_type.interface_name().is_none() {
            return Err(AppError::Config(format!(
                "result of {desc} is {}; only interfaces cross by reference",
                desc.return_type
            )));
        }
        Ok(desc)
    }
}

/// Whether a parameter of type `ty` may cross by reference.
pub(crate) fn is_ref_eligible_param(ty: &TypeDesc) -> bool {
    ty.is_array() || ty.interface_name().is_some()
}

/// A named type and the methods callable on it.
#[derive(Clone)]
pub struct Capability {
    name: String,
    kind: TypeKind,
    methods: Vec<MethodDesc>,
    statics: Option<ObjectRef>,
}

impl Capability {
    /// Describe an interface (capability set).
    #[must_use]
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Interface,
            methods: Vec::new(),
            statics: None,
        }
    }

    /// Describe a concrete type.
    #[must_use]
    pub fn concrete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Concrete,
            methods: Vec::new(),
            statics: None,
        }
    }

    /// Add a method. Methods declared on other types are ignored at
    /// resolution time.
    #[must_use]
    pub fn method(mut self, method: MethodDesc) -> Self {
        self.methods.push(method);
        self
    }

    /// Receiver that executes this type's static methods.
    #[must_use]
    pub fn statics(mut self, receiver: ObjectRef) -> Self {
        self.statics = Some(receiver);
        self
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type kind.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Declared methods.
    #[must_use]
    pub fn methods(&self) -> &[MethodDesc] {
        &self.methods
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("methods", &self.methods.len())
            .field("statics", &self.statics.is_some())
            .finish()
    }
}

/// Set of capabilities known to a runner.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types: HashMap<String, Capability>,
}

impl Catalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability, replacing any previous one of the same name.
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.insert(capability);
        self
    }

    /// Add a capability, replacing any previous one of the same name.
    pub fn insert(&mut self, capability: Capability) {
        self.types.insert(capability.name.clone(), capability);
    }

    /// Look up a capability by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.types.get(name)
    }

    /// Resolve a method by declaring type, name, and parameter types.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] if the type or method is unknown.
    pub fn resolve(
        &self,
        declaring_type: &str,
        name: &str,
        parameter_types: &[TypeDesc],
    ) -> Result<&MethodDesc> {
        let capability = self
            .types
            .get(declaring_type)
            .ok_or_else(|| AppError::Internal(format!("unknown type {declaring_type}")))?;
        capability
            .methods
            .iter()
            .find(|m| m.matches(declaring_type, name, parameter_types))
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "no method {declaring_type}::{name} with {} parameter(s) of the given types",
                    parameter_types.len()
                ))
            })
    }

    /// Receiver for static methods of `declaring_type`, if any.
    #[must_use]
    pub fn static_receiver(&self, declaring_type: &str) -> Option<ObjectRef> {
        self.types
            .get(declaring_type)
            .and_then(|c| c.statics.clone())
    }

    /// Check that every name denotes a known interface.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Argument`] naming the first unknown or concrete
    /// type.
    pub fn check_interfaces<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for name in names {
            let name = name.as_ref();
            match self.types.get(name) {
                Some(c) if c.kind == TypeKind::Interface => {}
                Some(_) => {
                    return Err(AppError::Argument(format!("{name} is not an interface")));
                }
                None => return Err(AppError::Argument(format!("unknown interface {name}"))),
            }
        }
        Ok(())
    }
}
