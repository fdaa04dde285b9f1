//! The host's view of runtime types.
//!
//! Exception synthesis needs to look up a type by name, check assignability,
//! list public constructors, and invoke one. Those are reflective operations
//! the host runtime provides; [`TypeIntrospector`] is the seam.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Binary name of the root of all throwables.
pub const THROWABLE: &str = "java.lang.Throwable";

/// Binary name of the generic runtime failure.
pub const RUNTIME_EXCEPTION: &str = "java.lang.RuntimeException";

/// A resolved runtime type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeHandle(Arc<str>);

impl TypeHandle {
    pub fn new(binary_name: &str) -> Self {
        TypeHandle(Arc::from(binary_name))
    }

    pub fn binary_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A constructor parameter, as far as constructor selection cares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "type", rename_all = "snake_case")]
pub enum ParamKind {
    /// `java.lang.String`
    String,
    /// `int`
    Int,
    /// Any other reference type, by binary name.
    Reference(String),
    /// Any other primitive, by descriptor.
    Other(String),
}

/// A public constructor's parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConstructorSig {
    pub params: Vec<ParamKind>,
}

impl ConstructorSig {
    pub fn new(params: Vec<ParamKind>) -> Self {
        Self { params }
    }

    pub fn no_arg() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Display for ConstructorSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self
            .params
            .iter()
            .map(|p| match p {
                ParamKind::String => "java.lang.String",
                ParamKind::Int => "int",
                ParamKind::Reference(name) | ParamKind::Other(name) => name,
            })
            .collect();
        write!(f, "({})", params.join(", "))
    }
}

/// A constructor argument.
#[derive(Debug, Clone, PartialEq)]
pub enum CtorArg {
    Str(String),
    Int(i32),
    Throwable(Throwable),
}

/// A throwable instance handed back to the host to raise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Throwable {
    /// Binary name of the concrete type.
    pub class_name: String,
    pub message: Option<String>,
    pub cause: Option<Box<Throwable>>,
}

impl Throwable {
    pub fn new(class_name: impl Into<String>, message: Option<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message,
            cause: None,
        }
    }

    /// A `java.lang.RuntimeException` with a message.
    pub fn runtime_failure(message: impl Into<String>) -> Self {
        Self::new(RUNTIME_EXCEPTION, Some(message.into()))
    }

    pub fn with_cause(mut self, cause: Throwable) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for Throwable {
    /// `class: message`, or just the class without a message.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.class_name, message),
            None => f.write_str(&self.class_name),
        }
    }
}

impl std::error::Error for Throwable {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("class {0} not found")]
    NotFound(String),

    #[error("class {name} failed to link: {reason}")]
    Linkage { name: String, reason: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum InstantiationError {
    #[error("{0} is abstract")]
    Abstract(String),

    #[error("{class} has no public constructor {ctor}")]
    NoSuchConstructor { class: String, ctor: String },

    #[error("arguments do not match {class}{ctor}")]
    ArgumentMismatch { class: String, ctor: String },

    #[error("constructor of {class} threw {thrown}")]
    ConstructorThrew { class: String, thrown: Throwable },
}

/// Reflective access to the host runtime's types.
pub trait TypeIntrospector: Send + Sync {
    /// Resolve a binary name without initializing the type.
    fn resolve(&self, binary_name: &str) -> Result<TypeHandle, ResolveError>;

    /// Whether a value of type `from` can be assigned to type `to`.
    fn is_assignable(&self, from: &str, to: &str) -> bool;

    /// Public constructors of `ty`, in no particular order.
    fn public_constructors(&self, ty: &TypeHandle) -> Vec<ConstructorSig>;

    fn instantiate(
        &self,
        ty: &TypeHandle,
        ctor: &ConstructorSig,
        args: Vec<CtorArg>,
    ) -> Result<Throwable, InstantiationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn throwable_display_matches_runtime_convention() {
        let t = Throwable::new("java.io.IOException", Some("disk".to_string()));
        assert_eq!(t.to_string(), "java.io.IOException: disk");
        assert_eq!(Throwable::new("java.lang.Error", None).to_string(), "java.lang.Error");
    }

    #[test]
    fn cause_is_the_error_source() {
        let t = Throwable::runtime_failure("outer").with_cause(Throwable::new("java.lang.Error", None));
        assert_eq!(t.source().unwrap().to_string(), "java.lang.Error");
    }

    #[test]
    fn constructor_sig_display() {
        let sig = ConstructorSig::new(vec![ParamKind::String, ParamKind::Reference(THROWABLE.into())]);
        assert_eq!(sig.to_string(), "(java.lang.String, java.lang.Throwable)");
    }
}
