//! Class, method and process identity types.
//!
//! Class files spell type names in *internal* form (`com/acme/Repo`), while the
//! runtime resolves types by *binary* name (`com.acme.Repo`). `ClassName` always
//! stores the internal form and converts on demand so the two never get mixed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A class name in internal form (`/`-separated packages).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassName(String);

impl ClassName {
    /// Create from an internal name such as `com/acme/Repo`.
    pub fn from_internal(name: impl Into<String>) -> Self {
        ClassName(name.into())
    }

    /// Create from a binary name such as `com.acme.Repo`.
    pub fn from_binary(name: &str) -> Self {
        ClassName(name.replace('.', "/"))
    }

    /// The internal form, as stored in class files.
    pub fn as_internal(&self) -> &str {
        &self.0
    }

    /// The binary form, as used for runtime type resolution.
    pub fn to_binary(&self) -> String {
        self.0.replace('/', ".")
    }

    /// Nested, inner, anonymous and most synthetic classes carry a `$`.
    pub fn is_nested(&self) -> bool {
        self.0.contains('$')
    }

    /// Whether the internal name starts with the given internal prefix.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClassName {
    fn from(name: &str) -> Self {
        ClassName::from_internal(name)
    }
}

/// Fully-qualified method identifier: `<binary class name>.<method name>`.
///
/// Overloads of the same name map to the same identifier, so they share one
/// throw counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodId(String);

impl MethodId {
    /// Build the identifier for `method` declared in `owner`.
    pub fn new(owner: &ClassName, method: &str) -> Self {
        MethodId(format!("{}.{}", owner.to_binary(), method))
    }

    /// Wrap an identifier that arrived as a string constant at a call site.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        MethodId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(binary class name, method name)`.
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0.rsplit_once('.')
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process ID of an attach target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        ProcessId(pid)
    }
}
