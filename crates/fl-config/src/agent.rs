//! The agent configuration created once at activation.

use crate::deny::DenyList;
use crate::validate::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default injection probability when none is given.
pub const DEFAULT_PROBABILITY: f64 = 1.0;

/// Default number of times each method's injected throw may fire.
pub const DEFAULT_THROW_CEILING: u64 = 1;

/// Default debug log location.
pub const DEFAULT_DEBUG_LOG: &str = "/tmp/faultline.log";

/// Internal-name prefixes that are never instrumented.
///
/// Covers the platform itself, test runners, coverage tools, logging
/// backends, and faultline's own runtime classes.
pub const BUILTIN_DENY_PREFIXES: &[&str] = &[
    "java/",
    "javax/",
    "sun/",
    "jdk/",
    "com/sun/",
    "org/junit/",
    "junit/",
    "org/jacoco/",
    "org/apache/tools/",
    "org/slf4j/",
    "ch/qos/",
    "faultline/",
];

/// Descriptor every dispatch entry point must have: `(methodId, exceptionName)`.
pub const DISPATCH_DESCRIPTOR: &str = "(Ljava/lang/String;Ljava/lang/String;)V";

/// The static method the injected prologue invokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTarget {
    /// Owner class, internal form.
    pub owner: String,
    /// Static method name.
    pub name: String,
}

impl Default for DispatchTarget {
    fn default() -> Self {
        Self {
            owner: "faultline/runtime/FaultDispatch".to_string(),
            name: "throwDispatch".to_string(),
        }
    }
}

impl DispatchTarget {
    pub fn descriptor(&self) -> &'static str {
        DISPATCH_DESCRIPTOR
    }
}

impl FromStr for DispatchTarget {
    type Err = ValidationError;

    /// Parse `owner/Internal.method`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| ValidationError::InvalidValue {
            field: "dispatch".to_string(),
            message: format!("{message}, got '{s}'"),
        };

        let (owner, name) = s
            .rsplit_once('.')
            .ok_or_else(|| invalid("expected owner/Class.method"))?;
        if owner.is_empty() || name.is_empty() {
            return Err(invalid("owner and method must be non-empty"));
        }
        if owner.contains('.') || owner.ends_with('/') || owner.starts_with('/') {
            return Err(invalid("owner must be an internal class name"));
        }
        if name.contains(['/', ';', '[', '<', '>']) {
            return Err(invalid("method name contains illegal characters"));
        }
        Ok(DispatchTarget {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// Agent configuration.
///
/// Created once when the agent activates and read-only afterwards; the
/// rewriter reads it concurrently from every class-loading thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Chance, rolled once per eligible method at load time, that it is instrumented.
    pub probability: f64,
    /// Maximum number of times each method's injected throw fires.
    pub throw_ceiling: u64,
    /// Deny-list entries: internal-name prefixes or glob patterns.
    pub deny: Vec<String>,
    /// Append-only debug log.
    pub debug_log: PathBuf,
    /// Static method the injected prologue calls.
    pub dispatch: DispatchTarget,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            probability: DEFAULT_PROBABILITY,
            throw_ceiling: DEFAULT_THROW_CEILING,
            deny: BUILTIN_DENY_PREFIXES.iter().map(|s| s.to_string()).collect(),
            debug_log: PathBuf::from(DEFAULT_DEBUG_LOG),
            dispatch: DispatchTarget::default(),
        }
    }
}

impl AgentConfig {
    /// Set the injection probability.
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    /// Set the throw ceiling.
    pub fn with_throw_ceiling(mut self, ceiling: u64) -> Self {
        self.throw_ceiling = ceiling;
        self
    }

    /// Add a deny-list entry (duplicates are ignored).
    pub fn with_deny(mut self, entry: impl Into<String>) -> Self {
        let entry = entry.into();
        if !self.deny.contains(&entry) {
            self.deny.push(entry);
        }
        self
    }

    /// Set the debug log path.
    pub fn with_debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_log = path.into();
        self
    }

    /// Compile the deny-list entries.
    pub fn deny_list(&self) -> ValidationResult<DenyList> {
        DenyList::compile(&self.deny)
    }
}
