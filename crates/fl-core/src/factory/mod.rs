//! Dynamic exception synthesis and the throw dispatch path.
//!
//! An injected prologue lands in [`ExceptionFactory::throw_dispatch`] with the
//! calling method's id and the exception type picked at load time. The
//! governor is consulted first; only a call that is allowed to throw pays for
//! type resolution and construction. Whatever goes wrong while building the
//! exception, a throwable always comes back: failures are replaced by a
//! generic runtime failure that names the type and the reason.

pub mod introspect;
pub mod policy;
pub mod registry;

pub use introspect::{
    ConstructorSig, CtorArg, InstantiationError, ParamKind, ResolveError, Throwable, TypeHandle,
    TypeIntrospector,
};
pub use policy::{CtorStrategy, INJECTED_CODE, INJECTED_MESSAGE};
pub use registry::{TypeDef, TypeRegistry};

use crate::governor::ThrowGovernor;
use fl_common::{ClassName, MethodId};
use introspect::{RUNTIME_EXCEPTION, THROWABLE};
use policy::select_constructor;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SynthesisError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("class {0} is not a Throwable")]
    NotThrowable(String),

    #[error("no usable public constructor on {0}")]
    NoUsableConstructor(String),

    #[error(transparent)]
    Instantiation(#[from] InstantiationError),
}

impl From<SynthesisError> for fl_common::Error {
    fn from(err: SynthesisError) -> Self {
        fl_common::Error::Synthesis(err.to_string())
    }
}

/// How to build one exception type, resolved once and cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionSpec {
    pub type_name: String,
    #[serde(flatten)]
    pub strategy: CtorStrategy,
    pub ctor: ConstructorSig,
    #[serde(skip)]
    pub handle: TypeHandle,
}

/// Builds exceptions by name through the host's [`TypeIntrospector`].
pub struct ExceptionFactory {
    introspector: Arc<dyn TypeIntrospector>,
    governor: Arc<ThrowGovernor>,
    specs: RwLock<HashMap<String, Arc<ExceptionSpec>>>,
}

impl std::fmt::Debug for ExceptionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionFactory")
            .field("governor", &self.governor)
            .field("cached_specs", &self.cached_specs())
            .finish_non_exhaustive()
    }
}

/// Accept either `java/io/IOException` or `java.io.IOException`.
fn binary_name(exception: &str) -> String {
    ClassName::from_binary(exception).to_binary()
}

impl ExceptionFactory {
    pub fn new(introspector: Arc<dyn TypeIntrospector>, governor: Arc<ThrowGovernor>) -> Self {
        Self {
            introspector,
            governor,
            specs: RwLock::new(HashMap::new()),
        }
    }

    pub fn governor(&self) -> &Arc<ThrowGovernor> {
        &self.governor
    }

    pub fn cached_specs(&self) -> usize {
        self.specs.read().map_or(0, |s| s.len())
    }

    /// Entry point of every injected prologue.
    ///
    /// `Ok(())` means "return normally"; `Err` carries the throwable the host
    /// must raise in the calling method.
    pub fn throw_dispatch(&self, method_id: &str, exception: &str) -> Result<(), Throwable> {
        let method = MethodId::from_raw(method_id);
        if !self.governor.should_throw(&method) {
            return Ok(());
        }
        let throwable = self.synthesize(exception);
        debug!(method = %method, throwable = %throwable, "dispatching injected throw");
        Err(throwable)
    }

    /// Build an instance of `exception`, substituting a generic runtime
    /// failure when that is impossible.
    pub fn synthesize(&self, exception: &str) -> Throwable {
        let name = binary_name(exception);
        self.try_synthesize(&name).unwrap_or_else(|err| {
            warn!(exception = %name, error = %err, "falling back to generic runtime failure");
            fallback_failure(&name, &err)
        })
    }

    pub fn try_synthesize(&self, exception: &str) -> Result<Throwable, SynthesisError> {
        let spec = self.spec_for(exception)?;
        let throwable =
            self.introspector
                .instantiate(&spec.handle, &spec.ctor, spec.strategy.args())?;
        Ok(throwable)
    }

    /// Resolve and cache the construction plan for a type. Failures are not
    /// cached, so a type that becomes loadable later is picked up.
    pub fn spec_for(&self, exception: &str) -> Result<Arc<ExceptionSpec>, SynthesisError> {
        let name = binary_name(exception);
        if let Some(spec) = self
            .specs
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&name)
        {
            return Ok(Arc::clone(spec));
        }

        let spec = Arc::new(self.resolve_spec(&name)?);
        let mut specs = self.specs.write().unwrap_or_else(|p| p.into_inner());
        Ok(Arc::clone(specs.entry(name).or_insert(spec)))
    }

    fn resolve_spec(&self, name: &str) -> Result<ExceptionSpec, SynthesisError> {
        let handle = self.introspector.resolve(name)?;
        if !self.introspector.is_assignable(name, THROWABLE) {
            return Err(SynthesisError::NotThrowable(name.to_string()));
        }
        let ctors = self.introspector.public_constructors(&handle);
        let accepts_cause = |param: &str| {
            self.introspector.is_assignable(param, THROWABLE)
                && self.introspector.is_assignable(RUNTIME_EXCEPTION, param)
        };
        let (strategy, ctor) = select_constructor(&ctors, accepts_cause)
            .ok_or_else(|| SynthesisError::NoUsableConstructor(name.to_string()))?;
        debug!(exception = name, ctor = %ctor, "resolved exception constructor");
        Ok(ExceptionSpec {
            type_name: name.to_string(),
            strategy,
            ctor,
            handle,
        })
    }
}

/// The generic runtime failure raised when synthesis fails.
pub fn fallback_failure(exception: &str, err: &SynthesisError) -> Throwable {
    Throwable::runtime_failure(format!("Failed to throw {exception}: {err}"))
}
