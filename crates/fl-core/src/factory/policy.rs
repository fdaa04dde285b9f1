//! Constructor selection for synthesized exceptions.
//!
//! Single-argument constructors are preferred in a fixed order: message
//! string, then cause, then integer code, then the no-arg constructor. The
//! choice depends only on which constructors exist, never on the order the
//! host happens to list them in.

use super::introspect::{ConstructorSig, CtorArg, ParamKind, Throwable};
use serde::Serialize;

/// Message passed to string constructors and to the synthetic cause.
pub const INJECTED_MESSAGE: &str = "injected exception";

/// Value passed to `int` constructors.
pub const INJECTED_CODE: i32 = 1;

/// How an exception type gets instantiated. Variant order is preference order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CtorStrategy {
    /// `(String)` with [`INJECTED_MESSAGE`].
    Message,
    /// `(T)` where a runtime exception is assignable to `T`. Among several,
    /// the lexicographically smallest parameter type wins.
    Cause { param: String },
    /// `(int)` with [`INJECTED_CODE`].
    Code,
    NoArg,
}

impl CtorStrategy {
    pub fn args(&self) -> Vec<CtorArg> {
        match self {
            CtorStrategy::Message => vec![CtorArg::Str(INJECTED_MESSAGE.to_string())],
            CtorStrategy::Cause { .. } => vec![CtorArg::Throwable(Throwable::runtime_failure(
                INJECTED_MESSAGE,
            ))],
            CtorStrategy::Code => vec![CtorArg::Int(INJECTED_CODE)],
            CtorStrategy::NoArg => Vec::new(),
        }
    }
}

/// Classify one constructor. `accepts_cause(t)` says whether a generic
/// runtime exception can be passed as a `t`.
pub fn classify<F>(ctor: &ConstructorSig, accepts_cause: F) -> Option<CtorStrategy>
where
    F: Fn(&str) -> bool,
{
    match ctor.params.as_slice() {
        [] => Some(CtorStrategy::NoArg),
        [ParamKind::String] => Some(CtorStrategy::Message),
        [ParamKind::Int] => Some(CtorStrategy::Code),
        [ParamKind::Reference(param)] if accepts_cause(param) => Some(CtorStrategy::Cause {
            param: param.clone(),
        }),
        _ => None,
    }
}

/// Pick the preferred constructor, if any is usable.
pub fn select_constructor<F>(
    ctors: &[ConstructorSig],
    accepts_cause: F,
) -> Option<(CtorStrategy, ConstructorSig)>
where
    F: Fn(&str) -> bool,
{
    ctors
        .iter()
        .filter_map(|c| classify(c, &accepts_cause).map(|s| (s, c.clone())))
        .min_by(|a, b| a.0.cmp(&b.0))
}
