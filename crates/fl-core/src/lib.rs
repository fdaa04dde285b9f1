//! faultline core library.
//!
//! This library provides:
//! - A minimal class-file model that round-trips unmodified input exactly
//! - The load-time method rewriter that splices in the throw-dispatch prologue
//! - The exception factory and per-method throw governor behind that prologue
//! - The transformer registration and agent activation lifecycle
//! - The HotSpot attach client used by the `fl-attach` controller
//!
//! The controller entry point is in `main.rs`.

pub mod agent;
pub mod attach;
pub mod classfile;
pub mod debug_log;
pub mod exit_codes;
pub mod factory;
pub mod governor;
pub mod logging;
pub mod registrar;
pub mod rewrite;

pub use agent::{agentmain, premain, throw_dispatch, Agent, AgentError};
pub use factory::{ExceptionFactory, Throwable, TypeIntrospector, TypeRegistry};
pub use governor::ThrowGovernor;
pub use registrar::{ClassFileTransformer, FaultTransformer, Instrumentation, LoaderId};
pub use rewrite::{MethodRewriter, RewriteOutcome};

// Re-export test utilities for integration tests and fuzzing
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
