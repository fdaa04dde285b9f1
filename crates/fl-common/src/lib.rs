//! faultline common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the faultline crates:
//! - Class and method identity types (internal vs binary naming)
//! - Target process identity
//! - The unified error type with stable codes

pub mod error;
pub mod id;

pub use error::{Error, ErrorCategory, StructuredError};
pub use id::{ClassName, MethodId, ProcessId};
