//! Choosing the exception type to inject into a method.

use crate::classfile::instructions::opcodes::{ATHROW, INVOKESPECIAL};
use crate::classfile::{ConstantPool, Instruction, Instructions, Result};
use serde::Serialize;

/// Where the candidate type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// First entry of the method's `throws` clause.
    Declared,
    /// Constructor call feeding the first `athrow` in the body.
    ThrowSite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Internal name, e.g. `java/io/IOException`.
    pub exception: String,
    pub source: CandidateSource,
}

/// Declared exceptions win over anything found in the body.
pub fn select_candidate(
    declared: &[String],
    code: Option<&[u8]>,
    pool: &ConstantPool,
) -> Result<Option<Candidate>> {
    if let Some(first) = declared.first() {
        return Ok(Some(Candidate {
            exception: first.clone(),
            source: CandidateSource::Declared,
        }));
    }
    let Some(code) = code else {
        return Ok(None);
    };
    Ok(first_thrown_type(code, pool)?.map(|exception| Candidate {
        exception,
        source: CandidateSource::ThrowSite,
    }))
}

/// Owner of the constructor invoked immediately before the first `athrow`.
///
/// Only the first `athrow` is considered: if it rethrows a value that was not
/// freshly constructed, there is no candidate.
pub fn first_thrown_type(code: &[u8], pool: &ConstantPool) -> Result<Option<String>> {
    let mut previous: Option<Instruction> = None;
    for insn in Instructions::new(code) {
        let insn = insn?;
        if insn.opcode == ATHROW {
            let index = match previous {
                Some(prev) if prev.opcode == INVOKESPECIAL => prev.u16_operand(code),
                _ => None,
            };
            let Some(index) = index else {
                return Ok(None);
            };
            let (owner, name, _) = pool.method_ref(index)?;
            return Ok((name == "<init>").then_some(owner));
        }
        previous = Some(insn);
    }
    Ok(None)
}
