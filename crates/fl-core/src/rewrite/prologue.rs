//! Splicing the dispatch call in front of a method body.
//!
//! The prologue is
//!
//! ```text
//! ldc_w    "<binary owner>.<method>"
//! ldc_w    "<exception internal name>"
//! invokestatic <dispatch owner>.<dispatch name>(String, String)V
//! nop; nop; nop
//! ```
//!
//! padded to 12 bytes so every original instruction keeps its offset modulo
//! 4 and `tableswitch`/`lookupswitch` padding stays valid. Branch offsets are
//! relative and need no change; absolute offsets in the exception table and
//! the debug/verification attributes are shifted by the prologue length.

use crate::classfile::instructions::opcodes::{INVOKESTATIC, LDC_W, NOP};
use crate::classfile::{
    ByteReader, ClassFileError, CodeAttribute, ConstantPool, Result, MAX_CODE_LENGTH,
};
use fl_config::DispatchTarget;
use serde::Serialize;

pub const PROLOGUE_LEN: usize = 12;

/// The prologue pushes two references.
const PROLOGUE_STACK: u16 = 2;

/// Nested `Code` attributes holding offsets this module does not relocate.
const UNRELOCATABLE: &[&str] = &[
    "RuntimeVisibleTypeAnnotations",
    "RuntimeInvisibleTypeAnnotations",
    "CharacterRangeTable",
];

/// Why an otherwise eligible method was not instrumented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum UnsupportedReason {
    /// The body carries an attribute with offsets we cannot relocate.
    UnrelocatableAttribute { name: String },
    /// The body would exceed the 65535-byte code limit.
    CodeTooLarge { length: usize },
}

impl std::fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnsupportedReason::UnrelocatableAttribute { name } => {
                write!(f, "code carries {name}")
            }
            UnsupportedReason::CodeTooLarge { length } => {
                write!(f, "code length {length} leaves no room for the prologue")
            }
        }
    }
}

/// Constant pool indices the prologue refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrologueRefs {
    pub method_id: u16,
    pub exception: u16,
    pub dispatch: u16,
}

impl PrologueRefs {
    pub fn intern(
        pool: &mut ConstantPool,
        method_id: &str,
        exception: &str,
        dispatch: &DispatchTarget,
    ) -> Result<Self> {
        Ok(Self {
            method_id: pool.intern_string(method_id)?,
            exception: pool.intern_string(exception)?,
            dispatch: pool.intern_method_ref(
                &dispatch.owner,
                &dispatch.name,
                dispatch.descriptor(),
            )?,
        })
    }

    pub fn bytes(&self) -> [u8; PROLOGUE_LEN] {
        let [m0, m1] = self.method_id.to_be_bytes();
        let [e0, e1] = self.exception.to_be_bytes();
        let [d0, d1] = self.dispatch.to_be_bytes();
        [
            LDC_W, m0, m1, LDC_W, e0, e1, INVOKESTATIC, d0, d1, NOP, NOP, NOP,
        ]
    }
}

/// Whether `code` can take a prologue.
pub fn unsupported_reason(code: &CodeAttribute, pool: &ConstantPool) -> Option<UnsupportedReason> {
    if code.code.len() + PROLOGUE_LEN > MAX_CODE_LENGTH {
        return Some(UnsupportedReason::CodeTooLarge {
            length: code.code.len(),
        });
    }
    code.attributes.iter().find_map(|attr| {
        UNRELOCATABLE
            .iter()
            .find(|name| attr.is_named(pool, name))
            .map(|name| UnsupportedReason::UnrelocatableAttribute {
                name: name.to_string(),
            })
    })
}

/// Prepend the prologue and relocate everything that holds absolute offsets.
///
/// `code` is only modified if every relocation succeeds.
pub fn inject_prologue(code: &mut CodeAttribute, refs: &PrologueRefs, pool: &ConstantPool) -> Result<()> {
    let mut patched = code.clone();

    let mut body = Vec::with_capacity(code.code.len() + PROLOGUE_LEN);
    body.extend_from_slice(&refs.bytes());
    body.extend_from_slice(&code.code);
    if body.len() > MAX_CODE_LENGTH {
        return Err(ClassFileError::TooLarge("code"));
    }
    patched.code = body;
    patched.max_stack = patched.max_stack.max(PROLOGUE_STACK);

    for entry in &mut patched.exception_table {
        entry.start_pc = shift(entry.start_pc)?;
        entry.end_pc = shift(entry.end_pc)?;
        entry.handler_pc = shift(entry.handler_pc)?;
    }

    for attr in &mut patched.attributes {
        let Ok(name) = pool.utf8(attr.name_index) else {
            continue;
        };
        match name.as_str() {
            "LineNumberTable" => shift_table(&mut attr.info, 4, "LineNumberTable")?,
            "LocalVariableTable" => shift_table(&mut attr.info, 10, "LocalVariableTable")?,
            "LocalVariableTypeTable" => {
                shift_table(&mut attr.info, 10, "LocalVariableTypeTable")?
            }
            "StackMapTable" => shift_first_frame(&mut attr.info)?,
            _ => {}
        }
    }

    *code = patched;
    Ok(())
}

fn shift(pc: u16) -> Result<u16> {
    pc.checked_add(PROLOGUE_LEN as u16)
        .ok_or(ClassFileError::TooLarge("code offset"))
}

/// Shift the leading `start_pc` of each fixed-size entry in a `u2 count` table.
fn shift_table(info: &mut [u8], entry_len: usize, attribute: &'static str) -> Result<()> {
    let mut r = ByteReader::new(info);
    let count = r.u16()? as usize;
    if info.len() != 2 + count * entry_len {
        return Err(ClassFileError::MalformedAttribute {
            attribute,
            reason: format!("{} bytes for {count} entries", info.len()),
        });
    }
    for i in 0..count {
        let at = 2 + i * entry_len;
        let pc = u16::from_be_bytes([info[at], info[at + 1]]);
        info[at..at + 2].copy_from_slice(&shift(pc)?.to_be_bytes());
    }
    Ok(())
}

const SAME_FRAME_MAX: u8 = 63;
const SAME_LOCALS_1_STACK_ITEM: u8 = 64;
const SAME_LOCALS_1_STACK_ITEM_MAX: u8 = 127;
const SAME_LOCALS_1_STACK_ITEM_EXTENDED: u8 = 247;
const SAME_FRAME_EXTENDED: u8 = 251;

/// Frame offsets are delta-encoded, so only the first frame moves.
///
/// Compact frame forms whose delta no longer fits are widened to their
/// `_extended` equivalents.
fn shift_first_frame(info: &mut Vec<u8>) -> Result<()> {
    let malformed = |reason: String| ClassFileError::MalformedAttribute {
        attribute: "StackMapTable",
        reason,
    };
    let mut r = ByteReader::new(info.as_slice());
    if r.u16()? == 0 {
        return Ok(());
    }
    let frame_type = r.u8()?;
    let delta = PROLOGUE_LEN as u16;

    match frame_type {
        0..=SAME_FRAME_MAX => {
            let offset = frame_type as u16 + delta;
            if offset <= SAME_FRAME_MAX as u16 {
                info[2] = offset as u8;
            } else {
                widen(info, SAME_FRAME_EXTENDED, offset);
            }
        }
        SAME_LOCALS_1_STACK_ITEM..=SAME_LOCALS_1_STACK_ITEM_MAX => {
            let offset = (frame_type - SAME_LOCALS_1_STACK_ITEM) as u16 + delta;
            if offset <= SAME_FRAME_MAX as u16 {
                info[2] = SAME_LOCALS_1_STACK_ITEM + offset as u8;
            } else {
                widen(info, SAME_LOCALS_1_STACK_ITEM_EXTENDED, offset);
            }
        }
        SAME_LOCALS_1_STACK_ITEM_EXTENDED..=u8::MAX => {
            let offset = r.u16()?;
            let shifted = offset
                .checked_add(delta)
                .ok_or_else(|| malformed(format!("frame offset {offset} overflows")))?;
            info[3..5].copy_from_slice(&shifted.to_be_bytes());
        }
        reserved => return Err(malformed(format!("reserved frame type {reserved}"))),
    }
    Ok(())
}

/// Replace the one-byte frame type at index 2 with `extended` plus a u16 delta.
fn widen(info: &mut Vec<u8>, extended: u8, offset: u16) {
    let [hi, lo] = offset.to_be_bytes();
    info[2] = extended;
    info.insert(3, hi);
    info.insert(4, lo);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{Attribute, ExceptionTableEntry};

    fn pool_with(names: &[&str]) -> (ConstantPool, Vec<u16>) {
        let mut pool = ConstantPool::new();
        let idx = names.iter().map(|n| pool.intern_utf8(n).unwrap()).collect();
        (pool, idx)
    }

    fn refs() -> PrologueRefs {
        PrologueRefs {
            method_id: 0x0102,
            exception: 0x0304,
            dispatch: 0x0506,
        }
    }

    #[test]
    fn prologue_layout_is_fixed() {
        assert_eq!(
            refs().bytes(),
            [0x13, 1, 2, 0x13, 3, 4, 0xb8, 5, 6, 0, 0, 0]
        );
        assert_eq!(PROLOGUE_LEN % 4, 0);
    }

    #[test]
    fn exception_table_and_line_numbers_shift() {
        let (pool, idx) = pool_with(&["LineNumberTable"]);
        let mut code = CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code: vec![0xb1],
            exception_table: vec![ExceptionTableEntry {
                start_pc: 0,
                end_pc: 1,
                handler_pc: 1,
                catch_type: 0,
            }],
            attributes: vec![Attribute {
                name_index: idx[0],
                info: vec![0, 1, 0, 0, 0, 42],
            }],
        };
        inject_prologue(&mut code, &refs(), &pool).unwrap();
        assert_eq!(code.code.len(), 13);
        assert_eq!(code.max_stack, 2);
        assert_eq!(code.exception_table[0].start_pc, 12);
        assert_eq!(code.exception_table[0].end_pc, 13);
        assert_eq!(code.exception_table[0].handler_pc, 13);
        assert_eq!(code.attributes[0].info, vec![0, 1, 0, 12, 0, 42]);
    }

    #[test]
    fn larger_max_stack_is_kept() {
        let pool = ConstantPool::new();
        let mut code = CodeAttribute {
            max_stack: 7,
            max_locals: 1,
            code: vec![0xb1],
            exception_table: vec![],
            attributes: vec![],
        };
        inject_prologue(&mut code, &refs(), &pool).unwrap();
        assert_eq!(code.max_stack, 7);
    }

    #[test]
    fn same_frame_stays_compact_when_it_fits() {
        let mut info = vec![0, 2, 10, 5];
        shift_first_frame(&mut info).unwrap();
        assert_eq!(info, vec![0, 2, 22, 5]);
    }

    #[test]
    fn same_frame_widens_past_63() {
        let mut info = vec![0, 1, 60];
        shift_first_frame(&mut info).unwrap();
        assert_eq!(info, vec![0, 1, 251, 0, 72]);
    }

    #[test]
    fn one_stack_item_frame_widens_and_keeps_type_info() {
        // same_locals_1_stack_item delta 55, stack item: Object #9
        let mut info = vec![0, 1, 64 + 55, 7, 0, 9];
        shift_first_frame(&mut info).unwrap();
        assert_eq!(info, vec![0, 1, 247, 0, 67, 7, 0, 9]);

        let mut info = vec![0, 1, 64 + 3, 1];
        shift_first_frame(&mut info).unwrap();
        assert_eq!(info, vec![0, 1, 64 + 15, 1]);
    }

    #[test]
    fn extended_frames_shift_their_u16_delta() {
        // full_frame delta 300
        let mut info = vec![0, 1, 255, 0x01, 0x2c, 0, 0, 0, 0];
        shift_first_frame(&mut info).unwrap();
        assert_eq!(&info[3..5], &312u16.to_be_bytes());
    }

    #[test]
    fn reserved_frame_type_is_malformed() {
        let mut info = vec![0, 1, 200];
        assert!(shift_first_frame(&mut info).is_err());
    }

    #[test]
    fn empty_stack_map_is_untouched() {
        let mut info = vec![0, 0];
        shift_first_frame(&mut info).unwrap();
        assert_eq!(info, vec![0, 0]);
    }

    #[test]
    fn failed_relocation_leaves_code_untouched() {
        let (pool, idx) = pool_with(&["LineNumberTable"]);
        let original = CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code: vec![0xb1],
            exception_table: vec![],
            attributes: vec![Attribute {
                name_index: idx[0],
                info: vec![0, 3, 0, 0],
            }],
        };
        let mut code = original.clone();
        assert!(inject_prologue(&mut code, &refs(), &pool).is_err());
        assert_eq!(code, original);
    }

    #[test]
    fn type_annotations_and_oversized_code_are_unsupported() {
        let (pool, idx) = pool_with(&["RuntimeVisibleTypeAnnotations"]);
        let code = CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code: vec![0xb1],
            exception_table: vec![],
            attributes: vec![Attribute {
                name_index: idx[0],
                info: vec![0, 0],
            }],
        };
        assert!(matches!(
            unsupported_reason(&code, &pool),
            Some(UnsupportedReason::UnrelocatableAttribute { .. })
        ));

        let big = CodeAttribute {
            code: vec![0; MAX_CODE_LENGTH - 4],
            attributes: vec![],
            ..code
        };
        assert_eq!(
            unsupported_reason(&big, &pool),
            Some(UnsupportedReason::CodeTooLarge {
                length: MAX_CODE_LENGTH - 4
            })
        );
    }
}
