//! Bytecode instruction boundaries.
//!
//! The rewriter never needs operand semantics beyond a couple of opcodes, but
//! it does need to walk instruction boundaries correctly, which means knowing
//! every opcode's length including the padded switch forms and `wide`.

use super::{ClassFileError, Result};

pub mod opcodes {
    pub const NOP: u8 = 0x00;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const ALOAD_0: u8 = 0x2a;
    pub const DUP: u8 = 0x59;
    pub const IINC: u8 = 0x84;
    pub const IFEQ: u8 = 0x99;
    pub const GOTO: u8 = 0xa7;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const RETURN: u8 = 0xb1;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const NEW: u8 = 0xbb;
    pub const ATHROW: u8 = 0xbf;
    pub const WIDE: u8 = 0xc4;
}

use opcodes::*;

/// One decoded instruction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub pc: usize,
    pub opcode: u8,
    pub len: usize,
}

impl Instruction {
    /// The big-endian u16 operand right after the opcode, if present.
    pub fn u16_operand(&self, code: &[u8]) -> Option<u16> {
        let hi = *code.get(self.pc + 1)?;
        let lo = *code.get(self.pc + 2)?;
        Some(u16::from_be_bytes([hi, lo]))
    }
}

fn read_i32(code: &[u8], at: usize) -> Option<i32> {
    let b = code.get(at..at + 4)?;
    Some(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Length in bytes of the instruction at `pc`.
pub fn instruction_length(code: &[u8], pc: usize) -> Result<usize> {
    let opcode = *code.get(pc).ok_or(ClassFileError::UnexpectedEof {
        offset: pc,
        wanted: 1,
    })?;
    let bad = || ClassFileError::BadInstruction { pc, opcode };

    let len = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        LDC => 2,
        LDC_W | 0x14 => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        TABLESWITCH => {
            let base = pc + 1 + padding(pc);
            let low = read_i32(code, base + 4).ok_or_else(bad)?;
            let high = read_i32(code, base + 8).ok_or_else(bad)?;
            if high < low {
                return Err(bad());
            }
            let entries = (high as i64 - low as i64 + 1) as usize;
            base - pc + 12 + entries * 4
        }
        LOOKUPSWITCH => {
            let base = pc + 1 + padding(pc);
            let pairs = read_i32(code, base + 4).ok_or_else(bad)?;
            if pairs < 0 {
                return Err(bad());
            }
            base - pc + 8 + pairs as usize * 8
        }
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        0xb9 | 0xba => 5,
        NEW => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | ATHROW => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        WIDE => match code.get(pc + 1).copied() {
            Some(IINC) => 6,
            Some(0x15..=0x19 | 0x36..=0x3a | 0xa9) => 4,
            _ => return Err(bad()),
        },
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        _ => return Err(bad()),
    };

    if pc + len > code.len() {
        return Err(ClassFileError::UnexpectedEof {
            offset: pc,
            wanted: len,
        });
    }
    Ok(len)
}

/// Switch operands start at the next 4-byte boundary after the opcode.
fn padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

/// Iterator over instruction boundaries. Yields one error and then stops.
pub struct Instructions<'a> {
    code: &'a [u8],
    pc: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            pc: 0,
            failed: false,
        }
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc >= self.code.len() {
            return None;
        }
        match instruction_length(self.code, self.pc) {
            Ok(len) => {
                let insn = Instruction {
                    pc: self.pc,
                    opcode: self.code[self.pc],
                    len,
                };
                self.pc += len;
                Some(Ok(insn))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundaries(code: &[u8]) -> Vec<usize> {
        Instructions::new(code)
            .map(|i| i.unwrap().pc)
            .collect()
    }

    #[test]
    fn simple_sequence() {
        // aload_0; invokespecial #1; return
        let code = [ALOAD_0, INVOKESPECIAL, 0, 1, RETURN];
        assert_eq!(boundaries(&code), vec![0, 1, 4]);
    }

    #[test]
    fn tableswitch_respects_alignment() {
        // iconst_0 at 0, tableswitch at 1 -> 2 bytes pad, low=0 high=1
        let mut code = vec![0x03, TABLESWITCH, 0, 0];
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&20i32.to_be_bytes());
        code.push(RETURN);
        assert_eq!(boundaries(&code), vec![0, 1, code.len() - 1]);
    }

    #[test]
    fn lookupswitch_and_wide() {
        let mut code = vec![LOOKUPSWITCH, 0, 0, 0];
        code.extend_from_slice(&8i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&5i32.to_be_bytes());
        code.extend_from_slice(&8i32.to_be_bytes());
        let wide_at = code.len();
        code.extend_from_slice(&[WIDE, IINC, 1, 0, 0, 1]);
        code.extend_from_slice(&[WIDE, 0x15, 1, 0]);
        code.push(RETURN);
        assert_eq!(
            boundaries(&code),
            vec![0, wide_at, wide_at + 6, wide_at + 10]
        );
    }

    #[test]
    fn truncated_operand_fails_once() {
        let code = [NEW, 0];
        let mut it = Instructions::new(&code);
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }

    #[test]
    fn reserved_opcodes_are_rejected() {
        for op in [0xcau8, 0xcb, 0xfe, 0xff] {
            assert!(matches!(
                instruction_length(&[op], 0),
                Err(ClassFileError::BadInstruction { .. })
            ));
        }
    }

    #[test]
    fn inverted_tableswitch_bounds_fail() {
        let mut code = vec![TABLESWITCH, 0, 0, 0];
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&5i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        assert!(instruction_length(&code, 0).is_err());
    }
}
