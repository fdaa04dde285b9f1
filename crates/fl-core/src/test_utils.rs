//! Test utilities for fl-core.
//!
//! This module provides:
//! - `ClassBuilder`/`Asm` for assembling small, valid class files by hand
//! - `FixedRolls`, an RNG that replays scripted injection rolls
//! - Helpers for reading back what the rewriter did to a method

use crate::classfile::instructions::opcodes::*;
use crate::classfile::{
    Attribute, ClassFile, CodeAttribute, ConstantPool, ExceptionTableEntry, MemberInfo, PutBe,
    ACC_ABSTRACT,
};
use rand::RngCore;

// ============================================================================
// Macros
// ============================================================================

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

// ============================================================================
// Class assembly
// ============================================================================

const ACC_PUBLIC: u16 = 0x0001;
const ACC_SUPER: u16 = 0x0020;

/// Builds a class file with a real constant pool.
pub struct ClassBuilder {
    pool: ConstantPool,
    this_class: u16,
    super_class: u16,
    major_version: u16,
    methods: Vec<MemberInfo>,
}

impl ClassBuilder {
    /// A public class extending `java/lang/Object`, class-file version 52.
    pub fn new(internal_name: &str) -> Self {
        let mut pool = ConstantPool::new();
        let this_class = pool.intern_class(internal_name).unwrap();
        let super_class = pool.intern_class("java/lang/Object").unwrap();
        Self {
            pool,
            this_class,
            super_class,
            major_version: 52,
            methods: Vec::new(),
        }
    }

    pub fn major_version(mut self, major: u16) -> Self {
        self.major_version = major;
        self
    }

    /// Add a concrete method. `throws` fills the `Exceptions` attribute.
    pub fn method(
        mut self,
        name: &str,
        descriptor: &str,
        throws: &[&str],
        body: impl FnOnce(&mut Asm<'_>),
    ) -> Self {
        let mut asm = Asm::new(&mut self.pool);
        body(&mut asm);
        let code = asm.finish();
        let code_name = self.pool.intern_utf8("Code").unwrap();
        let mut attributes = vec![Attribute {
            name_index: code_name,
            info: code,
        }];
        if let Some(exceptions) = self.exceptions_attribute(throws) {
            attributes.push(exceptions);
        }
        self.push_method(ACC_PUBLIC, name, descriptor, attributes);
        self
    }

    /// Add an abstract method (no `Code` attribute).
    pub fn abstract_method(mut self, name: &str, descriptor: &str) -> Self {
        self.push_method(ACC_PUBLIC | ACC_ABSTRACT, name, descriptor, Vec::new());
        self
    }

    /// Add an abstract method that still declares exceptions.
    pub fn abstract_method_throwing(mut self, name: &str, descriptor: &str, throws: &[&str]) -> Self {
        let attributes = self.exceptions_attribute(throws).into_iter().collect();
        self.push_method(ACC_PUBLIC | ACC_ABSTRACT, name, descriptor, attributes);
        self
    }

    fn exceptions_attribute(&mut self, throws: &[&str]) -> Option<Attribute> {
        if throws.is_empty() {
            return None;
        }
        let name_index = self.pool.intern_utf8("Exceptions").unwrap();
        let mut info = Vec::new();
        info.put_u16(throws.len() as u16);
        for class in throws {
            info.put_u16(self.pool.intern_class(class).unwrap());
        }
        Some(Attribute { name_index, info })
    }

    fn push_method(&mut self, access: u16, name: &str, descriptor: &str, attributes: Vec<Attribute>) {
        let name_index = self.pool.intern_utf8(name).unwrap();
        let descriptor_index = self.pool.intern_utf8(descriptor).unwrap();
        self.methods.push(MemberInfo {
            access_flags: access,
            name_index,
            descriptor_index,
            attributes,
        });
    }

    pub fn build_class(self) -> ClassFile {
        ClassFile {
            minor_version: 0,
            major_version: self.major_version,
            constant_pool: self.pool,
            access_flags: ACC_PUBLIC | ACC_SUPER,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: self.methods,
            attributes: Vec::new(),
        }
    }

    pub fn build(self) -> Vec<u8> {
        self.build_class().to_bytes().unwrap()
    }
}

/// A tiny bytecode assembler bound to the class's constant pool.
pub struct Asm<'p> {
    pool: &'p mut ConstantPool,
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    exception_table: Vec<ExceptionTableEntry>,
    attributes: Vec<(String, Vec<u8>)>,
}

impl<'p> Asm<'p> {
    fn new(pool: &'p mut ConstantPool) -> Self {
        Self {
            pool,
            code: Vec::new(),
            max_stack: 2,
            max_locals: 1,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn pc(&self) -> u16 {
        self.code.len() as u16
    }

    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.code.push(opcode);
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        self.op(NOP)
    }

    pub fn return_void(&mut self) -> &mut Self {
        self.op(RETURN)
    }

    pub fn aload_0(&mut self) -> &mut Self {
        self.op(ALOAD_0)
    }

    pub fn dup(&mut self) -> &mut Self {
        self.op(DUP)
    }

    pub fn athrow(&mut self) -> &mut Self {
        self.op(ATHROW)
    }

    /// `iconst_<n>` for n in 0..=5.
    pub fn iconst(&mut self, n: u8) -> &mut Self {
        assert!(n <= 5);
        self.op(0x03 + n)
    }

    pub fn ireturn(&mut self) -> &mut Self {
        self.op(IRETURN)
    }

    pub fn ldc_string(&mut self, value: &str) -> &mut Self {
        let index = self.pool.intern_string(value).unwrap();
        self.op(LDC_W);
        self.code.put_u16(index);
        self
    }

    pub fn new_object(&mut self, class: &str) -> &mut Self {
        let index = self.pool.intern_class(class).unwrap();
        self.op(NEW);
        self.code.put_u16(index);
        self
    }

    pub fn invokespecial(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.intern_method_ref(owner, name, descriptor).unwrap();
        self.op(INVOKESPECIAL);
        self.code.put_u16(index);
        self
    }

    pub fn invokestatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.intern_method_ref(owner, name, descriptor).unwrap();
        self.op(INVOKESTATIC);
        self.code.put_u16(index);
        self
    }

    /// `new C; dup; invokespecial C.<init>()V; athrow`
    pub fn throw_new(&mut self, class: &str) -> &mut Self {
        self.new_object(class)
            .dup()
            .invokespecial(class, "<init>", "()V")
            .athrow()
    }

    /// Branch with a relative offset from this instruction.
    pub fn ifeq(&mut self, offset: i16) -> &mut Self {
        self.op(IFEQ);
        self.code.put_u16(offset as u16);
        self
    }

    pub fn goto(&mut self, offset: i16) -> &mut Self {
        self.op(GOTO);
        self.code.put_u16(offset as u16);
        self
    }

    /// `tableswitch` with offsets relative to the switch opcode.
    pub fn tableswitch(&mut self, default: i32, low: i32, targets: &[i32]) -> &mut Self {
        let at = self.code.len();
        self.op(TABLESWITCH);
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
        debug_assert!(self.code.len() - at <= 4);
        self.code.put_u32(default as u32);
        self.code.put_u32(low as u32);
        self.code.put_u32((low + targets.len() as i32 - 1) as u32);
        for target in targets {
            self.code.put_u32(*target as u32);
        }
        self
    }

    pub fn catch(&mut self, start: u16, end: u16, handler: u16, class: Option<&str>) -> &mut Self {
        let catch_type = class.map_or(0, |c| self.pool.intern_class(c).unwrap());
        self.exception_table.push(ExceptionTableEntry {
            start_pc: start,
            end_pc: end,
            handler_pc: handler,
            catch_type,
        });
        self
    }

    /// Attach a raw nested attribute to the `Code` attribute.
    pub fn attribute(&mut self, name: &str, info: Vec<u8>) -> &mut Self {
        self.attributes.push((name.to_string(), info));
        self
    }

    pub fn line_numbers(&mut self, entries: &[(u16, u16)]) -> &mut Self {
        let mut info = Vec::new();
        info.put_u16(entries.len() as u16);
        for (pc, line) in entries {
            info.put_u16(*pc);
            info.put_u16(*line);
        }
        self.attribute("LineNumberTable", info)
    }

    /// `(start_pc, length, name, descriptor, slot)` entries.
    pub fn local_variables(&mut self, entries: &[(u16, u16, &str, &str, u16)]) -> &mut Self {
        let mut info = Vec::new();
        info.put_u16(entries.len() as u16);
        for (start, len, name, desc, slot) in entries {
            info.put_u16(*start);
            info.put_u16(*len);
            info.put_u16(self.pool.intern_utf8(name).unwrap());
            info.put_u16(self.pool.intern_utf8(desc).unwrap());
            info.put_u16(*slot);
        }
        self.attribute("LocalVariableTable", info)
    }

    /// A `StackMapTable` from pre-encoded frames.
    pub fn stack_map(&mut self, frames: &[&[u8]]) -> &mut Self {
        let mut info = Vec::new();
        info.put_u16(frames.len() as u16);
        for frame in frames {
            info.extend_from_slice(frame);
        }
        self.attribute("StackMapTable", info)
    }

    fn finish(self) -> Vec<u8> {
        let attributes = self
            .attributes
            .into_iter()
            .map(|(name, info)| Attribute {
                name_index: self.pool.intern_utf8(&name).unwrap(),
                info,
            })
            .collect();
        CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code: self.code,
            exception_table: self.exception_table,
            attributes,
        }
        .to_bytes()
        .unwrap()
    }
}

// ============================================================================
// Inspection
// ============================================================================

/// Decoded `Code` of the first method called `name`.
pub fn method_code(class: &ClassFile, name: &str) -> CodeAttribute {
    let pool = &class.constant_pool;
    let method = class
        .methods
        .iter()
        .find(|m| m.name(pool).unwrap() == name)
        .unwrap_or_else(|| panic!("no method {name}"));
    method.code(pool).unwrap().expect("method has code").1
}

/// Payload of the nested `Code` attribute called `name`.
pub fn nested_attribute(class: &ClassFile, code: &CodeAttribute, name: &str) -> Vec<u8> {
    code.attributes
        .iter()
        .find(|a| a.is_named(&class.constant_pool, name))
        .unwrap_or_else(|| panic!("no {name} attribute"))
        .info
        .clone()
}

// ============================================================================
// Deterministic rolls
// ============================================================================

/// Replays scripted `f64` rolls through `Rng::random::<f64>()`, cycling.
///
/// Each roll must be a multiple of 2^-53 in [0, 1), which every short
/// decimal like `0.25` or `0.75` is.
pub struct FixedRolls {
    rolls: Vec<f64>,
    next: usize,
}

impl FixedRolls {
    pub fn new(rolls: &[f64]) -> Self {
        assert!(!rolls.is_empty());
        assert!(rolls.iter().all(|r| (0.0..1.0).contains(r)));
        Self {
            rolls: rolls.to_vec(),
            next: 0,
        }
    }
}

impl RngCore for FixedRolls {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let roll = self.rolls[self.next % self.rolls.len()];
        self.next += 1;
        ((roll * (1u64 << 53) as f64) as u64) << 11
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}
