//! Minimal JVM class-file model.
//!
//! Only the parts the rewriter touches are decoded: the constant pool,
//! members, and the `Code` attribute with its exception table and nested
//! attributes. Everything else is carried as raw bytes, so an unmodified
//! [`ClassFile`] serializes back to exactly the bytes it was parsed from.

mod code;
mod constant_pool;
pub mod instructions;
mod member;
pub mod mutf8;
mod reader;

pub use code::{CodeAttribute, ExceptionTableEntry};
pub use constant_pool::{Constant, ConstantPool};
pub use instructions::{Instruction, Instructions};
pub use member::{Attribute, MemberInfo};
pub use reader::{ByteReader, PutBe};

use thiserror::Error;

/// `0xCAFEBABE`.
pub const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_NATIVE: u16 = 0x0100;

/// Largest legal `code_length`.
pub const MAX_CODE_LENGTH: usize = 65_535;

/// Errors raised while decoding or re-encoding a class file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassFileError {
    #[error("unexpected end of input at offset {offset} (wanted {wanted} bytes)")]
    UnexpectedEof { offset: usize, wanted: usize },

    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),

    #[error("unknown constant pool tag {tag} at index {index}")]
    BadConstantTag { index: u16, tag: u8 },

    #[error("constant pool index {index} is not a {expected}")]
    BadConstantIndex { index: u16, expected: &'static str },

    #[error("constant pool is full")]
    ConstantPoolOverflow,

    #[error("{0} trailing bytes after class file")]
    TrailingBytes(usize),

    #[error("bad instruction 0x{opcode:02x} at pc {pc}")]
    BadInstruction { pc: usize, opcode: u8 },

    #[error("malformed {attribute} attribute: {reason}")]
    MalformedAttribute {
        attribute: &'static str,
        reason: String,
    },

    #[error("invalid modified UTF-8 in constant pool entry {0}")]
    BadUtf8(u16),

    #[error("{0} exceeds its class-file limit")]
    TooLarge(&'static str),
}

pub type Result<T> = std::result::Result<T, ClassFileError>;

/// A parsed class file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let constant_pool = ConstantPool::parse(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;

        let interface_count = r.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(r.u16()?);
        }

        let fields = MemberInfo::parse_all(&mut r)?;
        let methods = MemberInfo::parse_all(&mut r)?;
        let attributes = Attribute::parse_all(&mut r)?;

        if !r.is_empty() {
            return Err(ClassFileError::TrailingBytes(r.remaining()));
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(1024);
        out.put_u32(MAGIC);
        out.put_u16(self.minor_version);
        out.put_u16(self.major_version);
        self.constant_pool.write(&mut out)?;
        out.put_u16(self.access_flags);
        out.put_u16(self.this_class);
        out.put_u16(self.super_class);
        out.put_u16(count_u16(self.interfaces.len(), "interfaces")?);
        for interface in &self.interfaces {
            out.put_u16(*interface);
        }
        MemberInfo::write_all(&self.fields, &mut out, "fields")?;
        MemberInfo::write_all(&self.methods, &mut out, "methods")?;
        Attribute::write_all(&self.attributes, &mut out)?;
        Ok(out)
    }

    /// Internal name of this class, from `this_class`.
    pub fn name(&self) -> Result<String> {
        self.constant_pool.class_name(self.this_class)
    }
}

pub(crate) fn count_u16(len: usize, what: &'static str) -> Result<u16> {
    u16::try_from(len).map_err(|_| ClassFileError::TooLarge(what))
}

pub(crate) fn len_u32(len: usize, what: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| ClassFileError::TooLarge(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ClassBuilder;

    #[test]
    fn unmodified_class_round_trips_exactly() {
        let bytes = ClassBuilder::new("com/acme/Repo")
            .method("load", "()V", &["java/io/IOException"], |asm| {
                asm.return_void();
            })
            .abstract_method("save", "(Ljava/lang/String;)V")
            .build();
        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.name().unwrap(), "com/acme/Repo");
        assert_eq!(parsed.methods.len(), 2);
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = ClassFile::parse(&[0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 52]).unwrap_err();
        assert_eq!(err, ClassFileError::BadMagic(0xDEAD_BEEF));
    }

    #[test]
    fn truncated_input_is_an_error_not_a_panic() {
        let bytes = ClassBuilder::new("com/acme/Repo").build();
        for cut in 0..bytes.len() {
            assert!(ClassFile::parse(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = ClassBuilder::new("com/acme/Repo").build();
        bytes.push(0);
        assert_eq!(
            ClassFile::parse(&bytes).unwrap_err(),
            ClassFileError::TrailingBytes(1)
        );
    }
}
