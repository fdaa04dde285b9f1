//! The `Code` attribute.

use super::{count_u16, len_u32, Attribute, ByteReader, ClassFileError, PutBe, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero for a catch-all (`finally`) handler.
    pub catch_type: u16,
}

/// Decoded `Code` attribute payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Nested attributes (LineNumberTable, StackMapTable, ...).
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(info);
        let max_stack = r.u16()?;
        let max_locals = r.u16()?;
        let code_len = r.u32()? as usize;
        if code_len == 0 || code_len > super::MAX_CODE_LENGTH {
            return Err(ClassFileError::MalformedAttribute {
                attribute: "Code",
                reason: format!("code_length {code_len} out of range"),
            });
        }
        let code = r.bytes(code_len)?.to_vec();

        let table_len = r.u16()?;
        let mut exception_table = Vec::with_capacity(table_len as usize);
        for _ in 0..table_len {
            exception_table.push(ExceptionTableEntry {
                start_pc: r.u16()?,
                end_pc: r.u16()?,
                handler_pc: r.u16()?,
                catch_type: r.u16()?,
            });
        }
        let attributes = Attribute::parse_all(&mut r)?;
        if !r.is_empty() {
            return Err(ClassFileError::MalformedAttribute {
                attribute: "Code",
                reason: format!("{} trailing bytes", r.remaining()),
            });
        }

        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.code.len() + 32);
        out.put_u16(self.max_stack);
        out.put_u16(self.max_locals);
        out.put_u32(len_u32(self.code.len(), "code")?);
        out.extend_from_slice(&self.code);
        out.put_u16(count_u16(self.exception_table.len(), "exception table")?);
        for entry in &self.exception_table {
            out.put_u16(entry.start_pc);
            out.put_u16(entry.end_pc);
            out.put_u16(entry.handler_pc);
            out.put_u16(entry.catch_type);
        }
        Attribute::write_all(&self.attributes, &mut out)?;
        Ok(out)
    }
}
