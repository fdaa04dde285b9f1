//! Fields, methods, and raw attributes.

use super::{len_u32, ByteReader, CodeAttribute, ConstantPool, PutBe, Result};
use super::{ACC_ABSTRACT, ACC_NATIVE};

/// An attribute kept as its undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Attribute {
    pub(super) fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        let name_index = r.u16()?;
        let len = r.u32()? as usize;
        let info = r.bytes(len)?.to_vec();
        Ok(Self { name_index, info })
    }

    pub(super) fn parse_all(r: &mut ByteReader<'_>) -> Result<Vec<Self>> {
        let count = r.u16()?;
        (0..count).map(|_| Self::parse(r)).collect()
    }

    pub(super) fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.put_u16(self.name_index);
        out.put_u32(len_u32(self.info.len(), "attribute")?);
        out.extend_from_slice(&self.info);
        Ok(())
    }

    pub(super) fn write_all(attrs: &[Self], out: &mut Vec<u8>) -> Result<()> {
        out.put_u16(super::count_u16(attrs.len(), "attributes")?);
        for attr in attrs {
            attr.write(out)?;
        }
        Ok(())
    }

    /// Whether this attribute's name is `name`. Malformed names never match.
    pub fn is_named(&self, pool: &ConstantPool, name: &str) -> bool {
        pool.utf8(self.name_index).is_ok_and(|n| n == name)
    }
}

/// A `field_info` or `method_info` structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    pub(super) fn parse_all(r: &mut ByteReader<'_>) -> Result<Vec<Self>> {
        let count = r.u16()?;
        (0..count)
            .map(|_| {
                Ok(Self {
                    access_flags: r.u16()?,
                    name_index: r.u16()?,
                    descriptor_index: r.u16()?,
                    attributes: Attribute::parse_all(r)?,
                })
            })
            .collect()
    }

    pub(super) fn write_all(members: &[Self], out: &mut Vec<u8>, what: &'static str) -> Result<()> {
        out.put_u16(super::count_u16(members.len(), what)?);
        for member in members {
            out.put_u16(member.access_flags);
            out.put_u16(member.name_index);
            out.put_u16(member.descriptor_index);
            Attribute::write_all(&member.attributes, out)?;
        }
        Ok(())
    }

    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.descriptor_index)
    }

    pub fn is_abstract_or_native(&self) -> bool {
        self.access_flags & (ACC_ABSTRACT | ACC_NATIVE) != 0
    }

    /// Position of the first attribute called `name`.
    pub fn attribute_position(&self, pool: &ConstantPool, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.is_named(pool, name))
    }

    /// Decode the `Code` attribute, if the method has one.
    pub fn code(&self, pool: &ConstantPool) -> Result<Option<(usize, CodeAttribute)>> {
        match self.attribute_position(pool, "Code") {
            Some(pos) => Ok(Some((pos, CodeAttribute::parse(&self.attributes[pos].info)?))),
            None => Ok(None),
        }
    }

    /// Internal names listed in the `Exceptions` attribute, in declaration order.
    pub fn declared_exceptions(&self, pool: &ConstantPool) -> Result<Vec<String>> {
        let Some(pos) = self.attribute_position(pool, "Exceptions") else {
            return Ok(Vec::new());
        };
        let mut r = ByteReader::new(&self.attributes[pos].info);
        let count = r.u16()?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            names.push(pool.class_name(r.u16()?)?);
        }
        Ok(names)
    }
}
