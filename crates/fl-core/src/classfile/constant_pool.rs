//! The constant pool: decoding, lookups, and append-only interning.

use super::{mutf8, ByteReader, ClassFileError, PutBe, Result};

/// One constant pool entry.
///
/// `Utf8` keeps its raw modified-UTF-8 bytes so that untouched entries
/// serialize back byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref { class: u16, name_and_type: u16 },
    Methodref { class: u16, name_and_type: u16 },
    InterfaceMethodref { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
    /// Index 0, and the slot after a `Long` or `Double`.
    Unusable,
}

impl Constant {
    fn tag(&self) -> Option<u8> {
        Some(match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::Fieldref { .. } => 9,
            Constant::Methodref { .. } => 10,
            Constant::InterfaceMethodref { .. } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType(_) => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module(_) => 19,
            Constant::Package(_) => 20,
            Constant::Unusable => return None,
        })
    }

    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn parse(r: &mut ByteReader<'_>) -> Result<Self> {
        let count = r.u16()?;
        if count == 0 {
            return Err(ClassFileError::BadConstantIndex {
                index: 0,
                expected: "constant_pool_count of at least 1",
            });
        }
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        let mut index: u16 = 1;
        while index < count {
            let tag = r.u8()?;
            let constant = match tag {
                1 => {
                    let len = r.u16()? as usize;
                    Constant::Utf8(r.bytes(len)?.to_vec())
                }
                3 => Constant::Integer(r.u32()?),
                4 => Constant::Float(r.u32()?),
                5 => Constant::Long(r.u64()?),
                6 => Constant::Double(r.u64()?),
                7 => Constant::Class(r.u16()?),
                8 => Constant::String(r.u16()?),
                9 => Constant::Fieldref {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                10 => Constant::Methodref {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                11 => Constant::InterfaceMethodref {
                    class: r.u16()?,
                    name_and_type: r.u16()?,
                },
                12 => Constant::NameAndType {
                    name: r.u16()?,
                    descriptor: r.u16()?,
                },
                15 => Constant::MethodHandle {
                    kind: r.u8()?,
                    reference: r.u16()?,
                },
                16 => Constant::MethodType(r.u16()?),
                17 => Constant::Dynamic {
                    bootstrap: r.u16()?,
                    name_and_type: r.u16()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap: r.u16()?,
                    name_and_type: r.u16()?,
                },
                19 => Constant::Module(r.u16()?),
                20 => Constant::Package(r.u16()?),
                tag => return Err(ClassFileError::BadConstantTag { index, tag }),
            };

            let wide = constant.is_wide();
            entries.push(constant);
            index += 1;
            if wide {
                if index >= count {
                    return Err(ClassFileError::BadConstantIndex {
                        index,
                        expected: "slot after a long or double",
                    });
                }
                entries.push(Constant::Unusable);
                index += 1;
            }
        }

        Ok(Self { entries })
    }

    pub(super) fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        out.put_u16(super::count_u16(self.entries.len(), "constant pool")?);
        for constant in &self.entries {
            let Some(tag) = constant.tag() else { continue };
            out.put_u8(tag);
            match constant {
                Constant::Utf8(bytes) => {
                    out.put_u16(super::count_u16(bytes.len(), "utf8 constant")?);
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(v) | Constant::Float(v) => out.put_u32(*v),
                Constant::Long(v) | Constant::Double(v) => out.put_u64(*v),
                Constant::Class(i)
                | Constant::String(i)
                | Constant::MethodType(i)
                | Constant::Module(i)
                | Constant::Package(i) => out.put_u16(*i),
                Constant::Fieldref { class, name_and_type }
                | Constant::Methodref { class, name_and_type }
                | Constant::InterfaceMethodref { class, name_and_type } => {
                    out.put_u16(*class);
                    out.put_u16(*name_and_type);
                }
                Constant::NameAndType { name, descriptor } => {
                    out.put_u16(*name);
                    out.put_u16(*descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    out.put_u8(*kind);
                    out.put_u16(*reference);
                }
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                }
                | Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    out.put_u16(*bootstrap);
                    out.put_u16(*name_and_type);
                }
                Constant::Unusable => {}
            }
        }
        Ok(())
    }

    /// The `constant_pool_count` value: one more than the highest index.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize)
    }

    pub fn utf8(&self, index: u16) -> Result<String> {
        match self.get(index) {
            Some(Constant::Utf8(bytes)) => {
                mutf8::decode(bytes).ok_or(ClassFileError::BadUtf8(index))
            }
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Internal name behind a `Class` entry.
    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "Class",
            }),
        }
    }

    /// `(name, descriptor)` behind a `NameAndType` entry.
    pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.get(index) {
            Some(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// `(owner, name, descriptor)` behind a method reference.
    pub fn method_ref(&self, index: u16) -> Result<(String, String, String)> {
        match self.get(index) {
            Some(Constant::Methodref {
                class,
                name_and_type,
            })
            | Some(Constant::InterfaceMethodref {
                class,
                name_and_type,
            }) => {
                let owner = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((owner, name, descriptor))
            }
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "Methodref",
            }),
        }
    }

    fn push(&mut self, constant: Constant) -> Result<u16> {
        // Indices are u16 and the count itself must fit in a u16.
        if self.entries.len() >= u16::MAX as usize {
            return Err(ClassFileError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        self.entries.push(constant);
        Ok(index)
    }

    fn find(&self, wanted: &Constant) -> Option<u16> {
        self.entries
            .iter()
            .position(|c| c == wanted)
            .map(|i| i as u16)
    }

    fn intern(&mut self, constant: Constant) -> Result<u16> {
        match self.find(&constant) {
            Some(index) => Ok(index),
            None => self.push(constant),
        }
    }

    pub fn intern_utf8(&mut self, value: &str) -> Result<u16> {
        self.intern(Constant::Utf8(mutf8::encode(value)))
    }

    pub fn intern_class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.intern_utf8(internal_name)?;
        self.intern(Constant::Class(name))
    }

    pub fn intern_string(&mut self, value: &str) -> Result<u16> {
        let utf8 = self.intern_utf8(value)?;
        self.intern(Constant::String(utf8))
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    pub fn intern_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.intern_class(owner)?;
        let name_and_type = self.intern_name_and_type(name, descriptor)?;
        self.intern(Constant::Methodref {
            class,
            name_and_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_reuses_existing_entries() {
        let mut pool = ConstantPool::new();
        let a = pool.intern_string("com.acme.Repo.load").unwrap();
        let b = pool.intern_string("com.acme.Repo.load").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.count(), 3);
    }

    #[test]
    fn method_ref_resolves_through_indirections() {
        let mut pool = ConstantPool::new();
        let index = pool
            .intern_method_ref("com/acme/Err", "<init>", "()V")
            .unwrap();
        let (owner, name, desc) = pool.method_ref(index).unwrap();
        assert_eq!(owner, "com/acme/Err");
        assert_eq!(name, "<init>");
        assert_eq!(desc, "()V");
    }

    #[test]
    fn wrong_kind_of_entry_is_an_error() {
        let mut pool = ConstantPool::new();
        let utf8 = pool.intern_utf8("x").unwrap();
        assert!(pool.class_name(utf8).is_err());
        assert!(pool.utf8(0).is_err());
        assert!(pool.utf8(99).is_err());
    }

    #[test]
    fn long_takes_two_slots() {
        let mut bytes = Vec::new();
        bytes.put_u16(4);
        bytes.put_u8(5);
        bytes.put_u64(7);
        bytes.put_u8(1);
        bytes.put_u16(1);
        bytes.push(b'x');
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(pool.get(2), Some(&Constant::Unusable));
        assert_eq!(pool.utf8(3).unwrap(), "x");

        let mut out = Vec::new();
        pool.write(&mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn overflow_is_reported() {
        let mut pool = ConstantPool::new();
        for i in 0..(u16::MAX as usize - 1) {
            pool.entries.push(Constant::Integer(i as u32));
        }
        assert_eq!(
            pool.intern_utf8("one too many").unwrap_err(),
            ClassFileError::ConstantPoolOverflow
        );
    }
}
