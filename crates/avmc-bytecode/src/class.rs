//! Class, instance and script records

use bitflags::bitflags;
use serde::Serialize;

use crate::buffer::ByteBuffer;
use crate::error::Result;
use crate::operand::{MethodIndex, MultinameIndex, NamespaceIndex};
use crate::reader::ByteReader;
use crate::traits::Trait;

bitflags! {
    /// Instance-info flag byte
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
    #[serde(transparent)]
    pub struct InstanceFlags: u8 {
        /// Instances cannot gain dynamic properties
        const SEALED = 0x01;
        /// Class cannot be subclassed
        const FINAL = 0x02;
        /// Definition is an interface
        const INTERFACE = 0x04;
        /// A protected namespace follows
        const PROTECTED_NS = 0x08;
        /// Type excludes `null`
        const NON_NULLABLE = 0x10;
    }
}

/// Instance side of a class: instance traits, base class and constructor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstanceInfo {
    /// Class name
    pub name: MultinameIndex,
    /// Base class (0 for none)
    pub super_name: MultinameIndex,
    /// Flags; `PROTECTED_NS` is derived from `protected_ns`
    pub flags: InstanceFlags,
    /// Protected namespace
    pub protected_ns: Option<NamespaceIndex>,
    /// Implemented interfaces
    pub interfaces: Vec<MultinameIndex>,
    /// Instance initializer (constructor)
    pub iinit: MethodIndex,
    /// Instance traits
    pub traits: Vec<Trait>,
}

impl InstanceInfo {
    /// Append the encoded record
    pub fn write(&self, out: &mut ByteBuffer) -> Result<()> {
        out.write_u30(self.name.0)?;
        out.write_u30(self.super_name.0)?;
        let mut flags = self.flags;
        flags.set(InstanceFlags::PROTECTED_NS, self.protected_ns.is_some());
        out.write_u8(flags.bits());
        if let Some(ns) = self.protected_ns {
            out.write_u30(ns.0)?;
        }
        out.write_count("interface count", self.interfaces.len())?;
        for interface in &self.interfaces {
            out.write_u30(interface.0)?;
        }
        out.write_u30(self.iinit.0)?;
        Trait::write_all(&self.traits, out)
    }

    /// Parse a record
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let name = MultinameIndex(reader.read_u30()?);
        let super_name = MultinameIndex(reader.read_u30()?);
        let mut flags = InstanceFlags::from_bits_retain(reader.read_u8()?);
        let protected_ns = if flags.contains(InstanceFlags::PROTECTED_NS) {
            Some(NamespaceIndex(reader.read_u30()?))
        } else {
            None
        };
        flags.set(InstanceFlags::PROTECTED_NS, false);
        let count = reader.read_u30()? as usize;
        let interfaces = reader.read_n(count, |r| Ok(MultinameIndex(r.read_u30()?)))?;
        let iinit = MethodIndex(reader.read_u30()?);
        let traits = Trait::read_all(reader)?;
        Ok(Self {
            name,
            super_name,
            flags,
            protected_ns,
            interfaces,
            iinit,
            traits,
        })
    }
}

/// Static side of a class
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassInfo {
    /// Static initializer
    pub cinit: MethodIndex,
    /// Static traits
    pub traits: Vec<Trait>,
}

impl ClassInfo {
    /// Append the encoded record
    pub fn write(&self, out: &mut ByteBuffer) -> Result<()> {
        out.write_u30(self.cinit.0)?;
        Trait::write_all(&self.traits, out)
    }

    /// Parse a record
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let cinit = MethodIndex(reader.read_u30()?);
        let traits = Trait::read_all(reader)?;
        Ok(Self { cinit, traits })
    }
}

/// Top-level compilation unit: its global traits and initializer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScriptInfo {
    /// Script initializer
    pub init: MethodIndex,
    /// Global traits
    pub traits: Vec<Trait>,
}

impl ScriptInfo {
    /// Append the encoded record
    pub fn write(&self, out: &mut ByteBuffer) -> Result<()> {
        out.write_u30(self.init.0)?;
        Trait::write_all(&self.traits, out)
    }

    /// Parse a record
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let init = MethodIndex(reader.read_u30()?);
        let traits = Trait::read_all(reader)?;
        Ok(Self { init, traits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TraitData;
    use crate::operand::ClassIndex;

    #[test]
    fn test_protected_ns_flag_derived() {
        let info = InstanceInfo {
            name: MultinameIndex(1),
            super_name: MultinameIndex(2),
            flags: InstanceFlags::SEALED,
            protected_ns: Some(NamespaceIndex(3)),
            interfaces: vec![MultinameIndex(4)],
            iinit: MethodIndex(5),
            traits: Vec::new(),
        };
        let mut out = ByteBuffer::new();
        info.write(&mut out).unwrap();
        assert_eq!(out.as_slice(), &[1, 2, 0x09, 3, 1, 4, 5, 0]);

        let mut reader = ByteReader::new(out.as_slice());
        assert_eq!(InstanceInfo::read(&mut reader).unwrap(), info);
    }

    #[test]
    fn test_script_with_class_trait() {
        let script = ScriptInfo {
            init: MethodIndex(2),
            traits: vec![Trait::new(
                MultinameIndex(1),
                TraitData::Class {
                    slot_id: 1,
                    class: ClassIndex(0),
                },
            )],
        };
        let mut out = ByteBuffer::new();
        script.write(&mut out).unwrap();
        assert_eq!(out.as_slice(), &[2, 1, 1, 0x04, 1, 0]);
        let mut reader = ByteReader::new(out.as_slice());
        assert_eq!(ScriptInfo::read(&mut reader).unwrap(), script);
    }
}
