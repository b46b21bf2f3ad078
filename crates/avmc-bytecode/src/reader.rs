//! Decoding: a cursor over encoded bytes and the module parser

use crate::buffer::{MAX_U30, decode_s24};
use crate::class::{ClassInfo, InstanceInfo, ScriptInfo};
use crate::constant::{
    ConstantPool, DoubleBits, MultinameEntry, NamespaceEntry, NamespaceKind, NsSetEntry,
    multiname_kind,
};
use crate::error::{BytecodeError, Result};
use crate::method::{MethodBody, MethodInfo};
use crate::module::AbcModule;
use crate::operand::{MultinameIndex, NamespaceIndex, NsSetIndex, StringIndex};
use crate::traits::Metadata;

/// Forward-only cursor over encoded bytes
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading at the beginning of `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current offset
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Check if everything has been read
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.bytes.get(self.pos).ok_or(BytecodeError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read a little-endian u16
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(BytecodeError::UnexpectedEnd)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(BytecodeError::UnexpectedEnd)?;
        self.pos = end;
        Ok(slice)
    }

    /// Read a variable-length unsigned 32-bit integer
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut result = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            result |= u32::from(byte & 0x7F).wrapping_shl(shift);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(BytecodeError::InvalidOperand(self.pos))
    }

    /// Read a variable-length u30
    pub fn read_u30(&mut self) -> Result<u32> {
        let at = self.pos;
        let value = self.read_u32()?;
        if value > MAX_U30 {
            return Err(BytecodeError::InvalidOperand(at));
        }
        Ok(value)
    }

    /// Read a variable-length signed 32-bit integer
    pub fn read_s32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read a signed 24-bit little-endian value
    pub fn read_s24(&mut self) -> Result<i32> {
        let b = self.read_bytes(3)?;
        Ok(decode_s24([b[0], b[1], b[2]]))
    }

    /// Read a little-endian double
    pub fn read_d64(&mut self) -> Result<f64> {
        let b = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_le_bytes(raw))
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u30()? as usize;
        let at = self.pos;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| BytecodeError::InvalidOperand(at))
    }

    /// Read `count` items with `read`
    pub fn read_n<T>(
        &mut self,
        count: usize,
        mut read: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        // Each record is at least one byte; cap the reservation against garbage counts.
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(read(self)?);
        }
        Ok(items)
    }
}

/// Parser for a complete serialized module
#[derive(Debug)]
pub struct AbcReader<'a> {
    reader: ByteReader<'a>,
}

impl<'a> AbcReader<'a> {
    /// Create a parser over `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(bytes),
        }
    }

    /// Parse the whole module
    pub fn read_module(mut self) -> Result<AbcModule> {
        let minor_version = self.reader.read_u16()?;
        let major_version = self.reader.read_u16()?;
        if major_version != crate::ABC_MAJOR_VERSION {
            return Err(BytecodeError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let constants = self.read_pool()?;
        let r = &mut self.reader;

        let count = r.read_u30()? as usize;
        let methods = r.read_n(count, MethodInfo::read)?;

        let count = r.read_u30()? as usize;
        let metadata = r.read_n(count, Metadata::read)?;

        let count = r.read_u30()? as usize;
        let instances = r.read_n(count, InstanceInfo::read)?;
        let classes = r.read_n(count, ClassInfo::read)?;

        let count = r.read_u30()? as usize;
        let scripts = r.read_n(count, ScriptInfo::read)?;

        let count = r.read_u30()? as usize;
        let bodies = r.read_n(count, MethodBody::read)?;

        let module = AbcModule {
            minor_version,
            major_version,
            constants,
            methods,
            metadata,
            instances,
            classes,
            scripts,
            bodies,
        };
        module.validate()?;
        Ok(module)
    }

    fn read_pool(&mut self) -> Result<ConstantPool> {
        let r = &mut self.reader;
        let mut pool = ConstantPool::new();

        for _ in 1..r.read_u30()? {
            let value = r.read_s32()?;
            pool.ints.push(value);
        }
        for _ in 1..r.read_u30()? {
            let value = r.read_u32()?;
            pool.uints.push(value);
        }
        for _ in 1..r.read_u30()? {
            let value = r.read_d64()?;
            pool.doubles.push(DoubleBits::new(value));
        }
        for _ in 1..r.read_u30()? {
            let value = r.read_string()?;
            pool.strings.push(value);
        }
        for _ in 1..r.read_u30()? {
            let at = r.position();
            let kind = NamespaceKind::from_byte(r.read_u8()?)
                .ok_or(BytecodeError::InvalidOperand(at))?;
            let name = StringIndex(r.read_u30()?);
            pool.namespaces.push(NamespaceEntry { kind, name });
        }
        for _ in 1..r.read_u30()? {
            let count = r.read_u30()? as usize;
            let members = r.read_n(count, |r| Ok(NamespaceIndex(r.read_u30()?)))?;
            pool.ns_sets.push(NsSetEntry(members));
        }
        for _ in 1..r.read_u30()? {
            let entry = read_multiname(r)?;
            pool.multinames.push(entry);
        }
        Ok(pool)
    }
}

fn read_multiname(r: &mut ByteReader<'_>) -> Result<MultinameEntry> {
    use multiname_kind::*;
    let at = r.position();
    let kind = r.read_u8()?;
    let entry = match kind {
        QNAME | QNAME_A => MultinameEntry::QName {
            ns: NamespaceIndex(r.read_u30()?),
            name: StringIndex(r.read_u30()?),
            attribute: kind == QNAME_A,
        },
        RTQNAME | RTQNAME_A => MultinameEntry::RtqName {
            name: StringIndex(r.read_u30()?),
            attribute: kind == RTQNAME_A,
        },
        RTQNAME_L | RTQNAME_LA => MultinameEntry::RtqNameL {
            attribute: kind == RTQNAME_LA,
        },
        MULTINAME | MULTINAME_A => MultinameEntry::Multiname {
            name: StringIndex(r.read_u30()?),
            ns_set: NsSetIndex(r.read_u30()?),
            attribute: kind == MULTINAME_A,
        },
        MULTINAME_L | MULTINAME_LA => MultinameEntry::MultinameL {
            ns_set: NsSetIndex(r.read_u30()?),
            attribute: kind == MULTINAME_LA,
        },
        TYPENAME => {
            let base = MultinameIndex(r.read_u30()?);
            let count = r.read_u30()? as usize;
            let params = r.read_n(count, |r| Ok(MultinameIndex(r.read_u30()?)))?;
            MultinameEntry::TypeName { base, params }
        }
        _ => return Err(BytecodeError::InvalidOperand(at)),
    };
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32_varint() {
        let mut r = ByteReader::new(&[0x80, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(r.read_u32().unwrap(), 128);
        assert_eq!(r.read_u32().unwrap(), u32::MAX);
        assert!(r.is_empty());
    }

    #[test]
    fn test_read_s32_negative() {
        let mut r = ByteReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(r.read_s32().unwrap(), -1);
    }

    #[test]
    fn test_u30_rejects_large_values() {
        let mut r = ByteReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert!(matches!(r.read_u30(), Err(BytecodeError::InvalidOperand(0))));
    }

    #[test]
    fn test_unexpected_end() {
        let mut r = ByteReader::new(&[0x80]);
        assert!(matches!(r.read_u32(), Err(BytecodeError::UnexpectedEnd)));
        let mut r = ByteReader::new(&[1, 2]);
        assert!(matches!(r.read_s24(), Err(BytecodeError::UnexpectedEnd)));
    }

    #[test]
    fn test_read_string() {
        let mut r = ByteReader::new(&[2, b'h', b'i']);
        assert_eq!(r.read_string().unwrap(), "hi");
    }

    #[test]
    fn test_bad_version() {
        let bytes = [16, 0, 45, 0];
        assert!(matches!(
            AbcReader::new(&bytes).read_module(),
            Err(BytecodeError::UnsupportedVersion { major: 45, minor: 16 })
        ));
    }
}
