//! Trait and metadata records

use bitflags::bitflags;
use serde::Serialize;

use crate::buffer::ByteBuffer;
use crate::error::{BytecodeError, Result};
use crate::method::{DefaultValue, ValueKind, read_default_value};
use crate::operand::{ClassIndex, MetadataIndex, MethodIndex, MultinameIndex, StringIndex};
use crate::reader::ByteReader;

bitflags! {
    /// Trait attribute nibble
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
    #[serde(transparent)]
    pub struct TraitAttributes: u8 {
        /// Cannot be overridden
        const FINAL = 0x01;
        /// Overrides an inherited member
        const OVERRIDE = 0x02;
        /// Metadata indices follow
        const METADATA = 0x04;
    }
}

/// Trait kinds as encoded in the low nibble of the kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum TraitKind {
    /// Variable slot
    Slot = 0,
    /// Method
    Method = 1,
    /// Getter
    Getter = 2,
    /// Setter
    Setter = 3,
    /// Class binding
    Class = 4,
    /// Function closure binding
    Function = 5,
    /// Constant slot
    Const = 6,
}

impl TraitKind {
    /// Decode the low nibble
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        Some(match nibble {
            0 => Self::Slot,
            1 => Self::Method,
            2 => Self::Getter,
            3 => Self::Setter,
            4 => Self::Class,
            5 => Self::Function,
            6 => Self::Const,
            _ => return None,
        })
    }
}

/// Kind-specific trait payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TraitData {
    /// `var` slot
    Slot {
        /// Slot id (0 lets the engine assign one)
        slot_id: u32,
        /// Declared type (0 is `*`)
        type_name: MultinameIndex,
        /// Initial value
        value: DefaultValue,
    },
    /// `const` slot
    Const {
        /// Slot id
        slot_id: u32,
        /// Declared type
        type_name: MultinameIndex,
        /// Initial value
        value: DefaultValue,
    },
    /// Method
    Method {
        /// Dispatch id (0 for late binding)
        disp_id: u32,
        /// Method record
        method: MethodIndex,
    },
    /// Getter
    Getter {
        /// Dispatch id
        disp_id: u32,
        /// Method record
        method: MethodIndex,
    },
    /// Setter
    Setter {
        /// Dispatch id
        disp_id: u32,
        /// Method record
        method: MethodIndex,
    },
    /// Class binding
    Class {
        /// Slot id
        slot_id: u32,
        /// Class record
        class: ClassIndex,
    },
    /// Function closure binding
    Function {
        /// Slot id
        slot_id: u32,
        /// Method record
        function: MethodIndex,
    },
}

impl TraitData {
    /// Encoded kind
    pub fn kind(&self) -> TraitKind {
        match self {
            Self::Slot { .. } => TraitKind::Slot,
            Self::Const { .. } => TraitKind::Const,
            Self::Method { .. } => TraitKind::Method,
            Self::Getter { .. } => TraitKind::Getter,
            Self::Setter { .. } => TraitKind::Setter,
            Self::Class { .. } => TraitKind::Class,
            Self::Function { .. } => TraitKind::Function,
        }
    }
}

/// One member of a class, instance, script or activation scope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trait {
    /// Member name
    pub name: MultinameIndex,
    /// Payload
    pub data: TraitData,
    /// `FINAL` / `OVERRIDE`; `METADATA` is derived on write
    pub attributes: TraitAttributes,
    /// Attached metadata
    pub metadata: Vec<MetadataIndex>,
}

impl Trait {
    /// Trait with no attributes or metadata
    pub fn new(name: MultinameIndex, data: TraitData) -> Self {
        Self {
            name,
            data,
            attributes: TraitAttributes::empty(),
            metadata: Vec::new(),
        }
    }

    /// Encoded kind byte: attributes in the high nibble, kind in the low one
    pub fn kind_byte(&self) -> u8 {
        let mut attributes = self.attributes;
        attributes.set(TraitAttributes::METADATA, !self.metadata.is_empty());
        (attributes.bits() << 4) | self.data.kind() as u8
    }

    /// Append the encoded record
    pub fn write(&self, out: &mut ByteBuffer) -> Result<()> {
        out.write_u30(self.name.0)?;
        out.write_u8(self.kind_byte());
        match &self.data {
            TraitData::Slot {
                slot_id,
                type_name,
                value,
            }
            | TraitData::Const {
                slot_id,
                type_name,
                value,
            } => {
                out.write_u30(*slot_id)?;
                out.write_u30(type_name.0)?;
                out.write_u30(value.index)?;
                if !value.is_none() {
                    out.write_u8(value.kind as u8);
                }
            }
            TraitData::Method { disp_id, method }
            | TraitData::Getter { disp_id, method }
            | TraitData::Setter { disp_id, method } => {
                out.write_u30(*disp_id)?;
                out.write_u30(method.0)?;
            }
            TraitData::Class { slot_id, class } => {
                out.write_u30(*slot_id)?;
                out.write_u30(class.0)?;
            }
            TraitData::Function { slot_id, function } => {
                out.write_u30(*slot_id)?;
                out.write_u30(function.0)?;
            }
        }
        if !self.metadata.is_empty() {
            out.write_count("trait metadata count", self.metadata.len())?;
            for index in &self.metadata {
                out.write_u30(index.0)?;
            }
        }
        Ok(())
    }

    /// Append a count followed by every trait
    pub fn write_all(traits: &[Trait], out: &mut ByteBuffer) -> Result<()> {
        out.write_count("trait count", traits.len())?;
        for t in traits {
            t.write(out)?;
        }
        Ok(())
    }

    /// Parse a record
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let name = MultinameIndex(reader.read_u30()?);
        let at = reader.position();
        let kind_byte = reader.read_u8()?;
        let kind = TraitKind::from_nibble(kind_byte & 0x0F).ok_or(BytecodeError::InvalidOperand(at))?;
        let attributes = TraitAttributes::from_bits_retain(kind_byte >> 4);

        let data = match kind {
            TraitKind::Slot | TraitKind::Const => {
                let slot_id = reader.read_u30()?;
                let type_name = MultinameIndex(reader.read_u30()?);
                let value = match reader.read_u30()? {
                    0 => DefaultValue::NONE,
                    index => {
                        let kind_at = reader.position();
                        let kind = ValueKind::from_byte(reader.read_u8()?)
                            .ok_or(BytecodeError::InvalidOperand(kind_at))?;
                        DefaultValue { index, kind }
                    }
                };
                if kind == TraitKind::Slot {
                    TraitData::Slot {
                        slot_id,
                        type_name,
                        value,
                    }
                } else {
                    TraitData::Const {
                        slot_id,
                        type_name,
                        value,
                    }
                }
            }
            TraitKind::Method | TraitKind::Getter | TraitKind::Setter => {
                let disp_id = reader.read_u30()?;
                let method = MethodIndex(reader.read_u30()?);
                match kind {
                    TraitKind::Method => TraitData::Method { disp_id, method },
                    TraitKind::Getter => TraitData::Getter { disp_id, method },
                    _ => TraitData::Setter { disp_id, method },
                }
            }
            TraitKind::Class => TraitData::Class {
                slot_id: reader.read_u30()?,
                class: ClassIndex(reader.read_u30()?),
            },
            TraitKind::Function => TraitData::Function {
                slot_id: reader.read_u30()?,
                function: MethodIndex(reader.read_u30()?),
            },
        };

        let metadata = if attributes.contains(TraitAttributes::METADATA) {
            let count = reader.read_u30()? as usize;
            reader.read_n(count, |r| Ok(MetadataIndex(r.read_u30()?)))?
        } else {
            Vec::new()
        };

        let mut attributes = attributes;
        attributes.set(TraitAttributes::METADATA, false);
        Ok(Self {
            name,
            data,
            attributes,
            metadata,
        })
    }

    /// Parse a count followed by that many traits
    pub fn read_all(reader: &mut ByteReader<'_>) -> Result<Vec<Trait>> {
        let count = reader.read_u30()? as usize;
        reader.read_n(count, Trait::read)
    }
}

/// Metadata entry: a name plus ordered key/value pairs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Metadata {
    /// Metadata name
    pub name: StringIndex,
    /// Key/value pairs; key 0 means a keyless value
    pub items: Vec<(StringIndex, StringIndex)>,
}

impl Metadata {
    /// Append the encoded record (all keys, then all values)
    pub fn write(&self, out: &mut ByteBuffer) -> Result<()> {
        out.write_u30(self.name.0)?;
        out.write_count("metadata item count", self.items.len())?;
        for (key, _) in &self.items {
            out.write_u30(key.0)?;
        }
        for (_, value) in &self.items {
            out.write_u30(value.0)?;
        }
        Ok(())
    }

    /// Parse a record
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let name = StringIndex(reader.read_u30()?);
        let count = reader.read_u30()? as usize;
        let keys = reader.read_n(count, |r| Ok(StringIndex(r.read_u30()?)))?;
        let values = reader.read_n(count, |r| Ok(StringIndex(r.read_u30()?)))?;
        Ok(Self {
            name,
            items: keys.into_iter().zip(values).collect(),
        })
    }
}
