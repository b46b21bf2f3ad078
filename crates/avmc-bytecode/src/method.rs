//! Method records: signature, body and exception table

use bitflags::bitflags;
use serde::Serialize;

use crate::buffer::ByteBuffer;
use crate::constant::NamespaceKind;
use crate::error::{BytecodeError, Result};
use crate::operand::{MethodIndex, MultinameIndex, StringIndex};
use crate::reader::ByteReader;
use crate::traits::Trait;

bitflags! {
    /// Method-info flag byte
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
    #[serde(transparent)]
    pub struct MethodFlags: u8 {
        /// Method reads `arguments`
        const NEED_ARGUMENTS = 0x01;
        /// Method needs an activation object
        const NEED_ACTIVATION = 0x02;
        /// Extra arguments are collected into a rest array
        const NEED_REST = 0x04;
        /// Optional parameter defaults follow
        const HAS_OPTIONAL = 0x08;
        /// Extra arguments are ignored
        const IGNORE_REST = 0x10;
        /// Implemented by the host
        const NATIVE = 0x20;
        /// Method sets the default XML namespace
        const SET_DXNS = 0x40;
        /// Parameter names follow
        const HAS_PARAM_NAMES = 0x80;
    }
}

/// Constant kinds used by default values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ValueKind {
    /// `undefined` (also "no value")
    Undefined = 0x00,
    /// String pool entry
    Utf8 = 0x01,
    /// Int pool entry
    Int = 0x03,
    /// Uint pool entry
    Uint = 0x04,
    /// Private namespace
    PrivateNs = 0x05,
    /// Double pool entry
    Double = 0x06,
    /// User namespace
    Namespace = 0x08,
    /// `false`
    False = 0x0A,
    /// `true`
    True = 0x0B,
    /// `null`
    Null = 0x0C,
    /// Package namespace
    PackageNamespace = 0x16,
    /// Package-internal namespace
    PackageInternalNs = 0x17,
    /// Protected namespace
    ProtectedNamespace = 0x18,
    /// Explicit namespace
    ExplicitNamespace = 0x19,
    /// Static protected namespace
    StaticProtectedNs = 0x1A,
}

impl ValueKind {
    /// Decode from the record byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Undefined,
            0x01 => Self::Utf8,
            0x03 => Self::Int,
            0x04 => Self::Uint,
            0x05 => Self::PrivateNs,
            0x06 => Self::Double,
            0x08 => Self::Namespace,
            0x0A => Self::False,
            0x0B => Self::True,
            0x0C => Self::Null,
            0x16 => Self::PackageNamespace,
            0x17 => Self::PackageInternalNs,
            0x18 => Self::ProtectedNamespace,
            0x19 => Self::ExplicitNamespace,
            0x1A => Self::StaticProtectedNs,
            _ => return None,
        })
    }

    /// Value kind referring to a namespace of `kind`
    pub fn for_namespace(kind: NamespaceKind) -> Self {
        match kind {
            NamespaceKind::Namespace => Self::Namespace,
            NamespaceKind::Package => Self::PackageNamespace,
            NamespaceKind::PackageInternal => Self::PackageInternalNs,
            NamespaceKind::Protected => Self::ProtectedNamespace,
            NamespaceKind::Explicit => Self::ExplicitNamespace,
            NamespaceKind::StaticProtected => Self::StaticProtectedNs,
            NamespaceKind::Private => Self::PrivateNs,
        }
    }
}

/// A constant reference plus its kind, as used for slot and parameter defaults
///
/// Index 0 with kind `Undefined` means "no default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DefaultValue {
    /// Pool index (interpretation depends on `kind`)
    pub index: u32,
    /// Value kind
    pub kind: ValueKind,
}

impl DefaultValue {
    /// No default
    pub const NONE: Self = Self {
        index: 0,
        kind: ValueKind::Undefined,
    };

    /// Create a default value
    pub const fn new(index: u32, kind: ValueKind) -> Self {
        Self { index, kind }
    }

    /// Boolean constant
    pub const fn bool(value: bool) -> Self {
        let kind = if value { ValueKind::True } else { ValueKind::False };
        Self::new(kind as u32, kind)
    }

    /// `null`
    pub const fn null() -> Self {
        Self::new(ValueKind::Null as u32, ValueKind::Null)
    }

    /// Whether a value is present
    pub const fn is_none(&self) -> bool {
        self.index == 0
    }
}

/// Method signature record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodInfo {
    /// Parameter types (0 is `*`)
    pub param_types: Vec<MultinameIndex>,
    /// Return type (0 is `*`)
    pub return_type: MultinameIndex,
    /// Debug name
    pub name: StringIndex,
    /// Flags; `HAS_OPTIONAL` and `HAS_PARAM_NAMES` are derived on write
    pub flags: MethodFlags,
    /// Defaults for trailing optional parameters
    pub optional: Vec<DefaultValue>,
    /// Parameter names
    pub param_names: Vec<StringIndex>,
}

impl MethodInfo {
    /// Create a builder
    pub fn builder() -> MethodInfoBuilder {
        MethodInfoBuilder::default()
    }

    /// Flags as written, including the derived bits
    pub fn effective_flags(&self) -> MethodFlags {
        let mut flags = self.flags;
        flags.set(MethodFlags::HAS_OPTIONAL, !self.optional.is_empty());
        flags.set(MethodFlags::HAS_PARAM_NAMES, !self.param_names.is_empty());
        flags
    }

    /// Append the encoded record
    pub fn write(&self, out: &mut ByteBuffer) -> Result<()> {
        out.write_count("parameter count", self.param_types.len())?;
        out.write_u30(self.return_type.0)?;
        for ty in &self.param_types {
            out.write_u30(ty.0)?;
        }
        out.write_u30(self.name.0)?;
        let flags = self.effective_flags();
        out.write_u8(flags.bits());
        if flags.contains(MethodFlags::HAS_OPTIONAL) {
            out.write_count("optional count", self.optional.len())?;
            for value in &self.optional {
                out.write_u30(value.index)?;
                out.write_u8(value.kind as u8);
            }
        }
        if flags.contains(MethodFlags::HAS_PARAM_NAMES) {
            for name in &self.param_names {
                out.write_u30(name.0)?;
            }
        }
        Ok(())
    }

    /// Parse a record
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let param_count = reader.read_u30()? as usize;
        let return_type = MultinameIndex(reader.read_u30()?);
        let param_types = reader.read_n(param_count, |r| Ok(MultinameIndex(r.read_u30()?)))?;
        let name = StringIndex(reader.read_u30()?);
        let flags = MethodFlags::from_bits_retain(reader.read_u8()?);

        let optional = if flags.contains(MethodFlags::HAS_OPTIONAL) {
            let count = reader.read_u30()? as usize;
            reader.read_n(count, read_default_value)?
        } else {
            Vec::new()
        };
        let param_names = if flags.contains(MethodFlags::HAS_PARAM_NAMES) {
            reader.read_n(param_count, |r| Ok(StringIndex(r.read_u30()?)))?
        } else {
            Vec::new()
        };

        Ok(Self {
            param_types,
            return_type,
            name,
            flags,
            optional,
            param_names,
        })
    }
}

pub(crate) fn read_default_value(reader: &mut ByteReader<'_>) -> Result<DefaultValue> {
    let at = reader.position();
    let index = reader.read_u30()?;
    let kind = ValueKind::from_byte(reader.read_u8()?).ok_or(BytecodeError::InvalidOperand(at))?;
    Ok(DefaultValue { index, kind })
}

/// Builder for method records
#[derive(Debug, Default)]
pub struct MethodInfoBuilder {
    info: MethodInfo,
}

impl MethodInfoBuilder {
    /// Add a parameter
    pub fn param(mut self, ty: MultinameIndex) -> Self {
        self.info.param_types.push(ty);
        self
    }

    /// Set the return type
    pub fn return_type(mut self, ty: MultinameIndex) -> Self {
        self.info.return_type = ty;
        self
    }

    /// Set the debug name
    pub fn name(mut self, name: StringIndex) -> Self {
        self.info.name = name;
        self
    }

    /// Add flags
    pub fn flags(mut self, flags: MethodFlags) -> Self {
        self.info.flags |= flags;
        self
    }

    /// Add an optional-parameter default
    pub fn optional(mut self, value: DefaultValue) -> Self {
        self.info.optional.push(value);
        self
    }

    /// Add a parameter name
    pub fn param_name(mut self, name: StringIndex) -> Self {
        self.info.param_names.push(name);
        self
    }

    /// Build the record
    pub fn build(self) -> MethodInfo {
        self.info
    }
}

/// One exception-table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExceptionEntry {
    /// Start of the protected range (inclusive)
    pub from: u32,
    /// End of the protected range (exclusive)
    pub to: u32,
    /// Handler address
    pub target: u32,
    /// Caught type (0 catches everything)
    pub exc_type: MultinameIndex,
    /// Name of the catch variable (0 for none)
    pub var_name: MultinameIndex,
}

impl ExceptionEntry {
    fn write(&self, out: &mut ByteBuffer) -> Result<()> {
        out.write_u30(self.from)?;
        out.write_u30(self.to)?;
        out.write_u30(self.target)?;
        out.write_u30(self.exc_type.0)?;
        out.write_u30(self.var_name.0)
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            from: reader.read_u30()?,
            to: reader.read_u30()?,
            target: reader.read_u30()?,
            exc_type: MultinameIndex(reader.read_u30()?),
            var_name: MultinameIndex(reader.read_u30()?),
        })
    }
}

/// Method body record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MethodBody {
    /// Owning method
    pub method: MethodIndex,
    /// Highest operand-stack depth
    pub max_stack: u32,
    /// Number of local registers
    pub local_count: u32,
    /// Scope depth on entry
    pub init_scope_depth: u32,
    /// Highest scope depth
    pub max_scope_depth: u32,
    /// Encoded instructions
    pub code: Vec<u8>,
    /// Exception table
    pub exceptions: Vec<ExceptionEntry>,
    /// Activation-object traits
    pub traits: Vec<Trait>,
}

impl MethodBody {
    /// Append the encoded record
    pub fn write(&self, out: &mut ByteBuffer) -> Result<()> {
        out.write_u30(self.method.0)?;
        out.write_u30(self.max_stack)?;
        out.write_u30(self.local_count)?;
        out.write_u30(self.init_scope_depth)?;
        out.write_u30(self.max_scope_depth)?;
        out.write_count("code length", self.code.len())?;
        out.write_bytes(&self.code);
        out.write_count("exception count", self.exceptions.len())?;
        for entry in &self.exceptions {
            entry.write(out)?;
        }
        Trait::write_all(&self.traits, out)
    }

    /// Parse a record
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let method = MethodIndex(reader.read_u30()?);
        let max_stack = reader.read_u30()?;
        let local_count = reader.read_u30()?;
        let init_scope_depth = reader.read_u30()?;
        let max_scope_depth = reader.read_u30()?;
        let code_len = reader.read_u30()? as usize;
        let code = reader.read_bytes(code_len)?.to_vec();
        let exception_count = reader.read_u30()? as usize;
        let exceptions = reader.read_n(exception_count, ExceptionEntry::read)?;
        let traits = Trait::read_all(reader)?;
        Ok(Self {
            method,
            max_stack,
            local_count,
            init_scope_depth,
            max_scope_depth,
            code,
            exceptions,
            traits,
        })
    }
}
