//! # avmc bytecode
//!
//! This crate defines the ActionScript Byte Code (ABC) module format as
//! produced by the avmc code generator and consumed by the AVM2 execution
//! engine.
//!
//! ## Design Principles
//!
//! - **Byte-exact**: the container is written by hand, field by field
//! - **Closed instruction set**: every opcode has an operand shape, a stack
//!   effect and a codec, checked by exhaustive matching
//! - **Deduplicated constants**: seven independent pools with stable 1-based indices
//! - **Readable**: modules parse back into the same records for listings and tests

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod class;
pub mod constant;
pub mod disasm;
pub mod error;
pub mod header;
pub mod instruction;
pub mod method;
pub mod module;
pub mod opcode;
pub mod operand;
pub mod reader;
pub mod traits;

pub use buffer::ByteBuffer;
pub use class::{ClassInfo, InstanceFlags, InstanceInfo, ScriptInfo};
pub use constant::{ConstantPool, Multiname, Namespace, NamespaceKind};
pub use disasm::Disassembler;
pub use error::BytecodeError;
pub use header::NativeHeader;
pub use instruction::{ArgsOp, BranchOp, CallNameOp, Instruction, LocalOp, NameOp, SimpleOp, SlotOp};
pub use method::{DefaultValue, ExceptionEntry, MethodBody, MethodFlags, MethodInfo, ValueKind};
pub use module::AbcModule;
pub use opcode::Opcode;
pub use operand::{
    ClassIndex, DoubleIndex, IntIndex, JumpOffset, MetadataIndex, MethodIndex, MultinameIndex,
    NamespaceIndex, NsSetIndex, Register, StringIndex, UintIndex,
};
pub use reader::{AbcReader, ByteReader};
pub use traits::{Metadata, Trait, TraitAttributes, TraitData, TraitKind};

/// Major format version understood by the engine
pub const ABC_MAJOR_VERSION: u16 = 46;

/// Minor format version written by default
pub const ABC_MINOR_VERSION: u16 = 16;
