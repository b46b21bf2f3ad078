//! # AVM Compiler Emitter
//!
//! Code-generation backend that turns a resolved, type-checked program into
//! an ActionScript Byte Code module.
//!
//! ## Pipeline
//!
//! 1. The front end walks its tree and drives an [`Emitter`]
//! 2. Instructions are encoded while stack, scope and register use is tracked
//! 3. Branches, exception regions and finally chains are patched in place
//! 4. Method, class and script records are assembled into an [`avmc_bytecode::AbcModule`]

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod assembler;
pub mod codegen;
pub mod config;
pub mod debug;
pub mod emitter;
pub mod error;
pub mod exceptions;
pub mod flow;
pub mod ops;
pub mod traits;

pub use assembler::ModuleAssembler;
pub use codegen::{
    ArgumentsMode, DepthTracker, MethodState, PatchHandle, RegisterAllocator, SavedScope,
    StartMethod,
};
pub use config::EmitterConfig;
pub use debug::{BranchPoint, CoverageMap};
pub use emitter::{ClassDefinition, EmittedModule, Emitter, FinishMethod, ProgramDefinition};
pub use error::{EmitError, EmitResult};
pub use ops::{BinaryOperator, CoerceKind, ConvertKind, UnaryOperator};
pub use traits::{
    Initializer, MetadataDescriptor, MethodDescriptor, NameEntry, ObjectDescriptor,
    SlotDescriptor, SlotKind,
};
