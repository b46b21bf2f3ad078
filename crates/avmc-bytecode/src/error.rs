//! Bytecode errors

use thiserror::Error;

/// Errors that can occur while encoding or decoding ABC data
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// Version header is not one we can read
    #[error("Unsupported version: {major}.{minor}")]
    UnsupportedVersion {
        /// Major version found in the header
        major: u16,
        /// Minor version found in the header
        minor: u16,
    },

    /// Invalid opcode
    #[error("Invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Invalid operand
    #[error("Invalid operand at offset {0}")]
    InvalidOperand(usize),

    /// Reference to a table entry that does not exist
    #[error("Invalid {table} index {index}")]
    InvalidIndex {
        /// Table name
        table: &'static str,
        /// Offending index
        index: u32,
    },

    /// Unexpected end of bytecode
    #[error("Unexpected end of bytecode")]
    UnexpectedEnd,

    /// A count or index does not fit the u30 encoding
    #[error("{what} value {value} exceeds the u30 range")]
    IndexOverflow {
        /// What was being written
        what: &'static str,
        /// Value that overflowed
        value: u64,
    },

    /// Branch displacement does not fit in a signed 24-bit field
    #[error("Branch displacement {0} does not fit in 24 bits")]
    BranchOutOfRange(i64),

    /// Class and instance tables have different lengths
    #[error("Class table has {classes} entries but instance table has {instances}")]
    ClassCountMismatch {
        /// Class-info count
        classes: usize,
        /// Instance-info count
        instances: usize,
    },

    /// IO error during serialization
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
