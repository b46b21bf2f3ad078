//! Emission errors

use avmc_bytecode::BytecodeError;
use thiserror::Error;

/// Errors that abort code generation for a compilation unit
#[derive(Debug, Error)]
pub enum EmitError {
    /// The front end broke the emitter's contract
    #[error("Internal error: {0}")]
    Internal(String),

    /// Construct the backend cannot generate code for
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// An instruction was emitted outside StartMethod/FinishMethod
    #[error("No method is open")]
    NoOpenMethod,

    /// Encoding or serialization failed
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EmitError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for emission
pub type EmitResult<T> = Result<T, EmitError>;
