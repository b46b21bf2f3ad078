//! CLI command implementations.

pub mod config;
pub mod dump;
pub mod header;

use anyhow::{Context, Result};
use avmc_bytecode::AbcModule;
use std::path::Path;

/// Read and parse a module file
pub fn read_module(path: &Path) -> Result<AbcModule> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let module = AbcModule::from_bytes(&bytes)
        .with_context(|| format!("{} is not a valid module", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        methods = module.methods.len(),
        classes = module.classes.len(),
        scripts = module.scripts.len(),
        "loaded module"
    );
    Ok(module)
}
