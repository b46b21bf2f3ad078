//! Dump command - disassemble a module.

use anyhow::Result;
use avmc_bytecode::Disassembler;
use clap::Args;
use std::path::PathBuf;

use super::read_module;

#[derive(Args)]
pub struct DumpCommand {
    /// Module to disassemble
    pub file: PathBuf,

    /// Print the decoded records as JSON instead of a listing
    #[arg(long)]
    pub json: bool,

    /// Check cross-table references before printing
    #[arg(long)]
    pub validate: bool,
}

impl DumpCommand {
    pub fn run(&self) -> Result<()> {
        let module = read_module(&self.file)?;
        if self.validate {
            module.validate()?;
        }

        if self.json {
            println!("{}", module.to_json()?);
        } else {
            print!("{}", Disassembler::new(&module).module_listing()?);
        }
        Ok(())
    }
}
