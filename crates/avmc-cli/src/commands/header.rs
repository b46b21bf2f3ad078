//! Header command - print native method, class and package ids.

use anyhow::Result;
use avmc_bytecode::NativeHeader;
use clap::Args;
use std::path::PathBuf;

use super::read_module;

#[derive(Args)]
pub struct HeaderCommand {
    /// Module to inspect
    pub file: PathBuf,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl HeaderCommand {
    pub fn run(&self) -> Result<()> {
        let module = read_module(&self.file)?;
        let header = NativeHeader::from_module(&module);
        if header.methods.is_empty() {
            tracing::warn!(path = %self.file.display(), "module declares no native methods");
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&header)?);
        } else {
            print!("{}", header.render());
        }
        Ok(())
    }
}
