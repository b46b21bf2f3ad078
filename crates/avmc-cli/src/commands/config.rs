//! Config command - validate an emitter configuration file.

use anyhow::{Result, bail};
use avmc_emitter::EmitterConfig;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ConfigCommand {
    /// Configuration file (defaults are printed when omitted)
    pub file: Option<PathBuf>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl ConfigCommand {
    pub fn run(&self) -> Result<()> {
        let config = match &self.file {
            Some(path) => EmitterConfig::load(path)?,
            None => EmitterConfig::default(),
        };
        if config.coverage && config.coverage_hook.is_empty() {
            bail!("coverage is enabled but coverage_hook is empty");
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Ok(())
    }
}
