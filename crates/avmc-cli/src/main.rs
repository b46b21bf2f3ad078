use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::EnvFilter;

mod commands;

use commands::{config::ConfigCommand, dump::DumpCommand, header::HeaderCommand};

#[derive(Parser)]
#[command(name = "avmc", version, about = "ActionScript Byte Code tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Disassemble a module
    Dump(DumpCommand),
    /// Print the native id header of a module
    Header(HeaderCommand),
    /// Validate and print an emitter configuration file
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dump(cmd) => cmd.run()?,
        Commands::Header(cmd) => cmd.run()?,
        Commands::Config(cmd) => cmd.run()?,
    }

    Ok(())
}
