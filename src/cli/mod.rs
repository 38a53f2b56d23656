//! Command-line interface

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pk-arb", about = "Hedged cross-venue arbitrage engine", version)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the trading loop
    Run(RunArgs),
    /// Print the effective configuration
    Config,
    /// Show engine status
    Status,
}
