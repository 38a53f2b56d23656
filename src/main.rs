use clap::Parser;
use pk_arb::cli::{Cli, Commands};
use pk_arb::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    let _guard = pk_arb::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting trading loop");
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Pairs file: {:?}", config.pairs.file);
            println!("  Accept score: {}", config.pairs.accept_score);
            println!("  Mode: {:?}", config.execution.mode);
            println!(
                "  Risk: min_edge={}c, pairs_max={}, venue_cap=${}",
                config.risk.min_net_edge_cents, config.risk.pairs_max, config.risk.venue_cap_usd
            );
            println!(
                "  Timing: hedge_timeout={}ms, unwind_budget={}ms",
                config.execution.hedge_timeout_ms, config.execution.unwind_budget_ms
            );
        }
        Commands::Status => {
            println!("pk-arb status");
            println!("  Mode: {:?}", config.execution.mode);
            println!("  Status: not running");
        }
    }

    Ok(())
}
