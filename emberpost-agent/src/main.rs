//! emberpost-agent -- autonomous side-car that turns log lines into
//! signed metric snapshots.

use clap::Parser;

use emberpost_agent::agent::Agent;
use emberpost_agent::cli::{Cli, Commands, TestArgs};
use emberpost_agent::error::AgentError;
use emberpost_agent::{logging, report};
use emberpost_core::AgentConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => {}
        Err(e) => {
            tracing::error!(error = %e, "agent failed");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), AgentError> {
    let mut config = AgentConfig::load(&cli.config).await?;

    if let Some(interval) = cli.interval {
        config.interval = interval;
        // Re-check so an override below one second is still rejected
        config.validate()?;
    }

    match cli.command {
        None | Some(Commands::Run) => {
            let mut agent = Agent::new(config, cli.dry_run)?;
            agent.run().await
        }
        Some(Commands::Test(args)) => run_test(config, args).await,
    }
}

/// The `test` subcommand: process a file once, print a peek-style table.
async fn run_test(config: AgentConfig, args: TestArgs) -> Result<(), AgentError> {
    let agent = Agent::new(config, true)?;

    println!("Processing file: {}", args.file.display());
    if args.lines > 0 {
        println!("Line limit: {}", args.lines);
    }
    println!();

    let count = agent.process_file(&args.file, args.lines).await?;

    report::print_test_results(agent.config(), &agent.peek(), count);
    Ok(())
}
