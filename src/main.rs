//! pidns - DNS ad-block manager for dnsmasq
//!
//! Keeps dnsmasq block lists, whitelists and blacklists in sync.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use pidns::cli::{Cli, Commands};
use pidns::commands;
use pidns::model::ListKind;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // Logs go to stderr so command output stays parseable.
    // Timestamps only matter for the long-running daemon.
    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false);
    if matches!(cli.command, Commands::Daemon) {
        tracing::subscriber::set_global_default(builder.finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())?;
    }

    // Execute command
    match cli.command {
        Commands::Update => commands::update::run(&cli.config).await,
        Commands::Sources { action } => commands::sources::run(action, &cli.config).await,
        Commands::Whitelist { action } => {
            commands::entries::run(ListKind::Whitelist, action, &cli.config).await
        }
        Commands::Blacklist { action } => {
            commands::entries::run(ListKind::Blacklist, action, &cli.config).await
        }
        Commands::Check { domains, json } => {
            commands::check::run(&domains, json, &cli.config).await
        }
        Commands::Cleanup => commands::cleanup::run(&cli.config).await,
        Commands::Generate => commands::generate::run(&cli.config).await,
        Commands::Resolver { action } => commands::resolver::run(action, &cli.config).await,
        Commands::Stats { json } => commands::stats::run(json, &cli.config).await,
        Commands::Daemon => commands::daemon::run(&cli.config).await,
        Commands::Version => {
            println!("pidns {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
