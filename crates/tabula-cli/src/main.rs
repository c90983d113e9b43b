use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabula_core::FlightConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::*;

#[derive(Parser)]
#[command(name = "tabula")]
#[command(author, version, about = "Tabula - Arrow Flight server for constant datasets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the constant datasets until Ctrl-C
    Serve {
        /// Port to listen on (0 picks a free port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,
    },

    /// List flights advertised by a server
    List {
        /// Flight server address (host:port or URL)
        #[arg(short, long)]
        connect: String,

        /// Criteria sent with the request
        #[arg(long, default_value = "")]
        criteria: String,
    },

    /// Fetch a dataset by ticket and print it
    Get {
        /// Flight server address (host:port or URL)
        #[arg(short, long)]
        connect: String,

        /// Ticket identifying the dataset
        #[arg(short, long)]
        ticket: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let config = if let Some(config_path) = cli.config {
        FlightConfig::from_file(&config_path)?
    } else {
        FlightConfig::default()
    };

    match cli.command {
        Commands::Serve { port, host } => {
            let mut config = config;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(host) = host {
                config.host = host;
            }
            serve(&config).await?;
        }
        Commands::List { connect, criteria } => {
            list_flights(&connect, &criteria).await?;
        }
        Commands::Get { connect, ticket } => {
            get_dataset(&connect, &ticket).await?;
        }
    }

    Ok(())
}

/// Crates whose events reach the log
const LOG_TARGETS: [&str; 3] = ["tabula_cli", "tabula_core", "tabula_flight"];

/// Default directive used when `RUST_LOG` is unset
fn log_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_filter(verbose)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
