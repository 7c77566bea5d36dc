use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error, info, trace};

use trainwatch::alert::{mailer, AlertProcessor, JsonFileLedger};
use trainwatch::api::{self, AppState, HttpStoreProvider, StoreProvider};
use trainwatch::config::Config;

/// Training attendance, scoring and reporting service
#[derive(Parser)]
#[command(name = "trainwatch")]
#[command(about = "Training attendance and assessment service", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Address to bind (overrides TRAINWATCH_HOST)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on (overrides TRAINWATCH_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Send due training alerts once and print a JSON summary
    Alerts {
        /// Run as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,tower=debug", // -vvv shows everything including dependencies
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("trainwatch started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = match cli.command {
        Commands::Serve { host, port } => run_serve(host, port).await,
        Commands::Alerts { date } => run_alerts(date).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_serve(host: Option<IpAddr>, port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let addr = SocketAddr::new(
        host.unwrap_or(config.server.host),
        port.unwrap_or(config.server.port),
    );

    let ledger = JsonFileLedger::open(&config.alerts.ledger_path)
        .await
        .with_context(|| {
            format!(
                "failed to open alert ledger {}",
                config.alerts.ledger_path.display()
            )
        })?
        .retain_days(config.alerts.lead_days);
    let mailer = mailer::from_settings(config.mail.as_ref())?;
    info!(mailer = mailer.name(), "mail delivery configured");

    let state = AppState {
        config: Arc::new(config),
        stores: Arc::new(HttpStoreProvider),
        mailer,
        ledger: Arc::new(ledger),
    };
    api::serve(state, addr).await?;
    Ok(())
}

async fn run_alerts(date: Option<NaiveDate>) -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let store = HttpStoreProvider.store(&config)?;
    let ledger = JsonFileLedger::open(&config.alerts.ledger_path)
        .await?
        .retain_days(config.alerts.lead_days);
    let mailer = mailer::from_settings(config.mail.as_ref())?;

    let processor = AlertProcessor::new(store, mailer, Arc::new(ledger), &config)?;
    let today = date.unwrap_or_else(|| Local::now().date_naive());
    let summary = processor.run(today).await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
