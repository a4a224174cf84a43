//! CLI entry point for the bWAR leaderboard.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use browse::ListingKind;
use leaderboard_app::AppConfig;
use leaderboard_app::config::DEFAULT_CONFIG_FILE;

mod browse;
mod server;

/// MLB and MiLB bWAR leaderboards.
#[derive(Parser, Debug)]
#[command(
    name = "leaderboard",
    version,
    about = "leaderboard: paginated bWAR listings, served over HTTP or browsed in the terminal"
)]
struct Cli {
    /// Configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the listing, logo and contact API.
    Serve {
        /// Listen address, overriding `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Page through a listing from the API.
    Browse {
        #[arg(value_enum)]
        listing: ListingKind,
        /// Initial sort field, e.g. `stat.mWar`.
        #[arg(long)]
        sort: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { config, cmd } = Cli::parse();
    install_tracing();

    let config = AppConfig::load(&config)?;
    match cmd {
        Command::Serve { bind } => server::serve(config, bind).await,
        Command::Browse { listing, sort } => browse::run(config, listing, sort).await,
    }
}

fn install_tracing() {
    // RUST_LOG overrides; INFO by default.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
