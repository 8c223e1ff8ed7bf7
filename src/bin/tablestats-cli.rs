//! tablestats-cli: run one stats collection over a JSON fixture
//!
//! Prints the published event and every live table with its stats as JSON.
//! Set `RUST_LOG=debug` to follow the background worker.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tablestats::fixture::Fixture;
use tablestats::StatsConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tablestats-cli")]
#[command(version)]
#[command(about = "Compute table stats for the tables described by a JSON fixture", long_about = None)]
struct CliArgs {
    /// Fixture file listing tables, point entries and range deletions
    fixture: PathBuf,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let fixture = Fixture::load(&args.fixture)
        .with_context(|| format!("failed to load fixture {}", args.fixture.display()))?;
    let report = fixture
        .run(StatsConfig::default())
        .context("table stats collection failed")?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);
    Ok(())
}
