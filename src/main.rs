//! riot-tap: Singer tap for Riot Games API gameplay data
//!
//! ```text
//! riot-tap --config config.json [--state state.json] [--catalog catalog.json] [--output out.jsonl]
//! riot-tap --discover
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | RUST_LOG | info | Log filter directives |
//! | TAP_LOG_FORMAT | text | `text` or `json` |
//! | TAP_LOG_ANSI | false | Colored text logs |
//!
//! Logs go to stderr. Exit status is non-zero on configuration, catalog or
//! state errors, when the output sink fails, or when no remote request of the
//! run succeeded.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::Parser;
use riot_tap::observability::{init_tracing, LogConfig};
use riot_tap::protocol::{Catalog, Emitter};
use riot_tap::remote::HttpClientFactory;
use riot_tap::{
    FixedIntervalPacer, State, StreamKind, SyncEngine, SyncReport, SystemClock, TapConfig,
    TapError, WatermarkStore,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "riot-tap")]
#[command(about = "Sync Riot Games API accounts, rankings, matches and timelines as a Singer tap")]
struct Args {
    /// Tap configuration (JSON, or TOML with a .toml extension)
    #[arg(long, required_unless_present = "discover")]
    config: Option<PathBuf>,

    /// State from a previous run
    #[arg(long)]
    state: Option<PathBuf>,

    /// Catalog selecting the streams to sync
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Print the catalog and exit
    #[arg(long)]
    discover: bool,

    /// Write messages to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn open_sink(output: Option<&Path>) -> Result<Box<dyn Write + Send>, TapError> {
    match output {
        Some(path) => Ok(Box::new(std::io::BufWriter::new(std::fs::File::create(path)?))),
        None => Ok(Box::new(std::io::stdout())),
    }
}

async fn sync(args: &Args) -> Result<SyncReport, TapError> {
    let config_path = args
        .config
        .as_deref()
        .ok_or(TapError::Config(riot_tap::ConfigError::MissingField("--config")))?;
    let config = TapConfig::load(config_path)?;

    let streams = match &args.catalog {
        Some(path) => Catalog::load(path)?.selected_streams()?,
        None => StreamKind::ALL.to_vec(),
    };
    let state = match &args.state {
        Some(path) => State::load(path)?,
        None => State::default(),
    };

    info!(
        players = config.players.len(),
        lanes = config.api_keys.len(),
        server = %config.server,
        start_date = %config.start_date,
        streams = ?streams.iter().map(StreamKind::name).collect::<Vec<_>>(),
        "Loaded configuration"
    );

    let factory = HttpClientFactory::new(&config.server, config.region.as_deref());
    let pacer = FixedIntervalPacer::from_rate_limit(&config.rate_limit);
    let engine = SyncEngine::new(
        config,
        Arc::new(factory),
        Arc::new(pacer),
        Arc::new(SystemClock),
    )?;

    let emitter = Emitter::new(open_sink(args.output.as_deref())?);
    let report = engine
        .run(&streams, Arc::new(WatermarkStore::from_state(state)), emitter)
        .await?;
    report.verdict()?;
    Ok(report)
}

fn discover(args: &Args) -> Result<(), TapError> {
    let emitter = Emitter::new(open_sink(args.output.as_deref())?);
    emitter.emit_catalog(&Catalog::discover())?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(&LogConfig::from_env()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let result = if args.discover {
        discover(&args)
    } else {
        sync(&args).await.map(|report| {
            info!(records = report.total_records(), "Tap finished");
        })
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
