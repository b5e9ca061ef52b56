use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use rayon::prelude::*;
use serde::Serialize;
use signal_engine::feed::{load_series, CsvMarketData};
use signal_engine::lifecycle::StatisticsReport;
use signal_engine::{EngineConfig, InstrumentSeries, Signal, SignalEngine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "signal-engine")]
#[command(about = "Dual-confirmation signal generation and lifecycle tracking")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// JSON file overriding engine thresholds
    #[arg(short, long, global = true, env = "SIGNAL_ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Built-in threshold preset used when no config file is given
    #[arg(long, global = true, value_enum, default_value = "default")]
    preset: Preset,

    /// Directory holding <instrument>_<timeframe>.csv files
    #[arg(short, long, global = true, env = "SIGNAL_ENGINE_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Comma-separated instruments (default: every file for the primary timeframe)
    #[arg(short, long, global = true)]
    instruments: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    Crypto,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay bar files through generation and completion, bar by bar
    Replay {
        /// Bars to skip before the first analysis
        #[arg(long, default_value = "50")]
        warmup: usize,
    },

    /// One-shot analysis of the latest bars, nothing is committed
    Scan,

    /// Poll the data directory on an interval
    Watch {
        #[arg(long, default_value = "60")]
        interval_secs: u64,

        /// Stop after this many cycles (0 = run until interrupted)
        #[arg(long, default_value = "0")]
        cycles: u64,
    },
}

#[derive(Serialize)]
struct ReplaySummary {
    global: StatisticsReport,
    instruments: Vec<StatisticsReport>,
    active: Vec<Signal>,
}

#[derive(Serialize)]
struct ScanResult {
    instrument: String,
    signal: Option<Signal>,
    reason: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = if args.verbose { "signal_engine=debug" } else { "signal_engine=info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.parse()?))
        .init();

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => match args.preset {
            Preset::Default => EngineConfig::default(),
            Preset::Crypto => EngineConfig::crypto(),
        },
    };

    let provider = CsvMarketData::new(&args.data_dir, config.primary_timeframe);
    let instruments: Vec<String> = match &args.instruments {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
        None => provider.instruments(config.primary_timeframe)?,
    };
    if instruments.is_empty() {
        warn!("No instruments found in {:?}", args.data_dir);
        return Ok(());
    }
    info!("Instruments: {}", instruments.join(", "));

    match args.command {
        Commands::Replay { warmup } => replay(config, &provider, &instruments, warmup).await,
        Commands::Scan => scan(config, &provider, &instruments),
        Commands::Watch { interval_secs, cycles } => watch(config, &provider, &instruments, interval_secs, cycles).await,
    }
}

/// Load the primary series and, when configured and present, the
/// confirmation series for one instrument
fn load_instrument(
    config: &EngineConfig,
    provider: &CsvMarketData,
    instrument: &str,
) -> Result<(InstrumentSeries, Option<InstrumentSeries>)> {
    let primary = load_series(&provider.path_for(instrument, config.primary_timeframe), instrument, config.primary_timeframe)?;
    let confirmation = match config.confirmation_timeframe {
        Some(tf) => {
            let path = provider.path_for(instrument, tf);
            if path.exists() {
                Some(load_series(&path, instrument, tf)?)
            } else {
                None
            }
        }
        None => None,
    };
    Ok((primary, confirmation))
}

async fn replay(config: EngineConfig, provider: &CsvMarketData, instruments: &[String], warmup: usize) -> Result<()> {
    let mut loaded = Vec::new();
    for instrument in instruments {
        match load_instrument(&config, provider, instrument) {
            Ok((primary, confirmation)) => {
                info!("{}: {} bars loaded", instrument, primary.len());
                loaded.push((instrument.clone(), primary, confirmation));
            }
            Err(e) => warn!("Skipping {}: {:#}", instrument, e),
        }
    }

    let engine = Arc::new(SignalEngine::new(config));
    let tasks = loaded.into_iter().map(|(instrument, primary, confirmation)| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let result = engine.replay(&primary, confirmation.as_ref(), warmup).await;
            (instrument, result)
        })
    });

    for joined in join_all(tasks).await {
        match joined {
            Ok((instrument, Ok(generated))) => info!("{}: {} signals generated", instrument, generated),
            Ok((instrument, Err(e))) => error!("{}: replay failed: {:#}", instrument, e),
            Err(e) => error!("Replay task panicked: {}", e),
        }
    }

    let mut per_instrument = Vec::new();
    for instrument in instruments {
        per_instrument.push(engine.get_statistics(Some(instrument)).await?);
    }
    let summary = ReplaySummary {
        global: engine.get_statistics(None).await?,
        instruments: per_instrument,
        active: engine.list_active_signals().await,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn scan(config: EngineConfig, provider: &CsvMarketData, instruments: &[String]) -> Result<()> {
    let engine = SignalEngine::new(config);

    let results: Vec<ScanResult> = instruments
        .par_iter()
        .map(|instrument| match load_instrument(engine.config(), provider, instrument) {
            Ok((primary, confirmation)) => match engine.analyze(instrument, &primary, confirmation.as_ref()) {
                Ok(signal) => ScanResult { instrument: instrument.clone(), signal: Some(signal), reason: None },
                Err(rejection) => ScanResult {
                    instrument: instrument.clone(),
                    signal: None,
                    reason: Some(rejection.to_string()),
                },
            },
            Err(e) => ScanResult {
                instrument: instrument.clone(),
                signal: None,
                reason: Some(format!("{:#}", e)),
            },
        })
        .collect();

    let found = results.iter().filter(|r| r.signal.is_some()).count();
    info!("Scan complete: {} of {} instruments have a signal", found, results.len());
    println!("{}", serde_json::to_string_pretty(&results).context("Failed to encode scan results")?);
    Ok(())
}

async fn watch(
    config: EngineConfig,
    provider: &CsvMarketData,
    instruments: &[String],
    interval_secs: u64,
    cycles: u64,
) -> Result<()> {
    let engine = SignalEngine::new(config);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut cycle = 0u64;

    loop {
        interval.tick().await;
        cycle += 1;

        engine.poll_prices(provider, instruments).await?;
        for instrument in instruments {
            if let Some(signal) = engine.run_cycle(provider, instrument).await? {
                info!("{} new {} signal {}", instrument, signal.direction(), signal.id());
            }
        }

        if let StatisticsReport::Global(stats) = engine.get_statistics(None).await? {
            info!(
                "Cycle {}: {} active | {} completed | win rate {:.1}% | distance {:+.5}",
                cycle,
                engine.list_active_signals().await.len(),
                stats.total_signals,
                stats.win_rate,
                stats.cumulative_distance
            );
        }

        if cycles > 0 && cycle >= cycles {
            break;
        }
    }

    Ok(())
}
