//! Chronotape CLI - replay bar tapes through strategy plugins

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use common::{Bar, CostsModel, SymbolSpec, Timeframe, Ts};
use engine::{EngineConfig, FeatureSpec, PluginStrategy};
use features::FeatureKind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chronotape")]
#[command(about = "Event-driven single-instrument backtest engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a tape range through a strategy plugin and write a run pack
    Run(RunArgs),
    /// Generate one synthetic tape day (deterministic random walk)
    Gen(GenArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Tape store root (the directory containing bars/)
    #[arg(long)]
    base_dir: PathBuf,

    /// Instrument symbol, e.g. EURUSD
    #[arg(long)]
    symbol: String,

    /// Bar timeframe: 1m, 5m, 15m, 1h, 4h, 1d
    #[arg(long, default_value = "1m")]
    timeframe: String,

    /// First day to replay, inclusive (YYYYMMDD)
    #[arg(long)]
    start: u32,

    /// Last day to replay, inclusive (YYYYMMDD)
    #[arg(long)]
    end: u32,

    /// Pip size of the symbol
    #[arg(long, default_value_t = 0.0001)]
    pip_size: f64,

    /// Base-currency units per lot
    #[arg(long, default_value_t = 100_000.0)]
    lot_size: f64,

    /// Fixed spread in pips
    #[arg(long, default_value_t = 0.8)]
    spread_pips: f64,

    /// Fixed slippage in pips
    #[arg(long, default_value_t = 0.0)]
    slippage_pips: f64,

    /// Commission per lot, charged on each fill
    #[arg(long, default_value_t = 0.0)]
    commission_per_lot: f64,

    /// Starting account balance
    #[arg(long, default_value_t = 100_000.0)]
    balance: f64,

    /// Strategy plugin library (.so / .dll / .dylib)
    #[arg(long)]
    plugin: PathBuf,

    /// Opaque params string handed to the strategy (conventionally JSON)
    #[arg(long, default_value = "{}")]
    params: String,

    /// EMA period to materialize (repeatable)
    #[arg(long, value_name = "PERIOD", default_values_t = [50u32])]
    ema: Vec<u32>,

    /// ATR period to materialize (repeatable)
    #[arg(long, value_name = "PERIOD", default_values_t = [14u32])]
    atr: Vec<u32>,

    /// Output run-pack path
    #[arg(long, short)]
    out: PathBuf,
}

#[derive(Args)]
struct GenArgs {
    /// Tape store root (the directory containing bars/)
    #[arg(long)]
    base_dir: PathBuf,

    /// Instrument symbol, e.g. EURUSD
    #[arg(long)]
    symbol: String,

    /// Bar timeframe: 1m, 5m, 15m, 1h, 4h, 1d
    #[arg(long, default_value = "1m")]
    timeframe: String,

    /// Day to generate (YYYYMMDD)
    #[arg(long)]
    date: u32,

    /// Number of bars to write
    #[arg(long, default_value_t = 1440)]
    bars: u32,

    /// First bar's open price
    #[arg(long, default_value_t = 1.1000)]
    start_price: f64,

    /// Random walk seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => cmd_run(&args),
        Commands::Gen(args) => cmd_gen(&args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn parse_timeframe(raw: &str) -> Result<Timeframe> {
    raw.parse::<Timeframe>().map_err(|e| anyhow!(e))
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    let timeframe = parse_timeframe(&args.timeframe)?;

    let mut feature_specs = Vec::new();
    for &period in &args.ema {
        feature_specs.push(FeatureSpec {
            kind: FeatureKind::Ema,
            period,
        });
    }
    for &period in &args.atr {
        feature_specs.push(FeatureSpec {
            kind: FeatureKind::Atr,
            period,
        });
    }

    let cfg = EngineConfig {
        base_dir: args.base_dir.clone(),
        symbol: args.symbol.clone(),
        timeframe,
        start_ymd: args.start,
        end_ymd: args.end,
        spec: SymbolSpec {
            pip_size: args.pip_size,
            lot_size: args.lot_size,
        },
        costs: CostsModel {
            spread_pips: args.spread_pips,
            slippage_pips: args.slippage_pips,
            commission_per_lot: args.commission_per_lot,
        },
        initial_balance: args.balance,
        features: feature_specs,
    };

    let mut strategy = PluginStrategy::load(&args.plugin, &args.params)
        .context("loading strategy plugin")?;
    let outcome = engine::run(&cfg, &mut strategy)?;

    let strategy_name = args
        .plugin
        .file_stem()
        .map_or_else(|| "strategy".to_string(), |s| s.to_string_lossy().into_owned());
    let meta = engine::meta_json(&cfg, &strategy_name, &args.params);
    engine::write_run_pack(&args.out, &meta, &outcome)?;

    println!(
        "Backtest complete: {} bars, {} trades, {} fills, final equity {:.2}{}",
        outcome.bars,
        outcome.trades.len(),
        outcome.fills,
        outcome.final_equity,
        if outcome.account_blown {
            " (account blown)"
        } else {
            ""
        }
    );
    println!("Run pack written to {}", args.out.display());
    Ok(())
}

fn cmd_gen(args: &GenArgs) -> Result<()> {
    let timeframe = parse_timeframe(&args.timeframe)?;

    let date = tape::date::ymd_to_date(args.date)
        .ok_or_else(|| anyhow!("invalid date: {}", args.date))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date: {}", args.date))?;
    let base_ns = u64::try_from(
        midnight
            .and_utc()
            .timestamp_nanos_opt()
            .ok_or_else(|| anyhow!("date out of range: {}", args.date))?,
    )
    .map_err(|_| anyhow!("date precedes the epoch: {}", args.date))?;

    let path = tape::tape_path(&args.base_dir, &args.symbol, timeframe, args.date);
    let mut writer = tape::TapeWriter::create(&path)?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut price = args.start_price;

    for i in 0..args.bars {
        let open = price;
        let drift: f64 = rng.gen_range(-0.0004..0.0004);
        let close = (open + drift).max(0.0001);
        let wick_up: f64 = rng.gen_range(0.0..0.0002);
        let wick_down: f64 = rng.gen_range(0.0..0.0002);

        writer.append(&Bar {
            ts: Ts::from_nanos(base_ns + u64::from(i) * timeframe.bar_ns()),
            open,
            high: open.max(close) + wick_up,
            low: (open.min(close) - wick_down).max(0.0001),
            close,
            volume: rng.gen_range(50.0..150.0),
        })?;
        price = close;
    }

    let count = writer.record_count();
    writer.finish()?;

    info!(path = %path.display(), bars = count, "generated tape");
    println!("Wrote {count} bars to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn timeframes_parse() {
        assert!(parse_timeframe("1m").is_ok());
        assert!(parse_timeframe("90s").is_err());
    }
}
