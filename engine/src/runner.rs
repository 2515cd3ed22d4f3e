//! The engine loop
//!
//! One synchronous pass per run. Per bar, in strict order: populate the
//! context's bar view, update indicators, mark the broker to market, stop
//! on a blown account, drain closed trades into metrics, snapshot metrics,
//! materialize indicator histories, stamp the broker's bar index, and only
//! then hand control to the strategy.

use crate::bridge::{self, EngineUserState};
use crate::config::EngineConfig;
use crate::strategy::Strategy;
use anyhow::{Context, Result};
use broker::BrokerSim;
use features::{FeatureEngine, FeatureKind};
use metrics::{MetricsConfig, MetricsEngine, RunSeries, TradeLog};
use plugin::BarView;
use runpack::PackMeta;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tape::TapeReader;
use tracing::info;

/// Everything a completed run produced
pub struct RunOutcome {
    /// Per-bar metric columns
    pub series: RunSeries,
    /// Closed-trade log
    pub trades: TradeLog,
    /// Bars fully processed
    pub bars: usize,
    /// Market orders executed
    pub fills: usize,
    /// Equity at the end of the run
    pub final_equity: f64,
    /// Balance at the end of the run
    pub final_balance: f64,
    /// True if the run terminated early on a blown account
    pub account_blown: bool,
}

/// Replay the configured range through `strategy`.
///
/// # Errors
///
/// Propagates tape configuration/format/I/O failures and strategy errors.
/// A blown account is not an error; the run ends early and is reported in
/// the outcome.
#[allow(clippy::cast_possible_truncation)]
pub fn run(cfg: &EngineConfig, strategy: &mut dyn Strategy) -> Result<RunOutcome> {
    let mut reader = TapeReader::new(
        &cfg.base_dir,
        &cfg.symbol,
        cfg.timeframe,
        cfg.start_ymd,
        cfg.end_ymd,
    )
    .context("opening tape reader")?;

    let mut metrics = MetricsEngine::new(MetricsConfig {
        initial_equity: cfg.initial_balance,
        annualization_bars: cfg.annualization_bars(),
    });

    let mut user = Box::new(EngineUserState {
        features: FeatureEngine::new(),
        broker: BrokerSim::new(cfg.spec, cfg.costs, cfg.initial_balance),
    });
    for f in &cfg.features {
        match f.kind {
            FeatureKind::Ema => user.features.require_ema(f.period),
            FeatureKind::Atr => user.features.require_atr(f.period),
        };
    }

    let mut ctx = bridge::init_ctx(&mut user);

    info!(
        symbol = %cfg.symbol,
        timeframe = %cfg.timeframe,
        start = cfg.start_ymd,
        end = cfg.end_ymd,
        "starting backtest"
    );

    bridge::rebind(&mut ctx, &mut user);
    strategy.on_start(&mut ctx).context("strategy on_start")?;

    let mut bars = 0usize;
    let mut account_blown = false;

    while let Some(bar) = reader.next_bar().context("reading tape")? {
        ctx.bar = BarView {
            ts: bar.ts.as_i64(),
            open: bar.open as f32,
            high: bar.high as f32,
            low: bar.low as f32,
            close: bar.close as f32,
            volume: bar.volume,
            index: bars,
        };

        user.features
            .update(bar.open, bar.high, bar.low, bar.close, f64::from(bar.volume));
        user.broker.on_bar(bar.ts, bar.close);

        if user.broker.account_blown() {
            account_blown = true;
            break;
        }

        for trade in user.broker.drain_closed_trades() {
            metrics.on_trade_closed(&trade);
        }
        metrics.on_bar(
            bar.ts,
            user.broker.balance(),
            user.broker.equity(),
            user.broker.unrealized_pnl(),
            user.broker.in_market(),
        );

        user.features.append_history();
        user.broker.set_bar_index(bars as i32);

        bridge::rebind(&mut ctx, &mut user);
        strategy.on_bar(&mut ctx).context("strategy on_bar")?;

        bars += 1;
        if bars % 1_000_000 == 0 {
            info!(bars, equity = user.broker.equity(), "replaying");
        }
    }

    // on_end runs even when the account blew up mid-run.
    bridge::rebind(&mut ctx, &mut user);
    strategy.on_end(&mut ctx).context("strategy on_end")?;

    for trade in user.broker.drain_closed_trades() {
        metrics.on_trade_closed(&trade);
    }
    metrics.finalize();

    let final_equity = user.broker.equity();
    let final_balance = user.broker.balance();
    let fills = user.broker.fills().len();
    let (series, trades) = metrics.into_parts();

    info!(
        bars,
        fills,
        trades = trades.len(),
        final_equity,
        account_blown,
        "backtest complete"
    );

    Ok(RunOutcome {
        series,
        trades,
        bars,
        fills,
        final_equity,
        final_balance,
        account_blown,
    })
}

/// Serialize a finished run to a run-pack file.
///
/// # Errors
///
/// Propagates writer failures. Nothing is written on a column-length
/// mismatch.
pub fn write_run_pack(path: &Path, meta_json: &str, outcome: &RunOutcome) -> Result<()> {
    let meta = PackMeta {
        json: meta_json.to_string(),
        created_unix_ms: unix_ms(),
    };
    let columns = outcome.series.columns();
    let records = outcome.trades.to_records();

    runpack::write_pack(path, &meta, &columns, &records)
        .with_context(|| format!("writing run pack {}", path.display()))
}

/// Compose the conventional run-pack meta blob.
#[must_use]
pub fn meta_json(cfg: &EngineConfig, strategy_name: &str, params: &str) -> String {
    let params: serde_json::Value =
        serde_json::from_str(params).unwrap_or(serde_json::Value::Null);
    serde_json::json!({
        "symbol": cfg.symbol,
        "tf": cfg.timeframe.as_str(),
        "start": cfg.start_ymd,
        "end": cfg.end_ymd,
        "initial_balance": cfg.initial_balance,
        "strategy": strategy_name,
        "params": params,
    })
    .to_string()
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(0))
        .unwrap_or(0)
}
