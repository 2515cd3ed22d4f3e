//! The metrics accumulator
//!
//! Consumes one `(ts, balance, equity, unrealized, in_market)` snapshot per
//! bar and closed-trade events between bars; appends one element to every
//! output column per bar.

use crate::log::TradeLog;
use crate::series::RunSeries;
use crate::welford::Welford;
use common::{ClosedTrade, Ts};
use std::cmp::Ordering;
use tracing::debug;

/// Accumulator configuration
#[derive(Debug, Clone, Copy)]
pub struct MetricsConfig {
    /// Equity baseline for net-profit; normally the initial balance
    pub initial_equity: f64,
    /// Bars per year for Sharpe/Sortino annualization
    pub annualization_bars: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            initial_equity: 100_000.0,
            // 252 trading days of 1-minute bars
            annualization_bars: 252 * 24 * 60,
        }
    }
}

/// Tail statistics (median, top decile) refresh cadence in bars
const TAIL_REFRESH_BARS: usize = 500;

/// One-pass metrics engine
pub struct MetricsEngine {
    cfg: MetricsConfig,
    series: RunSeries,
    trades: TradeLog,
    closed_pnls: Vec<f64>,

    eq0: f64,

    max_equity: f64,
    max_balance: f64,
    max_equity_dd: f64,
    max_balance_dd: f64,
    sum_equity_dd: f64,
    sum_balance_dd: f64,
    bars_in_equity_dd: i32,
    bars_in_balance_dd: i32,

    current_day: Option<u64>,
    day_start_equity: f64,
    day_start_balance: f64,
    max_equity_daily_dd: f64,
    max_balance_daily_dd: f64,

    total_trades: i32,
    wins: i32,
    losses: i32,
    gross_profit: f64,
    gross_loss: f64,
    sum_win: f64,
    sum_loss: f64,

    first_ts: Option<Ts>,
    last_ts: Ts,

    prev_equity: Option<f64>,
    returns: Welford,
    downside: Welford,

    bars_in_market: i32,

    last_median: f64,
    last_top10: f64,
}

impl MetricsEngine {
    /// Create an engine with the given configuration
    #[must_use]
    pub fn new(cfg: MetricsConfig) -> Self {
        Self {
            cfg,
            series: RunSeries::default(),
            trades: TradeLog::default(),
            closed_pnls: Vec::new(),
            eq0: f64::NAN,
            max_equity: f64::NEG_INFINITY,
            max_balance: f64::NEG_INFINITY,
            max_equity_dd: 0.0,
            max_balance_dd: 0.0,
            sum_equity_dd: 0.0,
            sum_balance_dd: 0.0,
            bars_in_equity_dd: 0,
            bars_in_balance_dd: 0,
            current_day: None,
            day_start_equity: f64::NAN,
            day_start_balance: f64::NAN,
            max_equity_daily_dd: 0.0,
            max_balance_daily_dd: 0.0,
            total_trades: 0,
            wins: 0,
            losses: 0,
            gross_profit: 0.0,
            gross_loss: 0.0,
            sum_win: 0.0,
            sum_loss: 0.0,
            first_ts: None,
            last_ts: Ts::from_nanos(0),
            prev_equity: None,
            returns: Welford::default(),
            downside: Welford::default(),
            bars_in_market: 0,
            last_median: f64::NAN,
            last_top10: f64::NAN,
        }
    }

    /// Record one closed trade. Called zero or more times between bars.
    pub fn on_trade_closed(&mut self, trade: &ClosedTrade) {
        self.trades.add(*trade);
        self.closed_pnls.push(trade.pnl);
        self.total_trades += 1;

        if trade.pnl > 0.0 {
            self.wins += 1;
            self.gross_profit += trade.pnl;
            self.sum_win += trade.pnl;
        } else if trade.pnl < 0.0 {
            self.losses += 1;
            let magnitude = -trade.pnl;
            self.gross_loss += magnitude;
            self.sum_loss += magnitude;
        }
    }

    /// Consume one bar snapshot and append to every output column.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::too_many_lines
    )]
    pub fn on_bar(&mut self, ts: Ts, balance: f64, equity: f64, unrealized: f64, in_market: bool) {
        if self.series.is_empty() {
            self.eq0 = self.cfg.initial_equity;
            self.first_ts = Some(ts);
        }
        self.last_ts = ts;

        self.update_drawdown(equity, balance);
        self.update_daily_dd(ts, equity, balance);
        self.update_return_stats(equity);

        let net_profit = equity - self.eq0;

        // Trade aggregates as of this bar.
        let win_rate = if self.total_trades > 0 {
            f64::from(self.wins) / f64::from(self.total_trades)
        } else {
            f64::NAN
        };
        let avg_win = if self.wins > 0 {
            self.sum_win / f64::from(self.wins)
        } else {
            f64::NAN
        };
        let avg_loss = if self.losses > 0 {
            self.sum_loss / f64::from(self.losses)
        } else {
            f64::NAN
        };
        let profit_factor = if self.gross_loss > 0.0 {
            self.gross_profit / self.gross_loss
        } else if self.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            f64::NAN
        };
        let expected_value = if win_rate.is_nan() || avg_win.is_nan() || avg_loss.is_nan() {
            f64::NAN
        } else {
            win_rate * avg_win - (1.0 - win_rate) * avg_loss
        };
        let profit_loss_ratio = if avg_win.is_nan() || avg_loss.is_nan() || avg_loss <= 0.0 {
            f64::NAN
        } else {
            avg_win / avg_loss
        };

        // Trades per elapsed calendar day, nanosecond clock.
        let trades_per_day = match self.first_ts {
            Some(first) if self.last_ts > first => {
                let days =
                    (self.last_ts.as_nanos() - first.as_nanos()) as f64 / common::NS_PER_DAY as f64;
                if days > 0.0 {
                    f64::from(self.total_trades) / days
                } else {
                    f64::NAN
                }
            }
            _ => f64::NAN,
        };

        // Running time-in-market fraction (denominator includes this bar).
        let bars_total = self.series.len() + 1;
        if in_market {
            self.bars_in_market += 1;
        }
        let time_in_market = f64::from(self.bars_in_market) / bars_total as f64;

        // Median / top-decile contribution: exact refresh is O(trades), so
        // only every TAIL_REFRESH_BARS bars (and while the run is young);
        // carried forward in between, always refreshed at finalize.
        if !self.closed_pnls.is_empty() {
            let bars_before = self.series.len();
            if bars_before % TAIL_REFRESH_BARS == 0 || bars_before < 10 {
                let (median, top10) = self.tail_stats();
                self.last_median = median;
                self.last_top10 = top10;
            }
        }

        // Volatility / Sharpe / Sortino on log returns.
        let mut ret_vol = f64::NAN;
        let mut sharpe = f64::NAN;
        let mut sortino = f64::NAN;
        if let Some(vol) = self.returns.sample_std() {
            ret_vol = vol;
            let ann = f64::from(self.cfg.annualization_bars).sqrt();
            if vol > 0.0 {
                sharpe = self.returns.mean() / vol * ann;
            }
            if let Some(dstd) = self.downside.sample_std() {
                if dstd > 0.0 {
                    sortino = self.returns.mean() / dstd * ann;
                }
            }
        }

        // Calmar: annualized return over the worst drawdown fraction.
        let mut calmar = f64::NAN;
        if let (Some(&eq_first), Some(first)) = (self.series.equity.first(), self.first_ts) {
            let years = (self.last_ts.as_nanos().saturating_sub(first.as_nanos())) as f64
                / (common::NS_PER_DAY as f64 * 365.0);
            if years > 0.0 && eq_first > 0.0 && self.max_equity > 0.0 {
                let total_return = equity / f64::from(eq_first) - 1.0;
                let annualized = (1.0 + total_return).powf(1.0 / years) - 1.0;
                let max_dd_pct = self.max_equity_dd / self.max_equity;
                if max_dd_pct < 0.0 {
                    calmar = annualized / max_dd_pct.abs();
                }
            }
        }

        // Append one element to every column.
        let s = &mut self.series;
        s.ts.push(ts.as_i64());

        s.balance.push(balance as f32);
        s.equity.push(equity as f32);
        s.dd_equity.push((equity - self.max_equity) as f32);
        s.dd_balance.push((balance - self.max_balance) as f32);

        s.avg_equity_dd.push(if self.bars_in_equity_dd > 0 {
            (self.sum_equity_dd / f64::from(self.bars_in_equity_dd)) as f32
        } else {
            0.0
        });
        s.avg_balance_dd.push(if self.bars_in_balance_dd > 0 {
            (self.sum_balance_dd / f64::from(self.bars_in_balance_dd)) as f32
        } else {
            0.0
        });

        s.pct_in_equity_dd
            .push((f64::from(self.bars_in_equity_dd) / bars_total as f64) as f32);
        s.pct_in_balance_dd
            .push((f64::from(self.bars_in_balance_dd) / bars_total as f64) as f32);
        s.bars_in_equity_dd.push(self.bars_in_equity_dd);
        s.bars_in_balance_dd.push(self.bars_in_balance_dd);

        s.unrealized_pnl.push(unrealized as f32);
        s.max_equity.push(self.max_equity as f32);
        s.max_balance.push(self.max_balance as f32);
        s.max_equity_dd.push(self.max_equity_dd as f32);
        s.max_balance_dd.push(self.max_balance_dd as f32);

        s.max_equity_daily_dd.push(self.max_equity_daily_dd as f32);
        s.max_balance_daily_dd.push(self.max_balance_daily_dd as f32);

        s.net_profit.push(net_profit as f32);

        s.total_trades.push(self.total_trades);
        s.winning_trades.push(self.wins);
        s.losing_trades.push(self.losses);

        s.win_rate.push(win_rate as f32);
        s.gross_profit.push(self.gross_profit as f32);
        s.gross_loss.push(self.gross_loss as f32);
        s.profit_factor.push(profit_factor as f32);

        s.expected_value.push(expected_value as f32);
        s.avg_win.push(avg_win as f32);
        s.avg_loss.push(avg_loss as f32);
        s.profit_loss_ratio.push(profit_loss_ratio as f32);

        s.expectancy_r.push(f32::NAN);
        s.median_pnl.push(self.last_median as f32);
        s.top10_contrib.push(self.last_top10 as f32);
        s.trades_per_day.push(trades_per_day as f32);

        s.time_in_market.push(time_in_market as f32);

        s.ret_vol.push(ret_vol as f32);
        s.sharpe.push(sharpe as f32);
        s.calmar.push(calmar as f32);
        s.sortino.push(sortino as f32);
    }

    /// Refresh the tail statistics once more and patch the final bar.
    /// Safe on empty runs.
    #[allow(clippy::cast_possible_truncation)]
    pub fn finalize(&mut self) {
        if self.closed_pnls.is_empty() || self.series.is_empty() {
            return;
        }
        let (median, top10) = self.tail_stats();
        self.last_median = median;
        self.last_top10 = top10;
        if let Some(slot) = self.series.median_pnl.last_mut() {
            *slot = median as f32;
        }
        if let Some(slot) = self.series.top10_contrib.last_mut() {
            *slot = top10 as f32;
        }
        debug!(
            bars = self.series.len(),
            trades = self.trades.len(),
            "metrics finalized"
        );
    }

    /// The per-bar output columns
    #[must_use]
    pub const fn series(&self) -> &RunSeries {
        &self.series
    }

    /// The closed-trade log
    #[must_use]
    pub const fn trades(&self) -> &TradeLog {
        &self.trades
    }

    /// Consume the engine, yielding the series and trade log
    #[must_use]
    pub fn into_parts(self) -> (RunSeries, TradeLog) {
        (self.series, self.trades)
    }

    fn update_drawdown(&mut self, equity: f64, balance: f64) {
        if !self.max_equity.is_finite() {
            self.max_equity = equity;
        }
        if !self.max_balance.is_finite() {
            self.max_balance = balance;
        }
        if equity > self.max_equity {
            self.max_equity = equity;
        }
        if balance > self.max_balance {
            self.max_balance = balance;
        }

        let dd_equity = equity - self.max_equity;
        let dd_balance = balance - self.max_balance;

        if dd_equity < 0.0 {
            self.bars_in_equity_dd += 1;
            self.sum_equity_dd += dd_equity;
        }
        if dd_balance < 0.0 {
            self.bars_in_balance_dd += 1;
            self.sum_balance_dd += dd_balance;
        }

        if dd_equity < self.max_equity_dd {
            self.max_equity_dd = dd_equity;
        }
        if dd_balance < self.max_balance_dd {
            self.max_balance_dd = dd_balance;
        }
    }

    fn update_daily_dd(&mut self, ts: Ts, equity: f64, balance: f64) {
        let day = ts.day_index();
        if self.current_day != Some(day) {
            self.current_day = Some(day);
            self.day_start_equity = equity;
            self.day_start_balance = balance;
        }

        let d_equity = equity - self.day_start_equity;
        let d_balance = balance - self.day_start_balance;
        if d_equity < self.max_equity_daily_dd {
            self.max_equity_daily_dd = d_equity;
        }
        if d_balance < self.max_balance_daily_dd {
            self.max_balance_daily_dd = d_balance;
        }
    }

    fn update_return_stats(&mut self, equity: f64) {
        let Some(prev) = self.prev_equity else {
            self.prev_equity = Some(equity);
            return;
        };
        self.prev_equity = Some(equity);

        // Log returns are undefined around non-positive equity.
        if prev <= 0.0 || equity <= 0.0 {
            return;
        }

        let r = (equity / prev).ln();
        self.returns.push(r);
        if r < 0.0 {
            self.downside.push(r);
        }
    }

    /// Exact median and top-decile contribution over all closed pnls
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
    fn tail_stats(&self) -> (f64, f64) {
        let mut sorted = self.closed_pnls.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let median = sorted[sorted.len() / 2];

        let k = ((sorted.len() as f64 * 0.10).ceil() as usize).max(1);
        let top_sum: f64 = sorted.iter().rev().take(k).filter(|p| **p > 0.0).sum();
        let top10 = if self.gross_profit > 0.0 {
            top_sum / self.gross_profit
        } else {
            f64::NAN
        };

        (median, top10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{NS_PER_DAY, TradeSide};

    const MINUTE_NS: u64 = 60_000_000_000;

    fn engine() -> MetricsEngine {
        MetricsEngine::new(MetricsConfig {
            initial_equity: 100_000.0,
            annualization_bars: 252 * 24 * 60,
        })
    }

    fn flat_bar(m: &mut MetricsEngine, i: u64, equity: f64) {
        m.on_bar(Ts::from_nanos(i * MINUTE_NS), equity, equity, 0.0, false);
    }

    fn trade(pnl: f64) -> ClosedTrade {
        ClosedTrade {
            entry_ts: Ts::from_nanos(0),
            exit_ts: Ts::from_nanos(MINUTE_NS),
            entry_bar: 0,
            exit_bar: 1,
            side: TradeSide::Long,
            lots: 1.0,
            entry_price: 1.0,
            exit_price: 1.0,
            pnl,
            commission: 0.0,
        }
    }

    fn approx32(a: f32, b: f64) -> bool {
        (f64::from(a) - b).abs() < 1e-4 * b.abs().max(1.0)
    }

    #[test]
    fn single_bar_leaves_ratios_undefined() {
        let mut m = engine();
        flat_bar(&mut m, 0, 100_000.0);

        let s = m.series();
        assert_eq!(s.len(), 1);
        assert!(s.ret_vol[0].is_nan());
        assert!(s.sharpe[0].is_nan());
        assert!(s.sortino[0].is_nan());
        assert!(s.calmar[0].is_nan());
        assert!(s.win_rate[0].is_nan());
        assert!((s.dd_equity[0]).abs() < f32::EPSILON);
        assert!((s.net_profit[0]).abs() < f32::EPSILON);
        assert!((s.time_in_market[0]).abs() < f32::EPSILON);
    }

    #[test]
    fn every_column_tracks_bar_count() {
        let mut m = engine();
        for i in 0..7 {
            flat_bar(&mut m, i, 100_000.0 + i as f64);
        }

        let n = m.series().len();
        for col in m.series().columns() {
            assert_eq!(col.data.len(), n, "column {} out of step", col.name);
        }
    }

    #[test]
    fn drawdown_peaks_and_troughs() {
        let mut m = engine();
        for (i, eq) in [100.0, 110.0, 100.0, 105.0, 90.0].into_iter().enumerate() {
            flat_bar(&mut m, i as u64, eq);
        }

        let s = m.series();
        // Peak is monotone non-decreasing.
        assert_eq!(s.max_equity, vec![100.0, 110.0, 110.0, 110.0, 110.0]);
        assert_eq!(s.dd_equity[2], -10.0);
        assert_eq!(s.dd_equity[4], -20.0);
        assert_eq!(s.max_equity_dd[4], -20.0);
        assert!(s.max_equity_dd.iter().all(|&d| d <= 0.0));
        assert_eq!(s.bars_in_equity_dd[4], 3);
    }

    #[test]
    fn trade_aggregates_and_derived_ratios() {
        let mut m = engine();
        m.on_trade_closed(&trade(100.0));
        m.on_trade_closed(&trade(50.0));
        m.on_trade_closed(&trade(-30.0));
        flat_bar(&mut m, 0, 100_000.0);

        let s = m.series();
        assert_eq!(s.total_trades[0], 3);
        assert_eq!(s.winning_trades[0], 2);
        assert_eq!(s.losing_trades[0], 1);
        assert!(approx32(s.win_rate[0], 2.0 / 3.0));
        assert!(approx32(s.avg_win[0], 75.0));
        assert!(approx32(s.avg_loss[0], 30.0));
        assert!(approx32(s.profit_factor[0], 5.0));
        assert!(approx32(s.expected_value[0], 40.0));
        assert!(approx32(s.profit_loss_ratio[0], 2.5));
    }

    #[test]
    fn profit_factor_infinite_without_losses() {
        let mut m = engine();
        m.on_trade_closed(&trade(10.0));
        flat_bar(&mut m, 0, 100_000.0);
        assert!(m.series().profit_factor[0].is_infinite());
    }

    #[test]
    fn volatility_matches_two_pass_welford() {
        let mut m = engine();
        let equities = [100_000.0, 100_100.0, 99_900.0, 100_200.0, 100_050.0];
        for (i, eq) in equities.into_iter().enumerate() {
            flat_bar(&mut m, i as u64, eq);
        }

        let returns: Vec<f64> = equities
            .windows(2)
            .map(|w| (w[1] / w[0]).ln())
            .collect();
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        let vol = var.sqrt();

        let s = m.series();
        assert!(approx32(s.ret_vol[4], vol));
        let sharpe = mean / vol * f64::from(252u32 * 24 * 60).sqrt();
        assert!(approx32(s.sharpe[4], sharpe));
    }

    #[test]
    fn daily_drawdown_buckets_by_calendar_day() {
        let mut m = engine();
        let bars = [
            (0, 100.0),
            (NS_PER_DAY / 2, 90.0),
            (NS_PER_DAY + 1, 95.0),
            (NS_PER_DAY + 2, 70.0),
        ];
        for (ts, eq) in bars {
            m.on_bar(Ts::from_nanos(ts), eq, eq, 0.0, false);
        }

        let s = m.series();
        assert_eq!(s.max_equity_daily_dd[1], -10.0);
        // New day re-anchors before the drop.
        assert_eq!(s.max_equity_daily_dd[2], -10.0);
        assert_eq!(s.max_equity_daily_dd[3], -25.0);
    }

    #[test]
    fn trades_per_day_uses_nanosecond_clock() {
        let mut m = engine();
        m.on_trade_closed(&trade(10.0));
        m.on_bar(Ts::from_nanos(0), 1.0, 1.0, 0.0, false);
        m.on_bar(Ts::from_nanos(2 * NS_PER_DAY), 1.0, 1.0, 0.0, false);

        assert!(approx32(m.series().trades_per_day[1], 0.5));
    }

    #[test]
    fn time_in_market_is_running_fraction() {
        let mut m = engine();
        for i in 0..4 {
            m.on_bar(Ts::from_nanos(i * MINUTE_NS), 1.0, 1.0, 0.0, i % 2 == 0);
        }
        assert!(approx32(m.series().time_in_market[3], 0.5));
    }

    #[test]
    fn tail_stats_carry_between_refreshes_and_finalize() {
        let mut m = engine();

        // Young run: refresh happens every bar while under 10 bars.
        m.on_trade_closed(&trade(20.0));
        m.on_trade_closed(&trade(-5.0));
        m.on_trade_closed(&trade(10.0));
        flat_bar(&mut m, 0, 100_000.0);
        // Sorted pnls: [-5, 10, 20] -> median 10; top decile k=1 -> 20/30.
        assert!(approx32(m.series().median_pnl[0], 10.0));
        assert!(approx32(m.series().top10_contrib[0], 20.0 / 30.0));

        // Past the young window, new trades don't refresh mid-cadence...
        for i in 1..15 {
            flat_bar(&mut m, i, 100_000.0);
        }
        m.on_trade_closed(&trade(100.0));
        flat_bar(&mut m, 15, 100_000.0);
        assert!(approx32(m.series().median_pnl[15], 10.0));

        // ...but finalize always does one last exact refresh.
        m.finalize();
        // Sorted: [-5, 10, 20, 100] -> median index 2 -> 20.
        assert!(approx32(m.series().median_pnl[15], 20.0));
        assert!(approx32(m.series().top10_contrib[15], 100.0 / 130.0));
    }

    #[test]
    fn empty_run_finalizes_cleanly() {
        let mut m = engine();
        m.finalize();
        assert!(m.series().is_empty());
        assert!(m.trades().is_empty());

        let (series, trades) = m.into_parts();
        assert_eq!(series.len(), 0);
        assert_eq!(trades.len(), 0);
    }
}
