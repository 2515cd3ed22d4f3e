//! Per-bar output series, structure-of-arrays
//!
//! Every column has the same length as `ts`. Columns are exposed to the
//! run-pack writer as borrowed descriptors; the TOC names here are the
//! stable identifiers downstream tools rely on.

use runpack::{Column, ColumnData};

/// Dense per-bar metric columns for one run
#[derive(Debug, Default, Clone)]
pub struct RunSeries {
    /// Bar timestamps, nanoseconds (time axis; all other columns align)
    pub ts: Vec<i64>,

    /// Realized account balance
    pub balance: Vec<f32>,
    /// Balance plus unrealized pnl
    pub equity: Vec<f32>,
    /// Current equity shortfall from the running equity peak (≤ 0)
    pub dd_equity: Vec<f32>,
    /// Current balance shortfall from the running balance peak (≤ 0)
    pub dd_balance: Vec<f32>,

    /// Running average equity drawdown over bars spent in drawdown
    pub avg_equity_dd: Vec<f32>,
    /// Running average balance drawdown over bars spent in drawdown
    pub avg_balance_dd: Vec<f32>,

    /// Fraction of bars spent in equity drawdown
    pub pct_in_equity_dd: Vec<f32>,
    /// Fraction of bars spent in balance drawdown
    pub pct_in_balance_dd: Vec<f32>,
    /// Bars spent in equity drawdown so far
    pub bars_in_equity_dd: Vec<i32>,
    /// Bars spent in balance drawdown so far
    pub bars_in_balance_dd: Vec<i32>,

    /// Mark-to-market pnl of the open position
    pub unrealized_pnl: Vec<f32>,
    /// Running equity peak
    pub max_equity: Vec<f32>,
    /// Running balance peak
    pub max_balance: Vec<f32>,
    /// Worst equity drawdown so far (≤ 0)
    pub max_equity_dd: Vec<f32>,
    /// Worst balance drawdown so far (≤ 0)
    pub max_balance_dd: Vec<f32>,

    /// Worst within-day equity shortfall so far (≤ 0)
    pub max_equity_daily_dd: Vec<f32>,
    /// Worst within-day balance shortfall so far (≤ 0)
    pub max_balance_daily_dd: Vec<f32>,

    /// Equity minus initial equity
    pub net_profit: Vec<f32>,

    /// Closed trades so far
    pub total_trades: Vec<i32>,
    /// Closed trades with positive pnl
    pub winning_trades: Vec<i32>,
    /// Closed trades with negative pnl
    pub losing_trades: Vec<i32>,

    /// wins / total trades
    pub win_rate: Vec<f32>,
    /// Sum of positive trade pnls
    pub gross_profit: Vec<f32>,
    /// Sum of magnitudes of negative trade pnls
    pub gross_loss: Vec<f32>,
    /// gross profit / gross loss
    pub profit_factor: Vec<f32>,

    /// win_rate·avg_win − (1 − win_rate)·avg_loss
    pub expected_value: Vec<f32>,
    /// Average winning trade pnl
    pub avg_win: Vec<f32>,
    /// Average losing trade magnitude
    pub avg_loss: Vec<f32>,
    /// avg_win / avg_loss
    pub profit_loss_ratio: Vec<f32>,

    /// Reserved (pnl_r-based expectancy)
    pub expectancy_r: Vec<f32>,
    /// Median closed-trade pnl, refreshed on a cadence
    pub median_pnl: Vec<f32>,
    /// Share of gross profit from the best decile of trades
    pub top10_contrib: Vec<f32>,
    /// Closed trades per elapsed calendar day
    pub trades_per_day: Vec<f32>,

    /// Fraction of bars with an open position
    pub time_in_market: Vec<f32>,

    /// Sample volatility of per-bar log returns
    pub ret_vol: Vec<f32>,
    /// Annualized Sharpe ratio
    pub sharpe: Vec<f32>,
    /// Annualized return over worst drawdown fraction
    pub calmar: Vec<f32>,
    /// Annualized Sortino ratio
    pub sortino: Vec<f32>,
}

impl RunSeries {
    /// Number of bars recorded
    #[must_use]
    pub fn len(&self) -> usize {
        self.ts.len()
    }

    /// True before the first bar
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ts.is_empty()
    }

    /// Borrowed column descriptors in canonical file order
    #[must_use]
    pub fn columns(&self) -> Vec<Column<'_>> {
        fn col<'a>(name: &'a str, data: ColumnData<'a>) -> Column<'a> {
            Column { name, data }
        }

        vec![
            col("ts", ColumnData::I64(&self.ts)),
            col("balance", ColumnData::F32(&self.balance)),
            col("equity", ColumnData::F32(&self.equity)),
            col("dd_equity", ColumnData::F32(&self.dd_equity)),
            col("dd_balance", ColumnData::F32(&self.dd_balance)),
            col("avg_equity_dd", ColumnData::F32(&self.avg_equity_dd)),
            col("avg_balance_dd", ColumnData::F32(&self.avg_balance_dd)),
            col("pct_in_equity_dd", ColumnData::F32(&self.pct_in_equity_dd)),
            col("pct_in_balance_dd", ColumnData::F32(&self.pct_in_balance_dd)),
            col("bars_in_equity_dd", ColumnData::I32(&self.bars_in_equity_dd)),
            col(
                "bars_in_balance_dd",
                ColumnData::I32(&self.bars_in_balance_dd),
            ),
            col("unrealized_pnl", ColumnData::F32(&self.unrealized_pnl)),
            col("max_equity", ColumnData::F32(&self.max_equity)),
            col("max_balance", ColumnData::F32(&self.max_balance)),
            col("max_equity_dd", ColumnData::F32(&self.max_equity_dd)),
            col("max_balance_dd", ColumnData::F32(&self.max_balance_dd)),
            col(
                "max_equity_daily_dd",
                ColumnData::F32(&self.max_equity_daily_dd),
            ),
            col(
                "max_balance_daily_dd",
                ColumnData::F32(&self.max_balance_daily_dd),
            ),
            col("net_profit", ColumnData::F32(&self.net_profit)),
            col("total_trades", ColumnData::I32(&self.total_trades)),
            col("winning_trades", ColumnData::I32(&self.winning_trades)),
            col("losing_trades", ColumnData::I32(&self.losing_trades)),
            col("win_rate", ColumnData::F32(&self.win_rate)),
            col("gross_profit", ColumnData::F32(&self.gross_profit)),
            col("gross_loss", ColumnData::F32(&self.gross_loss)),
            col("profit_factor", ColumnData::F32(&self.profit_factor)),
            col("expected_value", ColumnData::F32(&self.expected_value)),
            col("avg_win", ColumnData::F32(&self.avg_win)),
            col("avg_loss", ColumnData::F32(&self.avg_loss)),
            col("profit_loss_ratio", ColumnData::F32(&self.profit_loss_ratio)),
            col("expectancy_r", ColumnData::F32(&self.expectancy_r)),
            col("median_pnl", ColumnData::F32(&self.median_pnl)),
            col("top10_contrib", ColumnData::F32(&self.top10_contrib)),
            col("trades_per_day", ColumnData::F32(&self.trades_per_day)),
            col("time_in_market", ColumnData::F32(&self.time_in_market)),
            col("ret_vol", ColumnData::F32(&self.ret_vol)),
            col("sharpe", ColumnData::F32(&self.sharpe)),
            col("calmar", ColumnData::F32(&self.calmar)),
            col("sortino", ColumnData::F32(&self.sortino)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_cover_every_field_once() {
        let series = RunSeries::default();
        let cols = series.columns();
        assert_eq!(cols.len(), 39);

        let mut names: Vec<&str> = cols.iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 39, "duplicate column names");
        assert_eq!(cols[0].name, "ts");
    }
}
