//! Closed-trade log and its packed disk form

use common::ClosedTrade;
use runpack::TradeRecord;

/// Append-only log of closed trades
#[derive(Debug, Default, Clone)]
pub struct TradeLog {
    closed: Vec<ClosedTrade>,
}

impl TradeLog {
    /// Record one closed trade
    pub fn add(&mut self, trade: ClosedTrade) {
        self.closed.push(trade);
    }

    /// All closed trades, in realization order
    #[must_use]
    pub fn closed(&self) -> &[ClosedTrade] {
        &self.closed
    }

    /// Number of closed trades
    #[must_use]
    pub fn len(&self) -> usize {
        self.closed.len()
    }

    /// True before the first close
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.closed.is_empty()
    }

    /// Convert to packed run-pack records. `pnl_r`, `mae`, and `mfe` are
    /// reserved and stay zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_records(&self) -> Vec<TradeRecord> {
        self.closed
            .iter()
            .map(|t| TradeRecord {
                entry_ts: t.entry_ts.as_i64(),
                exit_ts: t.exit_ts.as_i64(),
                entry_bar: t.entry_bar,
                exit_bar: t.exit_bar,
                side: t.side.as_i8(),
                lots: t.lots as f32,
                entry_price: t.entry_price as f32,
                exit_price: t.exit_price as f32,
                pnl: t.pnl as f32,
                pnl_r: 0.0,
                mae: 0.0,
                mfe: 0.0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{TradeSide, Ts};

    #[test]
    fn converts_to_disk_records() {
        let mut log = TradeLog::default();
        log.add(ClosedTrade {
            entry_ts: Ts::from_nanos(100),
            exit_ts: Ts::from_nanos(200),
            entry_bar: 1,
            exit_bar: 2,
            side: TradeSide::Short,
            lots: 1.5,
            entry_price: 1.2,
            exit_price: 1.1,
            pnl: 15_000.0,
            commission: 3.0,
        });

        let records = log.to_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].side, -1);
        assert_eq!(records[0].entry_ts, 100);
        assert!((records[0].pnl - 15_000.0).abs() < 1e-3);
        assert!((records[0].pnl_r).abs() < f32::EPSILON);
    }
}
