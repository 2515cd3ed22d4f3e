//! Broker simulation against mid prices
//!
//! All prices handed to the simulator are mids (typically the bar close);
//! fills pay half the spread plus slippage on top.

use common::{ClosedTrade, CostsModel, SymbolSpec, TradeSide, Ts};
use tracing::{debug, warn};

/// Direction of a fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Buy at the ask
    Buy,
    /// Sell at the bid
    Sell,
}

/// One executed market order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    /// Monotonically increasing identifier, starting at 1
    pub id: u64,
    /// Execution timestamp
    pub ts: Ts,
    /// Fill direction
    pub side: Side,
    /// Lots executed
    pub lots: f64,
    /// Executed price (mid adjusted for spread and slippage)
    pub price: f64,
    /// Commission charged for this fill
    pub commission: f64,
    /// Reserved; realization is reported via [`ClosedTrade`] events
    pub realized_pnl: f64,
}

/// Netting broker: single net position per symbol, marked to mid every bar
pub struct BrokerSim {
    spec: SymbolSpec,
    costs: CostsModel,

    balance: f64,
    equity: f64,
    unrealized: f64,

    /// Signed net position: positive long, negative short, zero flat
    position_lots: f64,
    /// Weighted-average entry price; NaN iff flat
    avg_entry: f64,

    last_mid: f64,
    next_fill_id: u64,
    fills: Vec<Fill>,
    closed: Vec<ClosedTrade>,

    account_blown: bool,

    /// Bar index stamped by the engine loop, -1 before the first bar
    bar_index: i32,
    entry_ts: Ts,
    entry_bar: i32,
}

impl BrokerSim {
    /// Create a simulator with the given instrument, costs, and balance
    #[must_use]
    pub fn new(spec: SymbolSpec, costs: CostsModel, initial_balance: f64) -> Self {
        Self {
            spec,
            costs,
            balance: initial_balance,
            equity: initial_balance,
            unrealized: 0.0,
            position_lots: 0.0,
            avg_entry: f64::NAN,
            last_mid: f64::NAN,
            next_fill_id: 1,
            fills: Vec::new(),
            closed: Vec::new(),
            account_blown: false,
            bar_index: -1,
            entry_ts: Ts::from_nanos(0),
            entry_bar: -1,
        }
    }

    /// Mark the position to `mid`, refreshing unrealized pnl and equity.
    /// Equity at or below zero blows the account: balances clamp to zero,
    /// the position is liquidated in bookkeeping (no fill), and further
    /// orders become no-ops.
    pub fn on_bar(&mut self, ts: Ts, mid: f64) {
        self.last_mid = mid;

        if self.position_lots == 0.0 || self.avg_entry.is_nan() {
            self.unrealized = 0.0;
            self.equity = self.balance;
        } else {
            let units = self.position_lots * self.spec.lot_size;
            self.unrealized = (mid - self.avg_entry) * units;
            self.equity = self.balance + self.unrealized;
        }

        if self.equity <= 0.0 {
            if !self.account_blown {
                warn!(%ts, balance = self.balance, "account blown, liquidating");
            }
            self.balance = 0.0;
            self.equity = 0.0;
            self.unrealized = 0.0;
            self.position_lots = 0.0;
            self.avg_entry = f64::NAN;
            self.entry_ts = Ts::from_nanos(0);
            self.entry_bar = -1;
            self.account_blown = true;
        }
    }

    /// Buy at market. Returns the fill id, or 0 if `lots` is not positive
    /// or the account is blown.
    pub fn buy_market(&mut self, ts: Ts, mid: f64, lots: f64) -> u64 {
        self.exec(Side::Buy, ts, mid, lots)
    }

    /// Sell at market. Returns the fill id, or 0 if `lots` is not positive
    /// or the account is blown.
    pub fn sell_market(&mut self, ts: Ts, mid: f64, lots: f64) -> u64 {
        self.exec(Side::Sell, ts, mid, lots)
    }

    /// Close the net position with one opposite-side market fill.
    /// Returns 0 when flat.
    pub fn close_all(&mut self, ts: Ts, mid: f64) -> u64 {
        if self.position_lots == 0.0 {
            return 0;
        }
        let side = if self.position_lots > 0.0 {
            Side::Sell
        } else {
            Side::Buy
        };
        self.exec(side, ts, mid, self.position_lots.abs())
    }

    fn exec(&mut self, side: Side, ts: Ts, mid: f64, lots: f64) -> u64 {
        if !(lots > 0.0) || self.account_blown {
            return 0;
        }

        let half_spread = 0.5 * self.costs.spread_pips * self.spec.pip_size;
        let slip = self.costs.slippage_pips * self.spec.pip_size;
        let price = match side {
            Side::Buy => mid + half_spread + slip,
            Side::Sell => mid - half_spread - slip,
        };
        let commission = self.costs.commission_per_lot * lots;

        self.apply_fill(side, ts, price, lots, commission);

        let id = self.next_fill_id;
        self.next_fill_id += 1;
        self.fills.push(Fill {
            id,
            ts,
            side,
            lots,
            price,
            commission,
            realized_pnl: 0.0,
        });
        debug!(id, ?side, lots, price, "fill");

        // Refresh mark-to-market with the fresh mid.
        self.on_bar(ts, mid);
        id
    }

    /// Netting position update. Applied exactly once per market order.
    fn apply_fill(&mut self, side: Side, ts: Ts, fill_price: f64, lots: f64, commission: f64) {
        self.balance -= commission;

        let signed = match side {
            Side::Buy => lots,
            Side::Sell => -lots,
        };

        // Flat: open a fresh position.
        if self.position_lots == 0.0 || self.avg_entry.is_nan() {
            self.position_lots = signed;
            self.avg_entry = fill_price;
            self.entry_ts = ts;
            self.entry_bar = self.bar_index;
            return;
        }

        // Same direction: weighted-average the entry by magnitude.
        if (self.position_lots > 0.0) == (signed > 0.0) {
            let w_old = self.position_lots.abs();
            self.avg_entry = (self.avg_entry * w_old + fill_price * lots) / (w_old + lots);
            self.position_lots += signed;
            return;
        }

        // Opposite direction: realize on the reduced portion.
        let old_abs = self.position_lots.abs();
        let reduce = old_abs.min(lots);
        let closed_units = reduce * self.spec.lot_size;
        let pnl = if self.position_lots > 0.0 {
            (fill_price - self.avg_entry) * closed_units
        } else {
            (self.avg_entry - fill_price) * closed_units
        };
        self.balance += pnl;

        self.closed.push(ClosedTrade {
            entry_ts: self.entry_ts,
            exit_ts: ts,
            entry_bar: self.entry_bar,
            exit_bar: self.bar_index,
            side: if self.position_lots > 0.0 {
                TradeSide::Long
            } else {
                TradeSide::Short
            },
            lots: reduce,
            entry_price: self.avg_entry,
            exit_price: fill_price,
            pnl,
            commission,
        });

        let new_net = self.position_lots + signed;
        if new_net.abs() < 1e-9 {
            // Exactly flattened.
            self.position_lots = 0.0;
            self.avg_entry = f64::NAN;
            self.entry_ts = Ts::from_nanos(0);
            self.entry_bar = -1;
        } else if old_abs - reduce > 0.0 {
            // Reduced without exhausting the old side; entry unchanged.
            self.position_lots = new_net;
        } else {
            // Flipped: the remainder opens a new position at the fill price.
            self.position_lots = new_net;
            self.avg_entry = fill_price;
            self.entry_ts = ts;
            self.entry_bar = self.bar_index;
        }
    }

    /// Stamp the current bar index for trade entry/exit marks
    pub const fn set_bar_index(&mut self, index: i32) {
        self.bar_index = index;
    }

    /// Account balance (realized)
    #[must_use]
    pub const fn balance(&self) -> f64 {
        self.balance
    }

    /// Balance plus unrealized pnl
    #[must_use]
    pub const fn equity(&self) -> f64 {
        self.equity
    }

    /// Mark-to-market pnl of the open position; zero when flat
    #[must_use]
    pub const fn unrealized_pnl(&self) -> f64 {
        self.unrealized
    }

    /// Signed net position in lots
    #[must_use]
    pub const fn position_lots(&self) -> f64 {
        self.position_lots
    }

    /// Weighted-average entry price; NaN iff flat
    #[must_use]
    pub const fn avg_entry(&self) -> f64 {
        self.avg_entry
    }

    /// Last mid price marked; NaN before the first bar
    #[must_use]
    pub const fn last_mid(&self) -> f64 {
        self.last_mid
    }

    /// True while a net position is open
    #[must_use]
    pub fn in_market(&self) -> bool {
        self.position_lots != 0.0
    }

    /// Sticky flag raised when equity reached zero
    #[must_use]
    pub const fn account_blown(&self) -> bool {
        self.account_blown
    }

    /// Append-only fill log
    #[must_use]
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Take the closed trades realized since the last drain
    pub fn drain_closed_trades(&mut self) -> Vec<ClosedTrade> {
        std::mem::take(&mut self.closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const T1: Ts = Ts::from_nanos(1_000);
    const T2: Ts = Ts::from_nanos(2_000);

    fn spec() -> SymbolSpec {
        SymbolSpec {
            pip_size: 0.0001,
            lot_size: 100_000.0,
        }
    }

    fn no_costs() -> CostsModel {
        CostsModel {
            spread_pips: 0.0,
            slippage_pips: 0.0,
            commission_per_lot: 0.0,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn spread_only_round_trip() {
        let costs = CostsModel {
            spread_pips: 1.0,
            slippage_pips: 0.0,
            commission_per_lot: 0.0,
        };
        let mut broker = BrokerSim::new(spec(), costs, 100_000.0);

        let id = broker.buy_market(T1, 1.2000, 1.0);
        assert_eq!(id, 1);
        assert!(approx(broker.position_lots(), 1.0));
        assert!(approx(broker.avg_entry(), 1.20005));

        let id = broker.close_all(T1, 1.2000);
        assert_eq!(id, 2);
        assert!(approx(broker.position_lots(), 0.0));
        assert!(broker.avg_entry().is_nan());
        assert!(approx(broker.balance(), 99_990.0));

        let trades = broker.drain_closed_trades();
        assert_eq!(trades.len(), 1);
        assert!(approx(trades[0].pnl, -10.0));
        assert!(approx(trades[0].lots, 1.0));
    }

    #[test]
    fn flip_realizes_old_side_and_restamps_entry() {
        let mut broker = BrokerSim::new(spec(), no_costs(), 100_000.0);

        broker.buy_market(T1, 1.0, 2.0);
        assert!(approx(broker.position_lots(), 2.0));
        assert!(approx(broker.avg_entry(), 1.0));

        broker.sell_market(T2, 1.1, 3.0);
        assert!(approx(broker.position_lots(), -1.0));
        assert!(approx(broker.avg_entry(), 1.1));
        assert!(approx(broker.balance(), 120_000.0));

        let trades = broker.drain_closed_trades();
        assert_eq!(trades.len(), 1);
        let t = &trades[0];
        assert_eq!(t.side, TradeSide::Long);
        assert!(approx(t.lots, 2.0));
        assert_eq!(t.entry_ts, T1);
        assert_eq!(t.exit_ts, T2);
        assert!(approx(t.pnl, 20_000.0));
    }

    #[test]
    fn blown_account_rejects_orders() {
        let mut broker = BrokerSim::new(spec(), no_costs(), 100.0);

        broker.buy_market(T1, 1.0, 1.0);
        // 100k units; a 0.01 drop loses 1_000 >> 100 balance.
        broker.on_bar(T2, 0.99);

        assert!(broker.account_blown());
        assert!(approx(broker.balance(), 0.0));
        assert!(approx(broker.equity(), 0.0));
        assert!(approx(broker.position_lots(), 0.0));
        assert!(broker.avg_entry().is_nan());

        assert_eq!(broker.buy_market(T2, 0.99, 1.0), 0);
        assert_eq!(broker.sell_market(T2, 0.99, 1.0), 0);
        // No liquidation fill was generated.
        assert_eq!(broker.fills().len(), 1);
    }

    #[test]
    fn on_bar_marks_to_mid() {
        let mut broker = BrokerSim::new(spec(), no_costs(), 100_000.0);
        assert!(broker.last_mid().is_nan());

        broker.buy_market(T1, 1.0, 2.0);
        broker.on_bar(T2, 1.05);
        assert!(approx(broker.last_mid(), 1.05));
        // 0.05 * 2 lots * 100_000 units.
        assert!(approx(broker.unrealized_pnl(), 10_000.0));
        assert!(approx(broker.equity(), 110_000.0));
        assert!(approx(broker.balance(), 100_000.0));
    }

    #[test]
    fn same_side_adds_weighted_entry() {
        let mut broker = BrokerSim::new(spec(), no_costs(), 100_000.0);

        broker.buy_market(T1, 1.0, 1.0);
        broker.buy_market(T2, 1.1, 3.0);

        assert!(approx(broker.position_lots(), 4.0));
        // (1.0 * 1 + 1.1 * 3) / 4
        assert!(approx(broker.avg_entry(), 1.075));
        assert!(broker.drain_closed_trades().is_empty());
    }

    #[test]
    fn partial_close_keeps_entry() {
        let mut broker = BrokerSim::new(spec(), no_costs(), 100_000.0);

        broker.sell_market(T1, 1.0, 3.0);
        broker.buy_market(T2, 0.9, 1.0);

        assert!(approx(broker.position_lots(), -2.0));
        assert!(approx(broker.avg_entry(), 1.0));
        // Short closed 1 lot at 0.9: (1.0 - 0.9) * 1 * 100_000.
        assert!(approx(broker.balance(), 110_000.0));

        let trades = broker.drain_closed_trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, TradeSide::Short);
        assert!(approx(trades[0].pnl, 10_000.0));
    }

    #[rstest]
    #[case(Side::Buy, 1.20015)]
    #[case(Side::Sell, 1.19985)]
    fn fill_pricing_includes_spread_and_slippage(#[case] side: Side, #[case] expected: f64) {
        let costs = CostsModel {
            spread_pips: 2.0,
            slippage_pips: 0.5,
            commission_per_lot: 0.0,
        };
        let mut broker = BrokerSim::new(spec(), costs, 100_000.0);

        match side {
            Side::Buy => broker.buy_market(T1, 1.2000, 1.0),
            Side::Sell => broker.sell_market(T1, 1.2000, 1.0),
        };
        assert!(approx(broker.fills()[0].price, expected));
    }

    #[test]
    fn commission_debited_on_every_fill() {
        let costs = CostsModel {
            spread_pips: 0.0,
            slippage_pips: 0.0,
            commission_per_lot: 7.0,
        };
        let mut broker = BrokerSim::new(spec(), costs, 100_000.0);

        broker.buy_market(T1, 1.0, 2.0);
        assert!(approx(broker.balance(), 100_000.0 - 14.0));

        broker.close_all(T1, 1.0);
        assert!(approx(broker.balance(), 100_000.0 - 28.0));
    }

    #[test]
    fn illegal_requests_are_noops() {
        let mut broker = BrokerSim::new(spec(), no_costs(), 100_000.0);

        assert_eq!(broker.buy_market(T1, 1.0, 0.0), 0);
        assert_eq!(broker.sell_market(T1, 1.0, -1.0), 0);
        assert_eq!(broker.buy_market(T1, 1.0, f64::NAN), 0);
        assert_eq!(broker.close_all(T1, 1.0), 0);
        assert!(broker.fills().is_empty());
    }

    #[test]
    fn fill_ids_strictly_increase() {
        let mut broker = BrokerSim::new(spec(), no_costs(), 100_000.0);

        let a = broker.buy_market(T1, 1.0, 1.0);
        let b = broker.buy_market(T1, 1.0, 1.0);
        let c = broker.close_all(T2, 1.0);
        assert!(a < b && b < c);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn accounting_invariants_hold(
                ops in prop::collection::vec((0u8..3, 0.0f64..4.0, 0.95f64..1.05), 1..60)
            ) {
                let mut broker = BrokerSim::new(spec(), no_costs(), 50_000.0);
                let mut last_id = 0;

                for (i, (op, lots, mid)) in ops.into_iter().enumerate() {
                    let ts = Ts::from_nanos(i as u64 * 60_000_000_000);
                    broker.on_bar(ts, mid);

                    let id = match op {
                        0 => broker.buy_market(ts, mid, lots),
                        1 => broker.sell_market(ts, mid, lots),
                        _ => broker.close_all(ts, mid),
                    };
                    if id != 0 {
                        prop_assert!(id > last_id);
                        last_id = id;
                    }

                    prop_assert!(
                        (broker.equity() - (broker.balance() + broker.unrealized_pnl())).abs()
                            < 1e-6
                    );
                    prop_assert_eq!(
                        broker.avg_entry().is_nan(),
                        broker.position_lots() == 0.0
                    );
                }
            }
        }
    }
}
