//! Core market data and trade types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanoseconds in a calendar day.
pub const NS_PER_DAY: u64 = 86_400_000_000_000;

/// Timestamp in nanoseconds since UNIX epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Ts(pub u64);

impl Ts {
    /// Create a timestamp from nanoseconds
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Get the timestamp as nanoseconds
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Get the timestamp as milliseconds
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Calendar day index (days since UNIX epoch)
    #[must_use]
    pub const fn day_index(self) -> u64 {
        self.0 / NS_PER_DAY
    }

    /// Signed nanoseconds, for arithmetic against other timestamps
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// One aggregated OHLCV observation over a fixed time window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    /// Bar open timestamp
    pub ts: Ts,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Traded volume
    pub volume: f32,
}

/// Direction of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    /// Net long position
    Long,
    /// Net short position
    Short,
}

impl TradeSide {
    /// On-disk encoding: +1 long, -1 short
    #[must_use]
    pub const fn as_i8(self) -> i8 {
        match self {
            Self::Long => 1,
            Self::Short => -1,
        }
    }
}

/// A closed (fully or partially realized) trade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedTrade {
    /// Timestamp of the opening fill of the original position
    pub entry_ts: Ts,
    /// Timestamp of the closing fill
    pub exit_ts: Ts,
    /// Bar index at position open, -1 if unknown
    pub entry_bar: i32,
    /// Bar index at close
    pub exit_bar: i32,
    /// Side of the original position
    pub side: TradeSide,
    /// Magnitude of lots closed by this trade
    pub lots: f64,
    /// Weighted-average entry price of the closed portion
    pub entry_price: f64,
    /// Fill price that closed the portion
    pub exit_price: f64,
    /// Realized profit and loss in account currency
    pub pnl: f64,
    /// Commission attributed to the closing fill
    pub commission: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_conversions() {
        let ts = Ts::from_nanos(1_234_567_890);
        assert_eq!(ts.as_nanos(), 1_234_567_890);
        assert_eq!(ts.as_millis(), 1_234);
    }

    #[test]
    fn ts_day_index() {
        assert_eq!(Ts::from_nanos(0).day_index(), 0);
        assert_eq!(Ts::from_nanos(NS_PER_DAY - 1).day_index(), 0);
        assert_eq!(Ts::from_nanos(NS_PER_DAY).day_index(), 1);
        assert_eq!(Ts::from_nanos(3 * NS_PER_DAY + 42).day_index(), 3);
    }

    #[test]
    fn side_encoding() {
        assert_eq!(TradeSide::Long.as_i8(), 1);
        assert_eq!(TradeSide::Short.as_i8(), -1);
    }
}
