//! Instrument specification, trading costs, and timeframes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Price and size conventions for a traded symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    /// Smallest conventional price increment (EURUSD 0.0001, USDJPY 0.01)
    pub pip_size: f64,
    /// Base-currency units per 1.0 lot
    pub lot_size: f64,
}

impl Default for SymbolSpec {
    fn default() -> Self {
        Self {
            pip_size: 0.0001,
            lot_size: 100_000.0,
        }
    }
}

/// Execution cost model applied on top of mid prices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostsModel {
    /// Fixed spread in pips
    pub spread_pips: f64,
    /// Fixed slippage in pips, applied in the adverse direction
    pub slippage_pips: f64,
    /// Commission per 1.0 lot, charged on each fill
    pub commission_per_lot: f64,
}

impl Default for CostsModel {
    fn default() -> Self {
        Self {
            spread_pips: 0.8,
            slippage_pips: 0.0,
            commission_per_lot: 0.0,
        }
    }
}

/// Bar aggregation timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1-minute bars
    M1,
    /// 5-minute bars
    M5,
    /// 15-minute bars
    M15,
    /// 1-hour bars
    H1,
    /// 4-hour bars
    H4,
    /// Daily bars
    D1,
}

impl Timeframe {
    /// Bar duration in nanoseconds
    #[must_use]
    pub const fn bar_ns(self) -> u64 {
        match self {
            Self::M1 => 60 * 1_000_000_000,
            Self::M5 => 5 * 60 * 1_000_000_000,
            Self::M15 => 15 * 60 * 1_000_000_000,
            Self::H1 => 3_600 * 1_000_000_000,
            Self::H4 => 4 * 3_600 * 1_000_000_000,
            Self::D1 => 86_400 * 1_000_000_000,
        }
    }

    /// Directory/path token ("1m", "4h", ...)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a timeframe token is not recognized
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown timeframe: {0}")]
pub struct ParseTimeframeError(pub String);

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::M1),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "1h" => Ok(Self::H1),
            "4h" => Ok(Self::H4),
            "1d" => Ok(Self::D1),
            other => Err(ParseTimeframeError(other.to_string())),
        }
    }
}
