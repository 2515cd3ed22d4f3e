//! Engine invocation parameters

use common::{CostsModel, SymbolSpec, Timeframe};
use features::FeatureKind;
use std::path::PathBuf;

/// One indicator the engine materializes for the strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSpec {
    /// Indicator family
    pub kind: FeatureKind,
    /// Indicator period
    pub period: u32,
}

/// Everything a run needs besides the strategy itself
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tape store root (the directory containing `bars/`)
    pub base_dir: PathBuf,
    /// Instrument symbol, e.g. `EURUSD`
    pub symbol: String,
    /// Bar timeframe
    pub timeframe: Timeframe,
    /// First day to replay, inclusive, YYYYMMDD
    pub start_ymd: u32,
    /// Last day to replay, inclusive, YYYYMMDD
    pub end_ymd: u32,
    /// Instrument conventions
    pub spec: SymbolSpec,
    /// Execution cost model
    pub costs: CostsModel,
    /// Starting account balance
    pub initial_balance: f64,
    /// Indicators to register and materialize
    pub features: Vec<FeatureSpec>,
}

impl EngineConfig {
    /// Bars per year at this timeframe, for Sharpe/Sortino annualization:
    /// 252 trading days of 24-hour sessions.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn annualization_bars(&self) -> u32 {
        252 * (common::NS_PER_DAY / self.timeframe.bar_ns()) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(timeframe: Timeframe) -> EngineConfig {
        EngineConfig {
            base_dir: PathBuf::from("."),
            symbol: "EURUSD".to_string(),
            timeframe,
            start_ymd: 20_240_101,
            end_ymd: 20_240_131,
            spec: SymbolSpec::default(),
            costs: CostsModel::default(),
            initial_balance: 100_000.0,
            features: Vec::new(),
        }
    }

    #[test]
    fn annualization_scales_with_timeframe() {
        assert_eq!(config(Timeframe::M1).annualization_bars(), 252 * 24 * 60);
        assert_eq!(config(Timeframe::H1).annualization_bars(), 252 * 24);
        assert_eq!(config(Timeframe::D1).annualization_bars(), 252);
    }
}
