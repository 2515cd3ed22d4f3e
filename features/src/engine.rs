//! Registry of streaming indicators keyed by (kind, period)

use crate::atr::AtrStream;
use crate::ema::EmaStream;
use rustc_hash::FxHashMap;

/// Indicator family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Exponential moving average of the close
    Ema,
    /// Wilder average true range
    Atr,
}

impl FeatureKind {
    /// Decode the cross-boundary feature code (EMA = 1, ATR = 2)
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Ema),
            2 => Some(Self::Atr),
            _ => None,
        }
    }
}

/// Stable handle to a registered stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureHandle(usize);

enum Stream {
    Ema(EmaStream),
    Atr(AtrStream),
}

impl Stream {
    fn current(&self) -> (f64, bool) {
        match self {
            Self::Ema(s) => (s.value(), s.is_ready()),
            Self::Atr(s) => (s.value(), s.is_ready()),
        }
    }
}

struct Slot {
    stream: Stream,
    history: Vec<f32>,
}

/// Owns every registered indicator stream and its materialized history
#[derive(Default)]
pub struct FeatureEngine {
    slots: Vec<Slot>,
    index: FxHashMap<(FeatureKind, u32), usize>,
    bars: usize,
}

impl FeatureEngine {
    /// Create an empty engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the EMA stream of `period`, creating it if absent.
    /// Idempotent: the same period always maps to the same stream.
    pub fn require_ema(&mut self, period: u32) -> FeatureHandle {
        self.require(FeatureKind::Ema, period)
    }

    /// Return the Wilder ATR stream of `period`, creating it if absent.
    pub fn require_atr(&mut self, period: u32) -> FeatureHandle {
        self.require(FeatureKind::Atr, period)
    }

    fn require(&mut self, kind: FeatureKind, period: u32) -> FeatureHandle {
        if let Some(&i) = self.index.get(&(kind, period)) {
            return FeatureHandle(i);
        }

        let stream = match kind {
            FeatureKind::Ema => Stream::Ema(EmaStream::new(period)),
            FeatureKind::Atr => Stream::Atr(AtrStream::new(period)),
        };
        // Streams registered mid-run backfill NaN so every history stays
        // aligned with the bar index.
        let i = self.slots.len();
        self.slots.push(Slot {
            stream,
            history: vec![f32::NAN; self.bars],
        });
        self.index.insert((kind, period), i);
        FeatureHandle(i)
    }

    /// Push one observation to every registered stream
    pub fn update(&mut self, _open: f64, high: f64, low: f64, close: f64, _volume: f64) {
        for slot in &mut self.slots {
            match &mut slot.stream {
                Stream::Ema(s) => s.update(close),
                Stream::Atr(s) => s.update(high, low, close),
            }
        }
    }

    /// Append each stream's current value (NaN during warmup) to its
    /// history. Called once per bar by the engine loop, after `update`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn append_history(&mut self) {
        for slot in &mut self.slots {
            let (value, ready) = slot.stream.current();
            slot.history.push(if ready { value as f32 } else { f32::NAN });
        }
        self.bars += 1;
    }

    /// Current value and readiness of a registered stream
    #[must_use]
    pub fn current(&self, handle: FeatureHandle) -> (f64, bool) {
        self.slots[handle.0].stream.current()
    }

    /// Dense per-bar history of a registered stream, by key
    #[must_use]
    pub fn history(&self, kind: FeatureKind, period: u32) -> Option<&[f32]> {
        self.index
            .get(&(kind, period))
            .map(|&i| self.slots[i].history.as_slice())
    }

    /// Number of bars replayed so far
    #[must_use]
    pub const fn bars_seen(&self) -> usize {
        self.bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_bar(engine: &mut FeatureEngine, close: f64) {
        engine.update(close, close + 0.5, close - 0.5, close, 1.0);
        engine.append_history();
    }

    #[test]
    fn require_is_idempotent() {
        let mut engine = FeatureEngine::new();
        let a = engine.require_ema(50);
        let b = engine.require_ema(50);
        assert_eq!(a, b);

        let c = engine.require_atr(50);
        assert_ne!(a, c);
        assert_eq!(engine.require_atr(50), c);
    }

    #[test]
    fn histories_track_bar_count() {
        let mut engine = FeatureEngine::new();
        engine.require_ema(3);
        engine.require_atr(14);

        for i in 0..5 {
            push_bar(&mut engine, 10.0 + f64::from(i));
        }

        assert_eq!(engine.bars_seen(), 5);
        let ema = engine.history(FeatureKind::Ema, 3).expect("registered");
        let atr = engine.history(FeatureKind::Atr, 14).expect("registered");
        assert_eq!(ema.len(), 5);
        assert_eq!(atr.len(), 5);

        // EMA is ready from the first bar; ATR(14) never warms up in 5 bars.
        assert!(ema.iter().all(|v| v.is_finite()));
        assert!(atr.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn late_registration_backfills_nan() {
        let mut engine = FeatureEngine::new();
        engine.require_ema(3);
        push_bar(&mut engine, 10.0);
        push_bar(&mut engine, 11.0);

        engine.require_atr(2);
        push_bar(&mut engine, 12.0);

        let atr = engine.history(FeatureKind::Atr, 2).expect("registered");
        assert_eq!(atr.len(), 3);
        assert!(atr[0].is_nan() && atr[1].is_nan());
    }

    #[test]
    fn unknown_feature_has_no_history() {
        let engine = FeatureEngine::new();
        assert!(engine.history(FeatureKind::Ema, 9).is_none());
        assert_eq!(FeatureKind::from_code(3), None);
        assert_eq!(FeatureKind::from_code(1), Some(FeatureKind::Ema));
    }

    #[test]
    fn history_matches_stream_values() {
        let mut engine = FeatureEngine::new();
        let h = engine.require_ema(3);

        push_bar(&mut engine, 10.0);
        push_bar(&mut engine, 12.0);
        push_bar(&mut engine, 14.0);

        let (value, ready) = engine.current(h);
        assert!(ready);
        assert!((value - 12.5).abs() < 1e-12);

        let hist = engine.history(FeatureKind::Ema, 3).expect("registered");
        assert_eq!(hist, &[10.0, 11.0, 12.5]);
    }
}
