//! Streaming technical indicators with per-bar history materialization
//!
//! Each indicator is an O(1) reducer over the bar stream; the engine loop
//! appends the current value (or NaN during warmup) to a dense history
//! array after every bar, so strategies get random access by bar index.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod atr;
pub mod ema;
pub mod engine;

pub use atr::AtrStream;
pub use ema::EmaStream;
pub use engine::{FeatureEngine, FeatureHandle, FeatureKind};
