//! The backtest engine loop
//!
//! Wires the tape reader, indicator engine, broker, metrics accumulator,
//! and strategy into one synchronous single-threaded pass, then hands the
//! results to the run-pack writer. Strategies are driven through the
//! C-compatible engine context whether they are in-process or dynamically
//! loaded.

#![allow(unsafe_code)] // the context bridge backs the C function table

pub mod bridge;
pub mod config;
pub mod runner;
pub mod strategy;

pub use config::{EngineConfig, FeatureSpec};
pub use runner::{RunOutcome, meta_json, run, write_run_pack};
pub use strategy::{PluginStrategy, Strategy};
