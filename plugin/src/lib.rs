//! Strategy plugin contract: a C-compatible engine context handed to
//! dynamically loaded strategies, and the loader that resolves the five
//! lifecycle exports.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(missing_docs)]
#![allow(unsafe_code)] // C ABI surface and dynamic symbol resolution

pub mod abi;
pub mod loader;

pub use abi::{
    BarView, EngineCtx, FEATURE_ATR, FEATURE_EMA, FeatureRef, FnCreate, FnDestroy, FnLifecycle,
    StrategyHandle,
};
pub use loader::{PluginError, PluginLoader};
