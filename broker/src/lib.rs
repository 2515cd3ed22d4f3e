//! Netting broker simulator: one net position, spread/slippage/commission
//! costs, weighted-average entry, partial-close realization, flips, and a
//! blown-account guard.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod sim;

pub use sim::{BrokerSim, Fill, Side};
