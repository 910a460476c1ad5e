//! Backtesting engine — the strictly chronological day loop.
//!
//! Each trading day runs four phases in a fixed order:
//!
//! 1. Mark: update every open position with the day's close
//! 2. Exits: stop-loss, take-profit, hard max-hold
//! 3. Construction: drawdown check daily, sized entries on rebalance days
//! 4. Record: end-of-day equity and daily return
//!
//! Day `t` can observe closes up to row `t` and signals stamped on day `t`.
//! Nothing in the loop reads a later row.

pub mod config;
pub mod day_loop;
pub mod result;

pub use config::{ConfigError, ConfigId, EngineConfig, RebalanceCadence};
pub use day_loop::{BacktestEngine, EngineError};
pub use result::BacktestRun;
