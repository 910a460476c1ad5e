//! BacktestRun — the raw record a run produces.

use super::config::ConfigId;
use crate::domain::trade::Trade;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Everything a single run emits: the equity path, daily returns, and the
/// trade log. Summary statistics are computed downstream; reruns of the same
/// config on the same inputs reproduce this record exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    pub strategy: String,
    pub config_id: ConfigId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,

    /// One row per trading day, aligned with `equity_curve` and
    /// `daily_returns`.
    pub dates: Vec<NaiveDate>,
    /// End-of-day equity after all fills.
    pub equity_curve: Vec<f64>,
    /// `equity_t / equity_{t-1} - 1`, with the initial capital standing in
    /// for the day before the first bar.
    pub daily_returns: Vec<f64>,

    pub trades: Vec<Trade>,
    pub final_cash: f64,
    /// Cash fees paid over the run (commission, exchange, fx, borrow).
    pub total_fees: f64,
    /// Whether the drawdown halt fired at any point.
    pub halted: bool,
}

impl BacktestRun {
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .copied()
            .unwrap_or(self.initial_capital)
    }

    pub fn n_days(&self) -> usize {
        self.dates.len()
    }
}
