//! PortfolioState — cash, open positions, and mark-to-market equity.

use super::position::Position;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The mutable book. Owned exclusively by the engine during a run; the
/// constructor and sizer only ever see `&PortfolioState`.
///
/// Positions live in a `BTreeMap` so every iteration (marking, equity sums,
/// close scans) runs in ticker order. Floating-point sums then reduce in a
/// fixed order and reruns reproduce equity curves bit for bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub as_of: NaiveDate,
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<String, Position>,
    /// Cash fees paid so far (commission, exchange, fx, borrow).
    pub total_fees: f64,
}

impl PortfolioState {
    pub fn new(initial_capital: f64, start: NaiveDate) -> Self {
        Self {
            as_of: start,
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            total_fees: 0.0,
        }
    }

    /// Equity from the latest marks. Positions must be marked for the
    /// current day before this is read; stale marks are a bug upstream.
    pub fn equity(&self) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(Position::market_value)
                .sum::<f64>()
    }

    pub fn has_position(&self, ticker: &str) -> bool {
        self.positions.contains_key(ticker)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Update the mark for one ticker, if held.
    pub fn mark(&mut self, ticker: &str, price: f64) {
        if let Some(position) = self.positions.get_mut(ticker) {
            position.mark(price);
        }
    }

    /// Gross exposure of one sector as a fraction of `equity`.
    pub fn sector_exposure_pct(&self, sector: &str, equity: f64) -> f64 {
        if equity <= 0.0 {
            return 0.0;
        }
        self.positions
            .values()
            .filter(|position| position.sector == sector)
            .map(Position::notional)
            .sum::<f64>()
            / equity
    }

    /// Gross exposure across all positions as a fraction of `equity`.
    pub fn gross_exposure_pct(&self, equity: f64) -> f64 {
        if equity <= 0.0 {
            return 0.0;
        }
        self.positions
            .values()
            .map(Position::notional)
            .sum::<f64>()
            / equity
    }
}
