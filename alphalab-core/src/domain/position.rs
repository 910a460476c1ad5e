//! Position — an open holding with its exit triggers and running excursions.

use super::signal::{Direction, SignalCategory};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An open position. Created and mutated only by the engine's day loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    // ── Identity ──
    pub ticker: String,
    pub direction: Direction,
    pub strategy: String,
    pub category: SignalCategory,
    pub sector: String,

    // ── Entry ──
    /// Fill price with slippage and spread already applied.
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    /// Row index of the entry day in the engine's date axis.
    pub entry_index: usize,
    /// Target weight at entry, fraction of equity.
    pub entry_weight: f64,
    /// Cash fees paid on the opening fill. Folded into the trade's
    /// round-trip costs at exit.
    pub entry_fees: f64,

    // ── Size ──
    /// Whole-share count, always non-negative. Direction carries the sign.
    pub shares: f64,

    // ── Exit triggers ──
    pub stop_price: f64,
    pub take_profit_price: f64,

    // ── Marks ──
    /// Latest mark. Carried forward across gap days.
    pub last_price: f64,
    /// Best unrealized PnL seen so far, dollars.
    pub mfe: f64,
    /// Worst unrealized PnL seen so far, dollars.
    pub mae: f64,
}

impl Position {
    /// Signed share count (negative for shorts).
    pub fn signed_shares(&self) -> f64 {
        self.shares * self.direction.sign()
    }

    /// Signed market value at the latest mark.
    pub fn market_value(&self) -> f64 {
        self.signed_shares() * self.last_price
    }

    /// Gross exposure at the latest mark, always non-negative.
    pub fn notional(&self) -> f64 {
        self.shares * self.last_price
    }

    /// Unrealized PnL at the latest mark, before exit fees.
    pub fn unrealized_pnl(&self) -> f64 {
        self.signed_shares() * (self.last_price - self.entry_price)
    }

    /// Record a new mark and update the excursion extremes.
    pub fn mark(&mut self, price: f64) {
        self.last_price = price;
        let pnl = self.unrealized_pnl();
        if pnl > self.mfe {
            self.mfe = pnl;
        }
        if pnl < self.mae {
            self.mae = pnl;
        }
    }

    /// Whether `price` breaches the stop for this direction.
    pub fn stop_hit(&self, price: f64) -> bool {
        match self.direction {
            Direction::Long => price <= self.stop_price,
            Direction::Short => price >= self.stop_price,
            Direction::Flat => false,
        }
    }

    /// Whether `price` reaches the take-profit for this direction.
    pub fn take_profit_hit(&self, price: f64) -> bool {
        match self.direction {
            Direction::Long => price >= self.take_profit_price,
            Direction::Short => price <= self.take_profit_price,
            Direction::Flat => false,
        }
    }
}
