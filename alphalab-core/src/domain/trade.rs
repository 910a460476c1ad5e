//! Trade — a completed round trip with its exit reason and traceability.

use super::signal::{Direction, SignalCategory};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Hard holding-period ceiling reached.
    MaxHold,
    /// Portfolio-level drawdown halt forced the book flat.
    DrawdownHalt,
    /// Terminal force-close on the final bar.
    EndOfBacktest,
}

/// An immutable round-trip record. PnL is net of the cash fees recorded in
/// `costs`; price impact is already inside the recorded fill prices, so
/// `pnl == (exit_price - entry_price) * shares * direction - costs` holds
/// exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub ticker: String,
    pub direction: Direction,
    pub strategy: String,
    pub category: SignalCategory,

    // ── Entry ──
    pub entry_date: NaiveDate,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Size ──
    pub shares: f64,

    // ── PnL ──
    pub pnl: f64,
    pub pnl_pct: f64,
    /// Cash fees for the round trip (commission, exchange, fx, borrow).
    pub costs: f64,

    // ── Duration ──
    pub holding_days: usize,

    // ── Excursion ──
    pub mfe: f64,
    pub mae: f64,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
