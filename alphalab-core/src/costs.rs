//! CostModel — transaction frictions: commission, slippage, spread, borrow.
//!
//! Two views of the same frictions:
//!
//! * `entry_cost` / `exit_cost` / `round_trip_cost` price the full friction in
//!   dollars (price impact included) for analysis and sensitivity work.
//! * `effective_entry_price` / `effective_exit_price` plus `entry_fees` /
//!   `exit_fees` split the frictions the way the engine books them: impact
//!   lives inside the fill price, fees are a cash debit. The split keeps
//!   impact from being counted twice.

use crate::domain::signal::Direction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const BPS: f64 = 1e-4;

#[derive(Debug, Error)]
pub enum CostModelError {
    #[error("cost model field {field} must be finite and non-negative, got {value}")]
    NegativeField { field: &'static str, value: f64 },
}

/// Per-trade friction parameters. All rates are non-negative; `validate`
/// enforces that at config-build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Commission per share, dollars.
    pub commission_per_share: f64,
    /// Commission floor per order, dollars.
    pub min_commission: f64,
    /// Price impact from crossing the book, basis points of notional.
    pub slippage_bps: f64,
    /// Half-spread paid on each fill, basis points of notional.
    pub spread_bps: f64,
    /// Annualized stock-borrow rate for shorts, basis points of notional.
    pub borrow_bps_annual: f64,
    /// Exchange and regulatory fees per share, dollars.
    pub exchange_fee_per_share: f64,
    /// Currency-conversion fee for cross-border accounts, basis points of
    /// notional per fill. Zero for domestic accounts.
    pub fx_fee_bps: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::retail()
    }
}

impl CostModel {
    /// Frictionless fills. Baseline for isolating cost drag.
    pub fn zero_cost() -> Self {
        Self {
            commission_per_share: 0.0,
            min_commission: 0.0,
            slippage_bps: 0.0,
            spread_bps: 0.0,
            borrow_bps_annual: 0.0,
            exchange_fee_per_share: 0.0,
            fx_fee_bps: 0.0,
        }
    }

    /// Domestic retail brokerage.
    pub fn retail() -> Self {
        Self {
            commission_per_share: 0.005,
            min_commission: 1.0,
            slippage_bps: 10.0,
            spread_bps: 5.0,
            borrow_bps_annual: 50.0,
            exchange_fee_per_share: 0.003,
            fx_fee_bps: 0.0,
        }
    }

    /// Retail account trading a foreign market: retail frictions plus a
    /// currency-conversion fee on every fill.
    pub fn cross_border_retail() -> Self {
        Self {
            fx_fee_bps: 25.0,
            ..Self::retail()
        }
    }

    pub fn validate(&self) -> Result<(), CostModelError> {
        let fields = [
            ("commission_per_share", self.commission_per_share),
            ("min_commission", self.min_commission),
            ("slippage_bps", self.slippage_bps),
            ("spread_bps", self.spread_bps),
            ("borrow_bps_annual", self.borrow_bps_annual),
            ("exchange_fee_per_share", self.exchange_fee_per_share),
            ("fx_fee_bps", self.fx_fee_bps),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(CostModelError::NegativeField { field, value });
            }
        }
        Ok(())
    }

    /// Commission for an order: per-share rate with a floor.
    pub fn commission(&self, shares: f64) -> f64 {
        if shares <= 0.0 {
            return 0.0;
        }
        (shares * self.commission_per_share).max(self.min_commission)
    }

    /// Full friction of opening a position, dollars. Price impact included.
    pub fn entry_cost(&self, price: f64, shares: f64, direction: Direction) -> f64 {
        if price <= 0.0 || shares <= 0.0 || direction.is_flat() {
            return 0.0;
        }
        let notional = price * shares;
        self.commission(shares)
            + shares * self.exchange_fee_per_share
            + notional * self.slippage_bps * BPS
            + notional * self.spread_bps * BPS
            + notional * self.fx_fee_bps * BPS
    }

    /// Full friction of closing a position, dollars. Shorts also pay borrow
    /// prorated over the holding period.
    pub fn exit_cost(&self, price: f64, shares: f64, direction: Direction, holding_days: usize) -> f64 {
        if price <= 0.0 || shares <= 0.0 || direction.is_flat() {
            return 0.0;
        }
        self.entry_cost(price, shares, direction) + self.borrow_cost(price, shares, direction, holding_days)
    }

    /// Borrow carry for a short held `holding_days` trading days.
    pub fn borrow_cost(&self, price: f64, shares: f64, direction: Direction, holding_days: usize) -> f64 {
        if direction != Direction::Short || price <= 0.0 || shares <= 0.0 {
            return 0.0;
        }
        price * shares * self.borrow_bps_annual * BPS * (holding_days as f64 / TRADING_DAYS_PER_YEAR)
    }

    /// Entry plus exit friction for one round trip, dollars.
    pub fn round_trip_cost(
        &self,
        entry_price: f64,
        exit_price: f64,
        shares: f64,
        direction: Direction,
        holding_days: usize,
    ) -> f64 {
        self.entry_cost(entry_price, shares, direction)
            + self.exit_cost(exit_price, shares, direction, holding_days)
    }

    /// Round-trip friction as a fraction of entry notional.
    pub fn cost_as_pct(&self, price: f64, shares: f64, direction: Direction, holding_days: usize) -> f64 {
        if price <= 0.0 || shares <= 0.0 {
            return 0.0;
        }
        self.round_trip_cost(price, price, shares, direction, holding_days) / (price * shares)
    }

    /// Fill price for opening, moved against the trader by slippage + spread.
    pub fn effective_entry_price(&self, price: f64, direction: Direction) -> f64 {
        let impact = (self.slippage_bps + self.spread_bps) * BPS;
        match direction {
            Direction::Long => price * (1.0 + impact),
            Direction::Short => price * (1.0 - impact),
            Direction::Flat => price,
        }
    }

    /// Fill price for closing, moved against the trader by slippage + spread.
    pub fn effective_exit_price(&self, price: f64, direction: Direction) -> f64 {
        let impact = (self.slippage_bps + self.spread_bps) * BPS;
        match direction {
            Direction::Long => price * (1.0 - impact),
            Direction::Short => price * (1.0 + impact),
            Direction::Flat => price,
        }
    }

    /// Cash fees on an opening fill: commission + exchange + fx. No impact.
    pub fn entry_fees(&self, price: f64, shares: f64) -> f64 {
        if price <= 0.0 || shares <= 0.0 {
            return 0.0;
        }
        self.commission(shares)
            + shares * self.exchange_fee_per_share
            + price * shares * self.fx_fee_bps * BPS
    }

    /// Cash fees on a closing fill: entry fees plus borrow for shorts.
    pub fn exit_fees(&self, price: f64, shares: f64, direction: Direction, holding_days: usize) -> f64 {
        if price <= 0.0 || shares <= 0.0 {
            return 0.0;
        }
        self.entry_fees(price, shares) + self.borrow_cost(price, shares, direction, holding_days)
    }
}
