//! PositionSizer — per-position weight rules and their composite.
//!
//! Every rule returns a weight clamped to the configured band, so a sizing
//! bug can never produce an unbounded position.

use crate::domain::signal::{RiskBudgets, SignalCategory, SignalError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SizerError {
    #[error("position pct band must satisfy 0 < min <= max <= 1, got [{min}, {max}]")]
    InvalidBounds { min: f64, max: f64 },
    #[error("kelly fraction must be in (0, 1], got {value}")]
    InvalidKellyFraction { value: f64 },
    #[error("target volatility must be positive and finite, got {value}")]
    InvalidTargetVolatility { value: f64 },
    #[error(transparent)]
    Budget(#[from] SignalError),
}

/// Sizing parameters. Validated eagerly by `PositionSizer::new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizerConfig {
    /// Smallest weight ever assigned to an accepted position.
    pub min_position_pct: f64,
    /// Largest weight ever assigned to a single position.
    pub max_position_pct: f64,
    /// Fraction of full Kelly to use (full Kelly overbets on estimated edges).
    pub kelly_fraction: f64,
    /// Annualized volatility target for the inverse-vol rule.
    pub target_volatility: f64,
    /// Completed trades required before the Kelly cap engages.
    pub min_kelly_trades: usize,
    pub risk_budgets: RiskBudgets,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            min_position_pct: 0.01,
            max_position_pct: 0.10,
            kelly_fraction: 0.25,
            target_volatility: 0.15,
            min_kelly_trades: 10,
            risk_budgets: RiskBudgets::default(),
        }
    }
}

impl SizerConfig {
    pub fn validate(&self) -> Result<(), SizerError> {
        let band_ok = self.min_position_pct > 0.0
            && self.min_position_pct <= self.max_position_pct
            && self.max_position_pct <= 1.0
            && self.min_position_pct.is_finite()
            && self.max_position_pct.is_finite();
        if !band_ok {
            return Err(SizerError::InvalidBounds {
                min: self.min_position_pct,
                max: self.max_position_pct,
            });
        }
        if !self.kelly_fraction.is_finite() || self.kelly_fraction <= 0.0 || self.kelly_fraction > 1.0 {
            return Err(SizerError::InvalidKellyFraction {
                value: self.kelly_fraction,
            });
        }
        if !self.target_volatility.is_finite() || self.target_volatility <= 0.0 {
            return Err(SizerError::InvalidTargetVolatility {
                value: self.target_volatility,
            });
        }
        self.risk_budgets.validate()?;
        Ok(())
    }
}

/// Running win/loss statistics over completed trades. Feeds the Kelly cap;
/// the engine updates it as trades close, so the cap only ever sees history.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TradeStats {
    pub wins: usize,
    pub losses: usize,
    pub gross_win: f64,
    pub gross_loss: f64,
}

impl TradeStats {
    pub fn record(&mut self, pnl: f64) {
        if pnl > 0.0 {
            self.wins += 1;
            self.gross_win += pnl;
        } else {
            self.losses += 1;
            self.gross_loss += pnl.abs();
        }
    }

    pub fn n_trades(&self) -> usize {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> f64 {
        let n = self.n_trades();
        if n == 0 {
            return 0.5;
        }
        self.wins as f64 / n as f64
    }

    pub fn avg_win(&self) -> f64 {
        if self.wins == 0 {
            return 0.0;
        }
        self.gross_win / self.wins as f64
    }

    pub fn avg_loss(&self) -> f64 {
        if self.losses == 0 {
            return 0.0;
        }
        self.gross_loss / self.losses as f64
    }
}

/// Everything the composite rule needs for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct SizingInputs {
    /// Signal conviction; clamped into [0, 1] before use.
    pub confidence: f64,
    pub category: SignalCategory,
    /// Distance to the stop as a fraction of entry price.
    pub stop_distance_pct: f64,
    /// Trailing annualized volatility. `None` when history is too short;
    /// the vol rule is then skipped.
    pub annualized_vol: Option<f64>,
    pub trade_stats: TradeStats,
    /// Configured book size (max concurrent positions).
    pub book_size: usize,
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: SizerConfig,
}

impl PositionSizer {
    pub fn new(config: SizerConfig) -> Result<Self, SizerError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SizerConfig {
        &self.config
    }

    fn clamp(&self, weight: f64) -> f64 {
        if !weight.is_finite() {
            return self.config.max_position_pct;
        }
        weight.clamp(self.config.min_position_pct, self.config.max_position_pct)
    }

    /// Fractional Kelly weight from trailing trade statistics.
    ///
    /// `f = (p·b − q) / b` with the win rate clipped to [0.01, 0.99]. With no
    /// recorded losses `b` diverges and the formula limits to `p`.
    pub fn kelly_weight(&self, win_rate: f64, avg_win: f64, avg_loss: f64) -> f64 {
        if avg_win <= 0.0 {
            return self.config.min_position_pct;
        }
        let p = win_rate.clamp(0.01, 0.99);
        let q = 1.0 - p;
        let f = if avg_loss <= 0.0 {
            p
        } else {
            let b = avg_win / avg_loss;
            (p * b - q) / b
        };
        self.clamp(f * self.config.kelly_fraction)
    }

    /// Weight such that a stop-out loses exactly `risk_budget` of equity.
    pub fn fixed_risk_weight(&self, risk_budget: f64, stop_distance_pct: f64) -> f64 {
        if risk_budget <= 0.0 || stop_distance_pct <= 0.0 {
            return self.config.min_position_pct;
        }
        self.clamp(risk_budget / stop_distance_pct)
    }

    /// Inverse-volatility weight scaling toward the configured target.
    pub fn vol_target_weight(&self, annualized_vol: f64) -> f64 {
        if annualized_vol <= 0.0 {
            return self.config.max_position_pct;
        }
        self.clamp(self.config.target_volatility / annualized_vol)
    }

    /// Equal share of a book with `n_positions` slots.
    pub fn equal_weight(&self, n_positions: usize) -> f64 {
        self.clamp(1.0 / n_positions.max(1) as f64)
    }

    /// The production rule: conservative base, confidence scaling, Kelly cap,
    /// equal-weight floor, band clamp.
    pub fn composite(&self, inputs: &SizingInputs) -> f64 {
        let budget = self.config.risk_budgets.budget_for(inputs.category);
        let fixed = self.fixed_risk_weight(budget, inputs.stop_distance_pct);
        let base = match inputs.annualized_vol {
            Some(vol) => fixed.min(self.vol_target_weight(vol)),
            None => fixed,
        };
        let mut weight = base * inputs.confidence.clamp(0.0, 1.0);

        let stats = &inputs.trade_stats;
        if stats.n_trades() >= self.config.min_kelly_trades {
            let cap = self.kelly_weight(stats.win_rate(), stats.avg_win(), stats.avg_loss());
            weight = weight.min(cap);
        }

        weight = weight.max(self.equal_weight(inputs.book_size));
        self.clamp(weight)
    }

    /// Whole-share count for a weight at the given equity and price.
    pub fn target_shares(&self, weight: f64, equity: f64, price: f64) -> u64 {
        if weight <= 0.0 || equity <= 0.0 || price <= 0.0 {
            return 0;
        }
        (weight * equity / price).floor() as u64
    }
}
