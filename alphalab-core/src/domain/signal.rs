//! Signal — upstream trade ideas and their category-level risk budgets.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Trade direction for a signal or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    /// Sign multiplier: +1 long, -1 short, 0 flat.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Flat => 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, Direction::Flat)
    }
}

/// Closed set of strategy categories.
///
/// Risk budgets are keyed on this enum so that an unknown category is a
/// compile error, not a silent default at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    Momentum,
    Breakout,
    MeanReversion,
    Defensive,
    SafeBet,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 5] = [
        SignalCategory::Momentum,
        SignalCategory::Breakout,
        SignalCategory::MeanReversion,
        SignalCategory::Defensive,
        SignalCategory::SafeBet,
    ];
}

/// Per-trade risk budget (fraction of equity lost if the stop is hit) for
/// each signal category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBudgets {
    pub momentum: f64,
    pub breakout: f64,
    pub mean_reversion: f64,
    pub defensive: f64,
    pub safe_bet: f64,
}

impl Default for RiskBudgets {
    /// Aggressive categories risk less per trade than defensive ones.
    fn default() -> Self {
        Self {
            momentum: 0.008,
            breakout: 0.008,
            mean_reversion: 0.010,
            defensive: 0.012,
            safe_bet: 0.015,
        }
    }
}

impl RiskBudgets {
    /// Budget for a category. Exhaustive on purpose.
    pub fn budget_for(&self, category: SignalCategory) -> f64 {
        match category {
            SignalCategory::Momentum => self.momentum,
            SignalCategory::Breakout => self.breakout,
            SignalCategory::MeanReversion => self.mean_reversion,
            SignalCategory::Defensive => self.defensive,
            SignalCategory::SafeBet => self.safe_bet,
        }
    }

    /// Every budget must be a positive fraction no larger than 20% of equity.
    pub fn validate(&self) -> Result<(), SignalError> {
        for category in SignalCategory::ALL {
            let budget = self.budget_for(category);
            if !budget.is_finite() || budget <= 0.0 || budget > 0.2 {
                return Err(SignalError::InvalidRiskBudget { category, budget });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("risk budget for {category:?} must be in (0, 0.2], got {budget}")]
    InvalidRiskBudget {
        category: SignalCategory,
        budget: f64,
    },
}

/// A dated trade idea produced upstream. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub ticker: String,
    pub date: NaiveDate,
    /// Ranking score; higher is better. Used to order candidates.
    pub score: f64,
    pub direction: Direction,
    /// Conviction in [0, 1]. Scales position size.
    pub confidence: f64,
    /// Advisory expected holding period in trading days. The engine's hard
    /// max-hold ceiling is a separate config knob.
    pub holding_days: u32,
    pub category: SignalCategory,
    pub strategy: String,
}

/// Signals grouped by date. The engine asks only for the current day's
/// entries, so future signals are structurally unreachable from the day loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalTable {
    by_date: BTreeMap<NaiveDate, Vec<Signal>>,
}

impl SignalTable {
    pub fn new(signals: Vec<Signal>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, Vec<Signal>> = BTreeMap::new();
        for signal in signals {
            by_date.entry(signal.date).or_default().push(signal);
        }
        Self { by_date }
    }

    /// Signals stamped exactly on `date`. Empty slice when none.
    pub fn for_date(&self, date: NaiveDate) -> &[Signal] {
        self.by_date.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_date.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.by_date.keys().copied()
    }
}
