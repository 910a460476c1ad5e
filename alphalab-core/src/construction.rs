//! PortfolioConstructor — converts ranked candidates into orders under
//! book-level constraints: position count, sector caps, daily turnover
//! budget, and the portfolio drawdown halt.

use crate::domain::portfolio::PortfolioState;
use crate::domain::signal::Signal;
use crate::domain::trade::ExitReason;
use crate::domain::SectorMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConstructorError {
    #[error("max_positions must be at least 1")]
    InvalidMaxPositions,
    #[error("{field} must be in (0, 1], got {value}")]
    InvalidPct { field: &'static str, value: f64 },
    #[error("max_drawdown_halt must be in (0, 1), got {value}")]
    InvalidHalt { value: f64 },
}

/// Book-level constraints. Validated eagerly by `PortfolioConstructor::new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructorConfig {
    /// Maximum concurrent positions.
    pub max_positions: usize,
    /// Hard per-position weight cap.
    pub max_position_pct: f64,
    /// Gross exposure cap per sector, fraction of equity.
    pub max_sector_pct: f64,
    /// New-entry notional budget per day, fraction of equity.
    pub max_daily_turnover_pct: f64,
    /// Drawdown from peak equity that forces the book flat.
    pub max_drawdown_halt: f64,
}

impl Default for ConstructorConfig {
    fn default() -> Self {
        Self {
            max_positions: 20,
            max_position_pct: 0.10,
            max_sector_pct: 0.30,
            max_daily_turnover_pct: 0.25,
            max_drawdown_halt: 0.20,
        }
    }
}

impl ConstructorConfig {
    pub fn validate(&self) -> Result<(), ConstructorError> {
        if self.max_positions == 0 {
            return Err(ConstructorError::InvalidMaxPositions);
        }
        let pcts = [
            ("max_position_pct", self.max_position_pct),
            ("max_sector_pct", self.max_sector_pct),
            ("max_daily_turnover_pct", self.max_daily_turnover_pct),
        ];
        for (field, value) in pcts {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(ConstructorError::InvalidPct { field, value });
            }
        }
        if !self.max_drawdown_halt.is_finite()
            || self.max_drawdown_halt <= 0.0
            || self.max_drawdown_halt >= 1.0
        {
            return Err(ConstructorError::InvalidHalt {
                value: self.max_drawdown_halt,
            });
        }
        Ok(())
    }
}

/// A candidate with its already-sized target weight.
#[derive(Debug, Clone)]
pub struct SizedCandidate {
    pub signal: Signal,
    pub weight: f64,
}

/// An accepted entry, sized in whole shares at the day's price.
#[derive(Debug, Clone)]
pub struct EntryOrder {
    pub signal: Signal,
    pub weight: f64,
    pub shares: f64,
    pub notional: f64,
}

/// A position the book wants closed and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseIntent {
    pub ticker: String,
    pub reason: ExitReason,
}

/// One day's construction output.
#[derive(Debug, Clone, Default)]
pub struct DayPlan {
    pub closes: Vec<CloseIntent>,
    pub entries: Vec<EntryOrder>,
    pub halted: bool,
}

impl DayPlan {
    fn halt(closes: Vec<CloseIntent>) -> Self {
        Self {
            closes,
            entries: Vec::new(),
            halted: true,
        }
    }
}

/// Weighting schemes for building a target book directly from a signal set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    EqualWeight,
    ScoreWeighted,
    InverseVol,
}

/// Stateful across a run: carries the peak-equity ratchet and the latched
/// drawdown halt. Once halted, every `plan` call returns a flatten-the-book
/// plan until `reset` is called.
#[derive(Debug, Clone)]
pub struct PortfolioConstructor {
    config: ConstructorConfig,
    peak_equity: f64,
    halted: bool,
}

impl PortfolioConstructor {
    pub fn new(config: ConstructorConfig) -> Result<Self, ConstructorError> {
        config.validate()?;
        Ok(Self {
            config,
            peak_equity: 0.0,
            halted: false,
        })
    }

    pub fn config(&self) -> &ConstructorConfig {
        &self.config
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    /// Clear the halt latch and restart the peak ratchet from scratch.
    pub fn reset(&mut self) {
        self.halted = false;
        self.peak_equity = 0.0;
    }

    /// Default target weight when no external sizer is involved:
    /// confidence-scaled share of the per-position cap.
    pub fn confidence_weight(&self, signal: &Signal) -> f64 {
        let confidence = signal.confidence.clamp(0.0, 1.0);
        (confidence * self.config.max_position_pct).min(self.config.max_position_pct)
    }

    /// Stop and take-profit trigger scan at the latest marks. Stops win over
    /// take-profits when both trigger on the same bar. The book iterates in
    /// ticker order, so the scan output is deterministic.
    pub fn exit_triggers(state: &PortfolioState) -> Vec<CloseIntent> {
        state
            .positions
            .values()
            .filter_map(|position| {
                let price = position.last_price;
                if position.stop_hit(price) {
                    Some(CloseIntent {
                        ticker: position.ticker.clone(),
                        reason: ExitReason::StopLoss,
                    })
                } else if position.take_profit_hit(price) {
                    Some(CloseIntent {
                        ticker: position.ticker.clone(),
                        reason: ExitReason::TakeProfit,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Build the day's plan from sized candidates.
    ///
    /// The drawdown check runs on every call, so a breach on a non-rebalance
    /// day (callers pass an empty candidate list) still flattens the book.
    pub fn plan(
        &mut self,
        candidates: &[SizedCandidate],
        state: &PortfolioState,
        day_prices: &HashMap<String, f64>,
        sectors: &SectorMap,
    ) -> DayPlan {
        let equity = state.equity();

        if !self.halted && self.peak_equity > 0.0 && equity < self.peak_equity {
            let drawdown = (self.peak_equity - equity) / self.peak_equity;
            if drawdown > self.config.max_drawdown_halt {
                self.halted = true;
            }
        }
        if self.halted {
            let closes = state
                .positions
                .keys()
                .map(|ticker| CloseIntent {
                    ticker: ticker.clone(),
                    reason: ExitReason::DrawdownHalt,
                })
                .collect();
            return DayPlan::halt(closes);
        }
        self.peak_equity = self.peak_equity.max(equity);

        let closes = Self::exit_triggers(state);
        let mut plan = DayPlan {
            closes,
            entries: Vec::new(),
            halted: false,
        };
        if equity <= 0.0 {
            return plan;
        }

        // Highest score first; ties broken by ticker for determinism.
        let mut ranked: Vec<&SizedCandidate> = candidates
            .iter()
            .filter(|candidate| !candidate.signal.direction.is_flat())
            .filter(|candidate| candidate.signal.score.is_finite())
            .collect();
        ranked.sort_by(|a, b| {
            b.signal
                .score
                .partial_cmp(&a.signal.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.signal.ticker.cmp(&b.signal.ticker))
        });

        let turnover_budget = self.config.max_daily_turnover_pct * equity;
        let mut turnover_used = 0.0;
        let mut accepted_sectors: HashMap<String, f64> = HashMap::new();

        for candidate in ranked {
            let ticker = &candidate.signal.ticker;
            if state.has_position(ticker) {
                continue;
            }
            if plan
                .entries
                .iter()
                .any(|entry| &entry.signal.ticker == ticker)
            {
                continue;
            }
            if state.position_count() + plan.entries.len() >= self.config.max_positions {
                continue;
            }
            let price = match day_prices.get(ticker).copied() {
                Some(price) if price > 0.0 => price,
                _ => continue,
            };
            let weight = candidate.weight.min(self.config.max_position_pct);
            if weight <= 0.0 {
                continue;
            }
            let shares = (weight * equity / price).floor();
            if shares < 1.0 {
                continue;
            }
            let notional = shares * price;

            let sector = sectors.sector_of(ticker).to_string();
            let sector_open = state.sector_exposure_pct(&sector, equity);
            let sector_accepted = accepted_sectors.get(&sector).copied().unwrap_or(0.0);
            if sector_open + (sector_accepted + notional) / equity > self.config.max_sector_pct {
                continue;
            }

            // Turnover budget is a hard cut: once breached, the day is done.
            if turnover_used + notional > turnover_budget {
                break;
            }
            turnover_used += notional;
            *accepted_sectors.entry(sector).or_insert(0.0) += notional;
            plan.entries.push(EntryOrder {
                signal: candidate.signal.clone(),
                weight,
                shares,
                notional,
            });
        }

        plan
    }

    /// Target weights for a whole signal set under one scheme, each capped at
    /// `max_position_pct`. Flat directions and duplicate tickers are dropped.
    pub fn target_weights(
        &self,
        signals: &[Signal],
        scheme: WeightScheme,
        vols: &HashMap<String, f64>,
    ) -> Vec<(String, f64)> {
        let mut picked: Vec<&Signal> = Vec::new();
        for signal in signals {
            if signal.direction.is_flat() {
                continue;
            }
            if picked.iter().any(|s| s.ticker == signal.ticker) {
                continue;
            }
            if scheme == WeightScheme::InverseVol {
                match vols.get(&signal.ticker) {
                    Some(vol) if *vol > 0.0 => {}
                    _ => continue,
                }
            }
            picked.push(signal);
        }
        if picked.is_empty() {
            return Vec::new();
        }

        let raw: Vec<f64> = match scheme {
            WeightScheme::EqualWeight => vec![1.0; picked.len()],
            WeightScheme::ScoreWeighted => {
                let scores: Vec<f64> = picked.iter().map(|s| s.score.max(0.0)).collect();
                if scores.iter().sum::<f64>() <= 0.0 {
                    vec![1.0; picked.len()]
                } else {
                    scores
                }
            }
            WeightScheme::InverseVol => picked
                .iter()
                .map(|s| 1.0 / vols[&s.ticker])
                .collect(),
        };
        let total: f64 = raw.iter().sum();

        picked
            .iter()
            .zip(raw)
            .map(|(signal, weight)| {
                (
                    signal.ticker.clone(),
                    (weight / total).min(self.config.max_position_pct),
                )
            })
            .collect()
    }
}
