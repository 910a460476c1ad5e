//! BacktestEngine — the strictly sequential daily state machine.
//!
//! Day `t` sees closes up to row `t` and signals stamped on day `t`, nothing
//! later. Each day runs the same phases in a fixed order: mark, exits,
//! construction, fills, record. Runs are single-threaded on purpose; the
//! parallelism in this workspace lives in the validation layer where
//! iterations are independent.

use super::config::{ConfigError, EngineConfig};
use super::result::BacktestRun;
use crate::construction::{CloseIntent, EntryOrder, PortfolioConstructor, SizedCandidate};
use crate::domain::portfolio::PortfolioState;
use crate::domain::position::Position;
use crate::domain::signal::{Direction, Signal, SignalTable};
use crate::domain::trade::{ExitReason, Trade};
use crate::domain::{PriceTable, SectorMap};
use crate::sizing::{PositionSizer, SizingInputs, TradeStats};
use chrono::NaiveDate;
use std::collections::HashMap;
use thiserror::Error;

/// Trailing daily returns required before a volatility estimate is trusted.
const MIN_VOL_OBSERVATIONS: usize = 20;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("price history is empty")]
    EmptyPriceHistory,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct BacktestEngine {
    config: EngineConfig,
    sizer: PositionSizer,
}

impl BacktestEngine {
    /// Validates the whole config tree up front; a misconfigured engine is
    /// unconstructible.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sizer = PositionSizer::new(config.sizer.clone())?;
        Ok(Self { config, sizer })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the day loop over the full price history.
    pub fn run(
        &self,
        prices: &PriceTable,
        sectors: &SectorMap,
        signals: &SignalTable,
        strategy: &str,
    ) -> Result<BacktestRun, EngineError> {
        if prices.is_empty() {
            return Err(EngineError::EmptyPriceHistory);
        }
        let n_days = prices.len();
        let mut constructor =
            PortfolioConstructor::new(self.config.constructor.clone()).map_err(ConfigError::from)?;
        let mut state = PortfolioState::new(self.config.initial_capital, prices.dates()[0]);
        let mut trades: Vec<Trade> = Vec::new();
        let mut stats = TradeStats::default();
        let mut equity_curve: Vec<f64> = Vec::with_capacity(n_days);
        let mut daily_returns: Vec<f64> = Vec::with_capacity(n_days);
        let mut ever_halted = false;
        let mut prev_date: Option<NaiveDate> = None;

        for index in 0..n_days {
            let date = prices.dates()[index];
            state.as_of = date;

            // Phase 1: mark to market. Gap days keep the previous mark.
            let held: Vec<String> = state.positions.keys().cloned().collect();
            for ticker in &held {
                if let Some(price) = prices.tradable_close(ticker, index) {
                    state.mark(ticker, price);
                }
            }

            // Phase 2: exits at today's marks. Stop/take-profit triggers
            // first, then the hard holding ceiling for whatever remains.
            let mut closes = PortfolioConstructor::exit_triggers(&state);
            for position in state.positions.values() {
                if index - position.entry_index >= self.config.hard_max_hold_days
                    && !closes.iter().any(|close| close.ticker == position.ticker)
                {
                    closes.push(CloseIntent {
                        ticker: position.ticker.clone(),
                        reason: ExitReason::MaxHold,
                    });
                }
            }
            for close in &closes {
                self.close_position(&mut state, close, date, index, &mut trades, &mut stats);
            }

            // Phase 3: construction. The drawdown check runs every day; new
            // candidates only flow in on rebalance days, and never on the
            // final bar where they would be force-closed at once.
            let final_bar = index + 1 == n_days;
            let rebalance = self.config.rebalance.is_rebalance_day(date, prev_date);
            let candidates = if rebalance && !final_bar {
                self.size_candidates(signals.for_date(date), prices, index, stats)
            } else {
                Vec::new()
            };
            let day_prices = day_price_map(&candidates, prices, index);
            let plan = constructor.plan(&candidates, &state, &day_prices, sectors);
            ever_halted |= plan.halted;
            for close in &plan.closes {
                self.close_position(&mut state, close, date, index, &mut trades, &mut stats);
            }
            for order in &plan.entries {
                self.open_position(&mut state, order, sectors, date, index);
            }

            // Phase 4: terminal force-close, then record the day.
            if final_bar {
                let remaining: Vec<String> = state.positions.keys().cloned().collect();
                for ticker in remaining {
                    let close = CloseIntent {
                        ticker,
                        reason: ExitReason::EndOfBacktest,
                    };
                    self.close_position(&mut state, &close, date, index, &mut trades, &mut stats);
                }
            }
            let equity = state.equity();
            debug_assert!(equity.is_finite(), "equity diverged on {date}");
            let prev_equity = equity_curve
                .last()
                .copied()
                .unwrap_or(self.config.initial_capital);
            daily_returns.push(if prev_equity > 0.0 {
                equity / prev_equity - 1.0
            } else {
                0.0
            });
            equity_curve.push(equity);
            prev_date = Some(date);
        }

        Ok(BacktestRun {
            strategy: strategy.to_string(),
            config_id: self.config.config_id(),
            start_date: prices.dates()[0],
            end_date: prices.dates()[n_days - 1],
            initial_capital: self.config.initial_capital,
            dates: prices.dates().to_vec(),
            equity_curve,
            daily_returns,
            trades,
            final_cash: state.cash,
            total_fees: state.total_fees,
            halted: ever_halted,
        })
    }

    /// Composite-size the day's signals. Volatility comes from a trailing
    /// window ending today; the Kelly inputs only see already-closed trades.
    fn size_candidates(
        &self,
        signals: &[Signal],
        prices: &PriceTable,
        index: usize,
        stats: TradeStats,
    ) -> Vec<SizedCandidate> {
        signals
            .iter()
            .filter(|signal| !signal.direction.is_flat())
            .map(|signal| {
                let trailing =
                    prices.trailing_returns(&signal.ticker, index, self.config.vol_window_days);
                let inputs = SizingInputs {
                    confidence: signal.confidence,
                    category: signal.category,
                    stop_distance_pct: self.config.stop_loss_pct,
                    annualized_vol: annualized_vol(&trailing),
                    trade_stats: stats,
                    book_size: self.config.constructor.max_positions,
                };
                SizedCandidate {
                    signal: signal.clone(),
                    weight: self.sizer.composite(&inputs),
                }
            })
            .collect()
    }

    fn open_position(
        &self,
        state: &mut PortfolioState,
        order: &EntryOrder,
        sectors: &SectorMap,
        date: NaiveDate,
        index: usize,
    ) {
        let signal = &order.signal;
        let direction = signal.direction;
        if direction.is_flat() || order.shares < 1.0 {
            return;
        }
        let close = order.notional / order.shares;
        let fill = self.config.costs.effective_entry_price(close, direction);
        let fees = self.config.costs.entry_fees(fill, order.shares);

        // Reject rather than clip when cash cannot carry the fill. Shorts
        // post the full notional as margin.
        if order.shares * fill + fees > state.cash {
            return;
        }
        state.cash -= order.shares * fill * direction.sign();
        state.cash -= fees;
        state.total_fees += fees;

        let (stop_price, take_profit_price) = match direction {
            Direction::Short => (
                fill * (1.0 + self.config.stop_loss_pct),
                fill * (1.0 - self.config.take_profit_pct),
            ),
            _ => (
                fill * (1.0 - self.config.stop_loss_pct),
                fill * (1.0 + self.config.take_profit_pct),
            ),
        };

        let mut position = Position {
            ticker: signal.ticker.clone(),
            direction,
            strategy: signal.strategy.clone(),
            category: signal.category,
            sector: sectors.sector_of(&signal.ticker).to_string(),
            entry_price: fill,
            entry_date: date,
            entry_index: index,
            entry_weight: order.weight,
            entry_fees: fees,
            shares: order.shares,
            stop_price,
            take_profit_price,
            last_price: fill,
            mfe: 0.0,
            mae: 0.0,
        };
        // The first mark is the market close, so the fill's price impact
        // shows up in equity immediately.
        position.mark(close);
        state.positions.insert(signal.ticker.clone(), position);
    }

    fn close_position(
        &self,
        state: &mut PortfolioState,
        close: &CloseIntent,
        date: NaiveDate,
        index: usize,
        trades: &mut Vec<Trade>,
        stats: &mut TradeStats,
    ) {
        let position = match state.positions.remove(&close.ticker) {
            Some(position) => position,
            None => return,
        };
        let holding_days = index - position.entry_index;
        let fill = self
            .config
            .costs
            .effective_exit_price(position.last_price, position.direction);
        let exit_fees =
            self.config
                .costs
                .exit_fees(fill, position.shares, position.direction, holding_days);

        state.cash += position.shares * fill * position.direction.sign();
        state.cash -= exit_fees;
        state.total_fees += exit_fees;

        let costs = position.entry_fees + exit_fees;
        let pnl =
            (fill - position.entry_price) * position.shares * position.direction.sign() - costs;
        let entry_notional = position.entry_price * position.shares;
        let pnl_pct = if entry_notional > 0.0 {
            pnl / entry_notional
        } else {
            0.0
        };

        trades.push(Trade {
            ticker: position.ticker.clone(),
            direction: position.direction,
            strategy: position.strategy.clone(),
            category: position.category,
            entry_date: position.entry_date,
            entry_price: position.entry_price,
            exit_date: date,
            exit_price: fill,
            exit_reason: close.reason,
            shares: position.shares,
            pnl,
            pnl_pct,
            costs,
            holding_days,
            mfe: position.mfe,
            mae: position.mae,
        });
        stats.record(pnl);
    }
}

/// Day prices for the candidate set only; held positions already carry
/// their marks.
fn day_price_map(
    candidates: &[SizedCandidate],
    prices: &PriceTable,
    index: usize,
) -> HashMap<String, f64> {
    candidates
        .iter()
        .filter_map(|candidate| {
            prices
                .tradable_close(&candidate.signal.ticker, index)
                .map(|price| (candidate.signal.ticker.clone(), price))
        })
        .collect()
}

/// Annualized volatility of a daily return window, or `None` when the
/// window is too short to mean anything.
fn annualized_vol(returns: &[f64]) -> Option<f64> {
    if returns.len() < MIN_VOL_OBSERVATIONS {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let vol = variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt();
    (vol > 0.0).then_some(vol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annualized_vol_requires_history() {
        let short = vec![0.01; MIN_VOL_OBSERVATIONS - 1];
        assert!(annualized_vol(&short).is_none());
        let flat = vec![0.01; 60];
        // Zero variance → no estimate.
        assert!(annualized_vol(&flat).is_none());
    }

    #[test]
    fn annualized_vol_known_value() {
        // Alternating ±1% has sample std slightly above 1% daily.
        let returns: Vec<f64> = (0..60)
            .map(|i| if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect();
        let vol = annualized_vol(&returns).unwrap();
        let daily = (60.0 / 59.0f64 * 0.0001).sqrt();
        assert!((vol - daily * TRADING_DAYS_PER_YEAR.sqrt()).abs() < 1e-12);
    }
}
