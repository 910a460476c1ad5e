//! Backtest result summarizer.
//!
//! Folds a raw `BacktestRun` into a `BacktestResult`: strategy-level
//! metrics, trade-log statistics, cost drag, and the derived series an
//! analyst reads first. The record is plain data; rendering and export
//! live outside this crate.

use std::collections::BTreeMap;

use alphalab_core::{BacktestRun, ExitReason, Trade};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::metrics::{drawdown_series, StrategyMetrics};

// ─── Trade statistics ────────────────────────────────────────────────

/// How many trades closed for each reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCounts {
    pub stop_loss: usize,
    pub take_profit: usize,
    pub max_hold: usize,
    pub drawdown_halt: usize,
    pub end_of_backtest: usize,
}

impl ExitCounts {
    fn tally(trades: &[Trade]) -> Self {
        let mut counts = Self::default();
        for trade in trades {
            match trade.exit_reason {
                ExitReason::StopLoss => counts.stop_loss += 1,
                ExitReason::TakeProfit => counts.take_profit += 1,
                ExitReason::MaxHold => counts.max_hold += 1,
                ExitReason::DrawdownHalt => counts.drawdown_halt += 1,
                ExitReason::EndOfBacktest => counts.end_of_backtest += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.stop_loss + self.take_profit + self.max_hold + self.drawdown_halt
            + self.end_of_backtest
    }
}

/// Aggregate statistics over a trade log.
///
/// `profit_factor` is gross profit over gross loss, with `+∞` when there
/// are gains but no losses. `avg_loss` and `worst_trade` keep their sign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSummary {
    pub n_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Mean PnL per trade.
    pub expectancy: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub avg_holding_days: f64,
    pub exit_counts: ExitCounts,
}

impl TradeSummary {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let n = trades.len();
        if n == 0 {
            return Self {
                n_trades: 0,
                win_rate: 0.0,
                profit_factor: 0.0,
                expectancy: 0.0,
                avg_win: 0.0,
                avg_loss: 0.0,
                best_trade: 0.0,
                worst_trade: 0.0,
                avg_holding_days: 0.0,
                exit_counts: ExitCounts::default(),
            };
        }

        let winners: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
        let losers: Vec<f64> = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl).collect();

        let gross_profit: f64 = winners.iter().sum();
        let gross_loss: f64 = losers.iter().map(|p| -p).sum();
        let profit_factor = if gross_loss < 1e-10 {
            if gross_profit > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            gross_profit / gross_loss
        };

        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let avg_win = if winners.is_empty() {
            0.0
        } else {
            gross_profit / winners.len() as f64
        };
        let avg_loss = if losers.is_empty() {
            0.0
        } else {
            losers.iter().sum::<f64>() / losers.len() as f64
        };

        let best_trade = trades.iter().map(|t| t.pnl).fold(f64::MIN, f64::max);
        let worst_trade = trades.iter().map(|t| t.pnl).fold(f64::MAX, f64::min);
        let total_holding: usize = trades.iter().map(|t| t.holding_days).sum();

        Self {
            n_trades: n,
            win_rate: winners.len() as f64 / n as f64,
            profit_factor,
            expectancy: total_pnl / n as f64,
            avg_win,
            avg_loss,
            best_trade,
            worst_trade,
            avg_holding_days: total_holding as f64 / n as f64,
            exit_counts: ExitCounts::tally(trades),
        }
    }
}

// ─── Summary record ──────────────────────────────────────────────────

/// The analyst-facing summary of one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub config_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub halted: bool,

    pub metrics: StrategyMetrics,
    pub trades: TradeSummary,

    /// Total cash fees paid over the run.
    pub cost_drag: f64,
    /// Fees as a fraction of initial capital.
    pub cost_drag_pct: f64,
    /// Fraction of calendar months with a positive compounded return.
    pub monthly_hit_rate: f64,

    pub dates: Vec<NaiveDate>,
    pub equity_curve: Vec<f64>,
    pub daily_returns: Vec<f64>,
    /// Fractional drawdown per day, aligned with `equity_curve`.
    pub drawdown_series: Vec<f64>,
    pub trade_log: Vec<Trade>,
}

/// Summarize a run record.
///
/// `benchmark` is an optional daily return series aligned with the run's
/// dates; `n_trials` is the number of strategy variants evaluated before
/// this one (feeds the deflated Sharpe).
pub fn summarize(run: &BacktestRun, benchmark: Option<&[f64]>, n_trials: usize) -> BacktestResult {
    let metrics = StrategyMetrics::compute(&run.daily_returns, benchmark, n_trials);
    let cost_drag_pct = if run.initial_capital > 0.0 {
        run.total_fees / run.initial_capital
    } else {
        0.0
    };

    BacktestResult {
        strategy: run.strategy.clone(),
        config_id: run.config_id.clone(),
        start_date: run.start_date,
        end_date: run.end_date,
        initial_capital: run.initial_capital,
        final_equity: run.final_equity(),
        halted: run.halted,
        metrics,
        trades: TradeSummary::from_trades(&run.trades),
        cost_drag: run.total_fees,
        cost_drag_pct,
        monthly_hit_rate: monthly_hit_rate(&run.dates, &run.daily_returns),
        dates: run.dates.clone(),
        equity_curve: run.equity_curve.clone(),
        daily_returns: run.daily_returns.clone(),
        drawdown_series: drawdown_series(&run.equity_curve),
        trade_log: run.trades.clone(),
    }
}

/// Fraction of calendar months whose compounded return is positive.
fn monthly_hit_rate(dates: &[NaiveDate], returns: &[f64]) -> f64 {
    if dates.is_empty() || dates.len() != returns.len() {
        return 0.0;
    }
    let mut months: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for (date, r) in dates.iter().zip(returns) {
        let growth = months.entry((date.year(), date.month())).or_insert(1.0);
        *growth *= 1.0 + r;
    }
    let positive = months.values().filter(|g| **g > 1.0).count();
    positive as f64 / months.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use alphalab_core::{Direction, SignalCategory};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn trade(pnl: f64, holding_days: usize, exit_reason: ExitReason) -> Trade {
        Trade {
            ticker: "AAPL".into(),
            direction: Direction::Long,
            strategy: "xsec_momentum".into(),
            category: SignalCategory::Momentum,
            entry_date: d(2024, 1, 2),
            entry_price: 100.0,
            exit_date: d(2024, 1, 20),
            exit_price: 100.0 + pnl / 10.0,
            exit_reason,
            shares: 10.0,
            pnl,
            pnl_pct: pnl / 1000.0,
            costs: 2.0,
            holding_days,
            mfe: pnl.max(0.0),
            mae: pnl.min(0.0),
        }
    }

    fn sample_run() -> BacktestRun {
        let dates = vec![
            d(2024, 1, 30),
            d(2024, 1, 31),
            d(2024, 2, 1),
            d(2024, 2, 2),
        ];
        BacktestRun {
            strategy: "xsec_momentum".into(),
            config_id: "deadbeef".into(),
            start_date: dates[0],
            end_date: dates[3],
            initial_capital: 100_000.0,
            dates,
            equity_curve: vec![100_000.0, 101_000.0, 100_500.0, 101_500.0],
            daily_returns: vec![0.0, 0.01, -0.004_950_495_049_504_95, 0.009_950_248_756_218_906],
            trades: vec![
                trade(400.0, 10, ExitReason::TakeProfit),
                trade(-150.0, 5, ExitReason::StopLoss),
                trade(250.0, 15, ExitReason::EndOfBacktest),
            ],
            final_cash: 101_500.0,
            total_fees: 42.5,
            halted: false,
        }
    }

    // ─── Trade summary ───────────────────────────────────────────

    #[test]
    fn trade_summary_known_values() {
        let run = sample_run();
        let summary = TradeSummary::from_trades(&run.trades);
        assert_eq!(summary.n_trades, 3);
        assert!((summary.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((summary.profit_factor - 650.0 / 150.0).abs() < 1e-12);
        assert!((summary.expectancy - 500.0 / 3.0).abs() < 1e-12);
        assert!((summary.avg_win - 325.0).abs() < 1e-12);
        assert!((summary.avg_loss + 150.0).abs() < 1e-12);
        assert_eq!(summary.best_trade, 400.0);
        assert_eq!(summary.worst_trade, -150.0);
        assert!((summary.avg_holding_days - 10.0).abs() < 1e-12);
    }

    #[test]
    fn exit_counts_partition_the_log() {
        let run = sample_run();
        let counts = ExitCounts::tally(&run.trades);
        assert_eq!(counts.take_profit, 1);
        assert_eq!(counts.stop_loss, 1);
        assert_eq!(counts.end_of_backtest, 1);
        assert_eq!(counts.max_hold, 0);
        assert_eq!(counts.total(), run.trades.len());
    }

    #[test]
    fn profit_factor_infinite_without_losses() {
        let trades = vec![trade(100.0, 3, ExitReason::TakeProfit)];
        let summary = TradeSummary::from_trades(&trades);
        assert!(summary.profit_factor.is_infinite());
        assert_eq!(summary.win_rate, 1.0);
        assert_eq!(summary.avg_loss, 0.0);
    }

    #[test]
    fn empty_trade_log_is_all_zero() {
        let summary = TradeSummary::from_trades(&[]);
        assert_eq!(summary.n_trades, 0);
        assert_eq!(summary.profit_factor, 0.0);
        assert_eq!(summary.best_trade, 0.0);
        assert_eq!(summary.worst_trade, 0.0);
    }

    // ─── Summarizer ──────────────────────────────────────────────

    #[test]
    fn summarize_carries_run_identity() {
        let run = sample_run();
        let result = summarize(&run, None, 1);
        assert_eq!(result.strategy, "xsec_momentum");
        assert_eq!(result.config_id, "deadbeef");
        assert_eq!(result.start_date, run.start_date);
        assert_eq!(result.end_date, run.end_date);
        assert!((result.final_equity - 101_500.0).abs() < 1e-9);
        assert!(!result.halted);
    }

    #[test]
    fn cost_drag_is_fees_over_capital() {
        let run = sample_run();
        let result = summarize(&run, None, 1);
        assert!((result.cost_drag - 42.5).abs() < 1e-12);
        assert!((result.cost_drag_pct - 42.5 / 100_000.0).abs() < 1e-15);
    }

    #[test]
    fn series_are_aligned() {
        let run = sample_run();
        let result = summarize(&run, None, 1);
        assert_eq!(result.drawdown_series.len(), result.equity_curve.len());
        assert_eq!(result.daily_returns.len(), result.dates.len());
        assert_eq!(result.trade_log.len(), 3);
        assert_eq!(result.metrics.n_returns, 4);
        // Day 3 sits below the 101k peak.
        assert!(result.drawdown_series[2] > 0.0);
        assert_eq!(result.drawdown_series[3], 0.0);
    }

    #[test]
    fn monthly_hit_rate_groups_by_calendar_month() {
        let run = sample_run();
        // January: 0.0 then +1% → positive. February: −0.495% then +0.995% → positive.
        let result = summarize(&run, None, 1);
        assert!((result.monthly_hit_rate - 1.0).abs() < 1e-12);

        let mut losing = run.clone();
        losing.daily_returns = vec![0.0, -0.01, 0.02, 0.001];
        // January: −1% → negative. February: positive.
        let result = summarize(&losing, None, 1);
        assert!((result.monthly_hit_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn summary_serializes() {
        let result = summarize(&sample_run(), None, 1);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"strategy\":\"xsec_momentum\""));
    }
}
