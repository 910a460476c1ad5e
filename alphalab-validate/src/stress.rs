//! Stress testing against historical regimes and execution assumptions.
//!
//! A strategy that only ever saw one regime has not been tested. The
//! historical windows replay named crisis and bull periods; the
//! three-windows test demands the edge show up in every third of the
//! sample; slippage sensitivity asks how much execution friction the
//! edge can absorb; parameter stability asks whether neighboring
//! parameter choices would have worked too.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{StrategyMetrics, TRADING_DAYS_PER_YEAR};
use crate::stats;

/// Windows shorter than this produce no metrics; a Sharpe over a
/// two-week overlap is noise.
pub const MIN_WINDOW_DAYS: usize = 21;

// ─── Historical windows ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Crisis,
    Bull,
}

/// A named historical period to replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressWindow {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub regime: Regime,
}

impl StressWindow {
    pub fn new(name: impl Into<String>, start: NaiveDate, end: NaiveDate, regime: Regime) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            regime,
        }
    }
}

fn day(year: i32, month: u32, dom: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, dom).expect("valid calendar date")
}

/// The standard window set: five crisis periods and three bull markets,
/// dated by S&P 500 peaks and troughs.
pub fn default_windows() -> Vec<StressWindow> {
    vec![
        StressWindow::new("GFC drawdown", day(2007, 10, 9), day(2009, 3, 9), Regime::Crisis),
        StressWindow::new("Euro debt crisis", day(2011, 5, 2), day(2011, 10, 4), Regime::Crisis),
        StressWindow::new(
            "China devaluation",
            day(2015, 6, 12),
            day(2016, 2, 11),
            Regime::Crisis,
        ),
        StressWindow::new("Covid crash", day(2020, 2, 19), day(2020, 3, 23), Regime::Crisis),
        StressWindow::new("2022 bear market", day(2022, 1, 3), day(2022, 10, 12), Regime::Crisis),
        StressWindow::new("2013 bull market", day(2013, 1, 2), day(2013, 12, 31), Regime::Bull),
        StressWindow::new("2017 low-vol bull", day(2017, 1, 3), day(2017, 12, 29), Regime::Bull),
        StressWindow::new("Post-Covid recovery", day(2020, 3, 24), day(2021, 12, 31), Regime::Bull),
    ]
}

/// Metrics for one window, or `None` when the backtest overlaps it by
/// fewer than [`MIN_WINDOW_DAYS`] days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowResult {
    pub name: String,
    pub regime: Regime,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub n_days: usize,
    pub metrics: Option<StrategyMetrics>,
}

#[derive(Debug, Error)]
pub enum StressError {
    #[error("date/return length mismatch: {n_dates} dates vs {n_returns} returns")]
    LengthMismatch { n_dates: usize, n_returns: usize },
    #[error("insufficient returns: {n_returns}, need at least {min}")]
    InsufficientData { n_returns: usize, min: usize },
}

/// Score the return series inside each window. Dates and returns must be
/// aligned day by day, as they are on a backtest result.
pub fn run_historical_windows(
    dates: &[NaiveDate],
    returns: &[f64],
    windows: &[StressWindow],
) -> Result<Vec<WindowResult>, StressError> {
    if dates.len() != returns.len() {
        return Err(StressError::LengthMismatch {
            n_dates: dates.len(),
            n_returns: returns.len(),
        });
    }

    let results = windows
        .iter()
        .map(|window| {
            let window_returns: Vec<f64> = dates
                .iter()
                .zip(returns)
                .filter(|(date, _)| **date >= window.start && **date <= window.end)
                .map(|(_, r)| *r)
                .collect();
            let n_days = window_returns.len();
            let metrics = if n_days >= MIN_WINDOW_DAYS {
                Some(StrategyMetrics::compute(&window_returns, None, 1))
            } else {
                None
            };
            WindowResult {
                name: window.name.clone(),
                regime: window.regime,
                start: window.start,
                end: window.end,
                n_days,
                metrics,
            }
        })
        .collect();
    Ok(results)
}

// ─── Three-windows test ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowSharpe {
    pub n_days: usize,
    pub sharpe: f64,
    pub pass: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreeWindowsResult {
    pub windows: [WindowSharpe; 3],
    pub worst_sharpe: f64,
    pub best_sharpe: f64,
    /// worst / best when best is positive, otherwise 0.
    pub consistency_ratio: f64,
    /// All three windows passed.
    pub pass: bool,
}

/// Split the sample into three contiguous thirds and require the Sharpe
/// to clear `min_sharpe` in each. An edge that lives in one third of the
/// history is a regime bet, not an edge.
pub fn three_windows_test(
    returns: &[f64],
    min_days: usize,
    min_sharpe: f64,
) -> Result<ThreeWindowsResult, StressError> {
    if returns.len() < 3 {
        return Err(StressError::InsufficientData {
            n_returns: returns.len(),
            min: 3,
        });
    }

    let third = returns.len() / 3;
    let bounds = [(0, third), (third, 2 * third), (2 * third, returns.len())];
    let windows = bounds.map(|(start, end)| {
        let window = &returns[start..end];
        let sharpe = annualized_sharpe(window);
        WindowSharpe {
            n_days: window.len(),
            sharpe,
            pass: window.len() >= min_days && sharpe > min_sharpe,
        }
    });

    let worst_sharpe = windows.iter().map(|w| w.sharpe).fold(f64::INFINITY, f64::min);
    let best_sharpe = windows
        .iter()
        .map(|w| w.sharpe)
        .fold(f64::NEG_INFINITY, f64::max);
    let consistency_ratio = if best_sharpe > 1e-15 {
        worst_sharpe / best_sharpe
    } else {
        0.0
    };

    Ok(ThreeWindowsResult {
        windows,
        worst_sharpe,
        best_sharpe,
        consistency_ratio,
        pass: windows.iter().all(|w| w.pass),
    })
}

// ─── Slippage sensitivity ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlippageLevel {
    pub slippage_bps: f64,
    pub annualized_return: f64,
    pub sharpe: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageSensitivity {
    pub levels: Vec<SlippageLevel>,
    /// First tested level at which the Sharpe drops to zero or below.
    pub breakeven_bps: Option<f64>,
}

/// Re-price the return series under extra per-trade slippage. The drag
/// is spread evenly across days from the round-trip count; volatility is
/// left untouched since slippage shifts the mean, not the dispersion.
pub fn slippage_sensitivity(
    returns: &[f64],
    round_trips_per_year: f64,
    levels: &[f64],
) -> Result<SlippageSensitivity, StressError> {
    if returns.len() < 2 {
        return Err(StressError::InsufficientData {
            n_returns: returns.len(),
            min: 2,
        });
    }

    let mean = stats::mean(returns);
    let std = stats::std_dev(returns);
    let mut out = Vec::with_capacity(levels.len());
    let mut breakeven_bps = None;
    for &bps in levels {
        // bps is the full round-trip cost, both legs included.
        let daily_drag = round_trips_per_year * bps * 1e-4 / TRADING_DAYS_PER_YEAR;
        let adjusted_mean = mean - daily_drag;
        let sharpe = if std < 1e-15 {
            0.0
        } else {
            adjusted_mean / std * TRADING_DAYS_PER_YEAR.sqrt()
        };
        if breakeven_bps.is_none() && sharpe <= 0.0 {
            breakeven_bps = Some(bps);
        }
        out.push(SlippageLevel {
            slippage_bps: bps,
            annualized_return: adjusted_mean * TRADING_DAYS_PER_YEAR,
            sharpe,
        });
    }

    Ok(SlippageSensitivity {
        levels: out,
        breakeven_bps,
    })
}

// ─── Parameter stability ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParameterStability {
    pub mean_sharpe: f64,
    pub std_sharpe: f64,
    /// std / |mean|; infinite when the mean Sharpe is zero.
    pub coefficient_of_variation: f64,
    /// Positive mean and coefficient of variation under 0.5.
    pub stable: bool,
}

/// Score a cluster of neighboring parameter variants. A lone peak in
/// parameter space is curve fitting; a plateau is a property of the
/// market.
pub fn parameter_stability(variant_sharpes: &[f64]) -> ParameterStability {
    let mean_sharpe = stats::mean(variant_sharpes);
    let std_sharpe = stats::std_dev(variant_sharpes);
    let coefficient_of_variation = if mean_sharpe.abs() < 1e-15 {
        f64::INFINITY
    } else {
        std_sharpe / mean_sharpe.abs()
    };
    ParameterStability {
        mean_sharpe,
        std_sharpe,
        coefficient_of_variation,
        stable: mean_sharpe > 0.0 && coefficient_of_variation < 0.5,
    }
}

fn annualized_sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = stats::mean(returns);
    let std = stats::std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean / std * TRADING_DAYS_PER_YEAR.sqrt()
}
