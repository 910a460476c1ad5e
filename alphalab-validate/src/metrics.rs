//! Performance metrics computed from a daily return series.
//!
//! `StrategyMetrics::compute` is the single aggregation point: risk-adjusted
//! ratios, drawdown statistics, tail shape, and a deflated Sharpe ratio that
//! discounts the observed Sharpe for the number of sibling strategy variants
//! tried (Bailey & López de Prado). All metrics guard degenerate inputs and
//! return sentinels instead of panicking.

use serde::{Deserialize, Serialize};

use crate::stats;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Rolling window for the consistency metric (one quarter).
const CONSISTENCY_WINDOW: usize = 63;

/// Cap for unbounded ratio metrics when the denominator collapses.
const RATIO_CAP: f64 = 100.0;

const EULER_GAMMA: f64 = 0.5772156649015329;

/// Flat record of strategy-level performance statistics.
///
/// All annualized figures assume daily observations (252 per year).
/// `max_drawdown` is a positive fraction (0.25 means a 25% peak-to-trough
/// loss). `alpha` and `information_ratio` are `None` when no benchmark of
/// matching length was supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub n_returns: usize,
    /// Compounded return over the whole series.
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe: f64,
    /// Sharpe with downside deviation in the denominator.
    pub sortino: f64,
    /// Annualized return over max drawdown.
    pub calmar: f64,
    pub max_drawdown: f64,
    /// Longest consecutive stretch of days spent below a prior equity peak.
    pub max_underwater_days: usize,
    /// Root-mean-square drawdown over the series.
    pub ulcer_index: f64,
    /// 5th percentile of daily returns (signed).
    pub var_95: f64,
    /// Mean of the worst 5% of daily returns (signed).
    pub cvar_95: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    /// |p95| / |p5| of daily returns, capped at 100.
    pub tail_ratio: f64,
    /// R² of log equity against a linear time trend.
    pub stability: f64,
    /// Fraction of rolling 63-day windows with a positive compounded return.
    pub consistency: f64,
    /// Gain-to-pain ratio at a zero threshold, capped at 100.
    pub omega: f64,
    /// Probability the true Sharpe exceeds the expected maximum Sharpe of
    /// `n_trials` unskilled sibling trials.
    pub deflated_sharpe: f64,
    /// Annualized mean active return vs the benchmark.
    pub alpha: Option<f64>,
    /// Annualized active return over tracking error.
    pub information_ratio: Option<f64>,
}

impl StrategyMetrics {
    /// Compute the full record from daily returns.
    ///
    /// `benchmark` must be date-aligned with `returns`; a length mismatch
    /// yields `None` for the relative fields rather than an error.
    /// `n_trials` is the number of strategy variants evaluated against the
    /// same data before this one was selected; it only affects
    /// `deflated_sharpe`.
    pub fn compute(returns: &[f64], benchmark: Option<&[f64]>, n_trials: usize) -> Self {
        let n = returns.len();
        if n == 0 {
            return Self::empty();
        }

        let mean_daily = stats::mean(returns);
        let sd_daily = stats::std_dev(returns);
        let annual_factor = TRADING_DAYS_PER_YEAR.sqrt();

        let total_return = returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
        let annualized_return = mean_daily * TRADING_DAYS_PER_YEAR;
        let annualized_volatility = sd_daily * annual_factor;

        let sharpe = if sd_daily < 1e-15 {
            0.0
        } else {
            mean_daily / sd_daily * annual_factor
        };

        let downside = downside_deviation(returns);
        let sortino = if downside < 1e-15 {
            0.0
        } else {
            mean_daily / downside * annual_factor
        };

        let equity = equity_from_returns(returns);
        let drawdowns = drawdown_series(&equity);
        let max_drawdown = drawdowns.iter().copied().fold(0.0, f64::max);
        let max_underwater_days = longest_underwater_stretch(&drawdowns);
        let ulcer_index = ulcer(&drawdowns);

        let calmar = if max_drawdown < 1e-15 {
            0.0
        } else {
            annualized_return / max_drawdown
        };

        let mut sorted = returns.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let var_95 = stats::percentile_sorted(&sorted, 5.0);
        let cvar_95 = conditional_var(&sorted);
        let tail_ratio = tail_ratio(&sorted);

        let skewness = stats::skewness(returns);
        let excess_kurtosis = stats::excess_kurtosis(returns);

        let sr_daily = if sd_daily < 1e-15 { 0.0 } else { mean_daily / sd_daily };
        let deflated_sharpe =
            deflated_sharpe_ratio(sr_daily, skewness, excess_kurtosis, n, n_trials);

        let (alpha, information_ratio) = match benchmark {
            Some(bench) if bench.len() == n && n >= 2 => {
                let active: Vec<f64> = returns.iter().zip(bench).map(|(r, b)| r - b).collect();
                let mean_active = stats::mean(&active);
                let sd_active = stats::std_dev(&active);
                let ir = if sd_active < 1e-15 {
                    0.0
                } else {
                    mean_active / sd_active * annual_factor
                };
                (Some(mean_active * TRADING_DAYS_PER_YEAR), Some(ir))
            }
            _ => (None, None),
        };

        Self {
            n_returns: n,
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe,
            sortino,
            calmar,
            max_drawdown,
            max_underwater_days,
            ulcer_index,
            var_95,
            cvar_95,
            skewness,
            excess_kurtosis,
            tail_ratio,
            stability: stability(&equity),
            consistency: rolling_consistency(returns),
            omega: omega(returns),
            deflated_sharpe,
            alpha,
            information_ratio,
        }
    }

    fn empty() -> Self {
        Self {
            n_returns: 0,
            total_return: 0.0,
            annualized_return: 0.0,
            annualized_volatility: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
            calmar: 0.0,
            max_drawdown: 0.0,
            max_underwater_days: 0,
            ulcer_index: 0.0,
            var_95: 0.0,
            cvar_95: 0.0,
            skewness: 0.0,
            excess_kurtosis: 0.0,
            tail_ratio: 0.0,
            stability: 0.0,
            consistency: 0.0,
            omega: 0.0,
            deflated_sharpe: 0.0,
            alpha: None,
            information_ratio: None,
        }
    }
}

// ─── Series helpers ──────────────────────────────────────────────────

/// Compound a return series into an equity path starting at 1.0. The output
/// has one more point than the input.
pub fn equity_from_returns(returns: &[f64]) -> Vec<f64> {
    let mut equity = Vec::with_capacity(returns.len() + 1);
    let mut level = 1.0;
    equity.push(level);
    for r in returns {
        level *= 1.0 + r;
        equity.push(level);
    }
    equity
}

/// Fractional drawdown below the running peak, one entry per equity point.
/// Non-positive peaks contribute 0.0.
pub fn drawdown_series(equity: &[f64]) -> Vec<f64> {
    let mut peak = f64::MIN;
    equity
        .iter()
        .map(|&e| {
            if e > peak {
                peak = e;
            }
            if peak > 0.0 {
                (peak - e) / peak
            } else {
                0.0
            }
        })
        .collect()
}

fn downside_deviation(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = returns.iter().map(|&r| r.min(0.0).powi(2)).sum();
    (sum_sq / returns.len() as f64).sqrt()
}

fn longest_underwater_stretch(drawdowns: &[f64]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for &dd in drawdowns {
        if dd > 1e-15 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn ulcer(drawdowns: &[f64]) -> f64 {
    // Skip the leading point so the average is taken over return days.
    if drawdowns.len() < 2 {
        return 0.0;
    }
    let days = &drawdowns[1..];
    let sum_sq: f64 = days.iter().map(|d| d * d).sum();
    (sum_sq / days.len() as f64).sqrt()
}

/// Mean of the worst 5% of a sorted return series (at least one element).
fn conditional_var(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let k = ((sorted.len() as f64 * 0.05).ceil() as usize).max(1);
    stats::mean(&sorted[..k])
}

fn tail_ratio(sorted: &[f64]) -> f64 {
    let p95 = stats::percentile_sorted(sorted, 95.0);
    let p5 = stats::percentile_sorted(sorted, 5.0);
    if p5.abs() < 1e-15 {
        if p95.abs() > 1e-15 {
            return RATIO_CAP;
        }
        return 0.0;
    }
    (p95.abs() / p5.abs()).min(RATIO_CAP)
}

/// R² of log equity against a linear time trend. Any non-positive equity
/// point, or fewer than three returns, yields 0.0.
fn stability(equity: &[f64]) -> f64 {
    if equity.len() < 4 {
        return 0.0;
    }
    if equity.iter().any(|&e| e <= 0.0) {
        return 0.0;
    }
    let log_eq: Vec<f64> = equity.iter().map(|e| e.ln()).collect();
    let t: Vec<f64> = (0..equity.len()).map(|i| i as f64).collect();
    match stats::pearson(&t, &log_eq) {
        Some(r) => r * r,
        None => 0.0,
    }
}

fn rolling_consistency(returns: &[f64]) -> f64 {
    if returns.len() < CONSISTENCY_WINDOW {
        return 0.0;
    }
    let total = returns.len() - CONSISTENCY_WINDOW + 1;
    let positive = returns
        .windows(CONSISTENCY_WINDOW)
        .filter(|w| w.iter().fold(1.0, |acc, r| acc * (1.0 + r)) > 1.0)
        .count();
    positive as f64 / total as f64
}

fn omega(returns: &[f64]) -> f64 {
    let gains: f64 = returns.iter().map(|&r| r.max(0.0)).sum();
    let losses: f64 = returns.iter().map(|&r| (-r).max(0.0)).sum();
    if losses < 1e-10 {
        if gains > 0.0 {
            return RATIO_CAP;
        }
        return 0.0;
    }
    (gains / losses).min(RATIO_CAP)
}

// ─── Deflated Sharpe ─────────────────────────────────────────────────

/// Probability that the true Sharpe exceeds the expected maximum Sharpe of
/// `n_trials` zero-skill trials, using the Mertens standard error of the
/// Sharpe estimator (adjusts for skew and kurtosis).
///
/// `sr` is the per-period (daily) Sharpe ratio, not annualized.
fn deflated_sharpe_ratio(
    sr: f64,
    skew: f64,
    excess_kurtosis: f64,
    n: usize,
    n_trials: usize,
) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;

    let sr0 = if n_trials > 1 {
        let trials = n_trials as f64;
        let spread = (1.0 / (n_f - 1.0)).sqrt();
        spread
            * ((1.0 - EULER_GAMMA) * stats::normal_inverse_cdf(1.0 - 1.0 / trials)
                + EULER_GAMMA
                    * stats::normal_inverse_cdf(1.0 - 1.0 / (trials * std::f64::consts::E)))
    } else {
        0.0
    };

    let kurtosis = excess_kurtosis + 3.0;
    let var_sr = (1.0 - skew * sr + (kurtosis - 1.0) / 4.0 * sr * sr) / (n_f - 1.0);
    if !var_sr.is_finite() || var_sr <= 0.0 {
        return 0.0;
    }
    stats::normal_cdf((sr - sr0) / var_sr.sqrt())
}
