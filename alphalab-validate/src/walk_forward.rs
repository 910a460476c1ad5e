//! Rolling walk-forward evaluation.
//!
//! The price history is cut into overlapping folds: a training window
//! followed immediately by a held-out test window, stepped forward by a
//! fixed stride. The strategy refits on each training window and trades
//! the test window unseen. Comparing in-sample and out-of-sample Sharpe
//! across folds measures how much of the backtest edge survives contact
//! with data the fit never touched.

use alphalab_core::PriceTable;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::StrategyMetrics;
use crate::multiple_testing::{one_sided_t_test, TTestResult};
use crate::stats;
use crate::trainer::WalkForwardStrategy;

/// Below this in-sample Sharpe the decay ratio turns unstable, so the
/// difference is reported instead.
pub const LOW_IS_SHARPE_THRESHOLD: f64 = 0.1;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Training window length in trading days (default three years).
    pub train_days: usize,
    /// Test window length in trading days (default six months).
    pub test_days: usize,
    /// Stride between fold starts (default one quarter).
    pub step_days: usize,
    pub parallel: bool,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_days: 756,
            test_days: 126,
            step_days: 63,
            parallel: true,
        }
    }
}

impl WalkForwardConfig {
    pub fn validate(&self) -> Result<(), WalkForwardError> {
        if self.train_days == 0 || self.test_days == 0 || self.step_days == 0 {
            return Err(WalkForwardError::InvalidConfig {
                reason: "train_days, test_days, and step_days must all be positive".into(),
            });
        }
        Ok(())
    }
}

// ─── Fold schedule ───────────────────────────────────────────────────

/// One fold: train on `[train_start, train_end)`, trade `[test_start,
/// test_end)`. The test window begins where the training window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WfFold {
    pub fold_index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

/// Lay out folds over `total_days`, stepping by `step_days` while a full
/// train-plus-test window still fits.
pub fn walk_forward_folds(
    total_days: usize,
    config: &WalkForwardConfig,
) -> Result<Vec<WfFold>, WalkForwardError> {
    config.validate()?;
    let window = config.train_days + config.test_days;
    let mut folds = Vec::new();
    let mut start = 0;
    while start + window <= total_days {
        let train_end = start + config.train_days;
        folds.push(WfFold {
            fold_index: folds.len(),
            train_start: start,
            train_end,
            test_start: train_end,
            test_end: train_end + config.test_days,
        });
        start += config.step_days;
    }

    if folds.is_empty() {
        return Err(WalkForwardError::InsufficientData {
            total_days,
            required: window,
        });
    }
    Ok(folds)
}

// ─── Sharpe decay ────────────────────────────────────────────────────

/// How trustworthy the decay number is, given the in-sample Sharpe that
/// sits in its denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharpeDecayFlag {
    /// Decay is the ratio 1 - OOS/IS.
    Normal,
    /// In-sample Sharpe too small for a stable ratio; decay is IS - OOS.
    LowInSample,
    /// Negative in-sample Sharpe makes decay meaningless.
    NegativeInSample,
}

/// Out-of-sample decay relative to in-sample performance. 0 means the
/// edge fully survived, 1 means it vanished, negative means the strategy
/// improved out of sample.
pub fn sharpe_decay(is_sharpe: f64, oos_sharpe: f64) -> (Option<f64>, SharpeDecayFlag) {
    if is_sharpe < 0.0 {
        (None, SharpeDecayFlag::NegativeInSample)
    } else if is_sharpe < LOW_IS_SHARPE_THRESHOLD {
        (Some(is_sharpe - oos_sharpe), SharpeDecayFlag::LowInSample)
    } else {
        (Some(1.0 - oos_sharpe / is_sharpe), SharpeDecayFlag::Normal)
    }
}

// ─── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WfFoldResult {
    pub fold: WfFold,
    pub in_sample: StrategyMetrics,
    pub out_of_sample: StrategyMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub folds: Vec<WfFoldResult>,
    pub mean_is_sharpe: f64,
    pub mean_oos_sharpe: f64,
    pub sharpe_decay: Option<f64>,
    pub decay_flag: SharpeDecayFlag,
    /// Fraction of folds with positive out-of-sample Sharpe.
    pub consistency: f64,
    /// Test-window returns concatenated in fold order.
    pub pooled_oos_returns: Vec<f64>,
    pub pooled_oos: StrategyMetrics,
    /// One-sided t-test on fold-level OOS Sharpe values (needs two folds).
    pub t_test: Option<TTestResult>,
}

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("invalid walk-forward config: {reason}")]
    InvalidConfig { reason: String },
    #[error("insufficient history: {total_days} days cannot fit one {required}-day fold")]
    InsufficientData { total_days: usize, required: usize },
    #[error("strategy failed on fold {fold}: {source}")]
    StrategyFailed {
        fold: usize,
        #[source]
        source: anyhow::Error,
    },
}

// ─── Driver ──────────────────────────────────────────────────────────

/// Refit and trade every fold, then aggregate decay, consistency, and
/// pooled out-of-sample metrics.
pub fn run_walk_forward<S>(
    strategy: &S,
    prices: &PriceTable,
    config: &WalkForwardConfig,
) -> Result<WalkForwardReport, WalkForwardError>
where
    S: WalkForwardStrategy + ?Sized,
{
    let folds = walk_forward_folds(prices.len(), config)?;
    let evaluate = |fold: &WfFold| -> Result<(WfFoldResult, Vec<f64>), WalkForwardError> {
        let train = prices.slice(fold.train_start, fold.train_end);
        let test = prices.slice(fold.test_start, fold.test_end);
        let returns = strategy
            .fit_and_trade(&train, &test)
            .map_err(|source| WalkForwardError::StrategyFailed {
                fold: fold.fold_index,
                source,
            })?;
        let result = WfFoldResult {
            fold: *fold,
            in_sample: StrategyMetrics::compute(&returns.in_sample, None, 1),
            out_of_sample: StrategyMetrics::compute(&returns.out_of_sample, None, 1),
        };
        Ok((result, returns.out_of_sample))
    };

    let evaluated: Vec<(WfFoldResult, Vec<f64>)> = if config.parallel {
        folds.par_iter().map(evaluate).collect::<Result<_, _>>()?
    } else {
        folds.iter().map(evaluate).collect::<Result<_, _>>()?
    };

    let mut fold_results = Vec::with_capacity(evaluated.len());
    let mut pooled_oos_returns = Vec::new();
    for (result, oos_returns) in evaluated {
        fold_results.push(result);
        pooled_oos_returns.extend(oos_returns);
    }

    let is_sharpes: Vec<f64> = fold_results.iter().map(|f| f.in_sample.sharpe).collect();
    let oos_sharpes: Vec<f64> = fold_results.iter().map(|f| f.out_of_sample.sharpe).collect();
    let mean_is_sharpe = stats::mean(&is_sharpes);
    let mean_oos_sharpe = stats::mean(&oos_sharpes);
    let (decay, decay_flag) = sharpe_decay(mean_is_sharpe, mean_oos_sharpe);
    let consistency =
        oos_sharpes.iter().filter(|s| **s > 0.0).count() as f64 / oos_sharpes.len() as f64;
    let pooled_oos = StrategyMetrics::compute(&pooled_oos_returns, None, 1);
    let t_test = one_sided_t_test(&oos_sharpes);

    Ok(WalkForwardReport {
        folds: fold_results,
        mean_is_sharpe,
        mean_oos_sharpe,
        sharpe_decay: decay,
        decay_flag,
        consistency,
        pooled_oos_returns,
        pooled_oos,
        t_test,
    })
}
