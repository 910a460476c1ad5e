//! Monte-Carlo resampling of daily return series.
//!
//! Every routine here is deterministic for a given master seed: each
//! iteration derives its own RNG from blake3(seed, label, iteration), so
//! results are identical whether iterations run serially or across a
//! rayon pool.
//!
//! The bootstrap measures how wide the plausible outcome distribution
//! is around the observed backtest. The reality check asks whether the
//! edge over a benchmark survives random sign assignment, and the ruin
//! simulation counts paths that breach the drawdown level an investor
//! would not sit through.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{self, TRADING_DAYS_PER_YEAR};
use crate::stats;

/// Resampling below this many observations says more about the sample
/// than the strategy.
pub const MIN_OBSERVATIONS: usize = 120;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McConfig {
    pub n_iterations: usize,
    /// Block length for the block bootstrap (default one month).
    pub block_len: usize,
    pub seed: u64,
    /// Simulation horizon for ruin paths (default one year).
    pub horizon_days: usize,
    /// Drawdown depth that counts as ruin, as a negative fraction.
    pub ruin_threshold: f64,
    /// Bonferroni divisor for the reality check.
    pub n_strategies_tested: usize,
    pub parallel: bool,
}

impl Default for McConfig {
    fn default() -> Self {
        Self {
            n_iterations: 1000,
            block_len: 21,
            seed: 42,
            horizon_days: 252,
            ruin_threshold: -0.30,
            n_strategies_tested: 1,
            parallel: true,
        }
    }
}

impl McConfig {
    pub fn validate(&self) -> Result<(), McError> {
        if self.n_iterations == 0 {
            return Err(McError::InvalidConfig {
                reason: "n_iterations must be positive".into(),
            });
        }
        if self.block_len == 0 || self.horizon_days == 0 {
            return Err(McError::InvalidConfig {
                reason: "block_len and horizon_days must be positive".into(),
            });
        }
        if self.ruin_threshold >= 0.0 {
            return Err(McError::InvalidConfig {
                reason: format!(
                    "ruin_threshold must be negative, got {}",
                    self.ruin_threshold
                ),
            });
        }
        if self.n_strategies_tested == 0 {
            return Err(McError::InvalidConfig {
                reason: "n_strategies_tested must be positive".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum McError {
    #[error("invalid Monte-Carlo config: {reason}")]
    InvalidConfig { reason: String },
    #[error("insufficient observations: {n_returns} returns, need at least {min}")]
    InsufficientData { n_returns: usize, min: usize },
    #[error("series length mismatch: {n_strategy} strategy returns vs {n_benchmark} benchmark")]
    LengthMismatch {
        n_strategy: usize,
        n_benchmark: usize,
    },
}

// ─── Seeded sub-streams ──────────────────────────────────────────────

/// Derive an iteration-local seed from the master seed. Labels keep the
/// bootstrap, reality-check, and ruin streams independent of each other
/// and of iteration order.
fn sub_seed(master_seed: u64, label: &str, iteration: u64) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&master_seed.to_le_bytes());
    hasher.update(label.as_bytes());
    hasher.update(&iteration.to_le_bytes());
    let hash = hasher.finalize();
    u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap())
}

fn with_iterations<T, F>(n_iterations: usize, parallel: bool, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(u64) -> T + Sync + Send,
{
    if parallel {
        (0..n_iterations as u64).into_par_iter().map(body).collect()
    } else {
        (0..n_iterations as u64).map(body).collect()
    }
}

// ─── Bootstrap ───────────────────────────────────────────────────────

/// Summary of one statistic across bootstrap iterations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Distribution {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub p5: f64,
    pub p95: f64,
}

impl Distribution {
    fn from_samples(samples: &[f64]) -> Self {
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            mean: stats::mean(samples),
            median: stats::percentile_sorted(&sorted, 50.0),
            std: stats::std_dev(samples),
            p5: stats::percentile_sorted(&sorted, 5.0),
            p95: stats::percentile_sorted(&sorted, 95.0),
        }
    }
}

/// How paths were resampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleMethod {
    Iid,
    Block { block_len: usize },
    /// Block bootstrap requested but the sample was too short for
    /// meaningful blocks, so IID resampling ran instead.
    IidFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub method: ResampleMethod,
    pub n_iterations: usize,
    pub sample_size: usize,
    pub sharpe: Distribution,
    pub total_return: Distribution,
    pub max_drawdown: Distribution,
    pub annualized_return: Distribution,
    /// Fraction of resampled paths that finished below their start.
    pub p_net_loss: f64,
}

struct PathStats {
    sharpe: f64,
    total_return: f64,
    max_drawdown: f64,
    annualized_return: f64,
}

fn path_stats(path: &[f64]) -> PathStats {
    let mean = stats::mean(path);
    let std = stats::std_dev(path);
    let sharpe = if std < 1e-15 {
        0.0
    } else {
        mean / std * TRADING_DAYS_PER_YEAR.sqrt()
    };
    let total_return = path.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
    let equity = metrics::equity_from_returns(path);
    let max_drawdown = metrics::drawdown_series(&equity)
        .into_iter()
        .fold(0.0_f64, f64::max);
    PathStats {
        sharpe,
        total_return,
        max_drawdown,
        annualized_return: mean * TRADING_DAYS_PER_YEAR,
    }
}

fn summarize_paths(
    method: ResampleMethod,
    sample_size: usize,
    paths: Vec<PathStats>,
) -> BootstrapSummary {
    let sharpes: Vec<f64> = paths.iter().map(|p| p.sharpe).collect();
    let totals: Vec<f64> = paths.iter().map(|p| p.total_return).collect();
    let drawdowns: Vec<f64> = paths.iter().map(|p| p.max_drawdown).collect();
    let annualized: Vec<f64> = paths.iter().map(|p| p.annualized_return).collect();
    let n_losses = totals.iter().filter(|t| **t < 0.0).count();

    BootstrapSummary {
        method,
        n_iterations: paths.len(),
        sample_size,
        sharpe: Distribution::from_samples(&sharpes),
        total_return: Distribution::from_samples(&totals),
        max_drawdown: Distribution::from_samples(&drawdowns),
        annualized_return: Distribution::from_samples(&annualized),
        p_net_loss: n_losses as f64 / paths.len() as f64,
    }
}

fn check_sample(returns: &[f64], config: &McConfig) -> Result<(), McError> {
    config.validate()?;
    if returns.len() < MIN_OBSERVATIONS {
        return Err(McError::InsufficientData {
            n_returns: returns.len(),
            min: MIN_OBSERVATIONS,
        });
    }
    Ok(())
}

fn iid_paths(returns: &[f64], config: &McConfig, label: &str) -> Vec<PathStats> {
    let n = returns.len();
    with_iterations(config.n_iterations, config.parallel, |iteration| {
        let mut rng = StdRng::seed_from_u64(sub_seed(config.seed, label, iteration));
        let path: Vec<f64> = (0..n).map(|_| returns[rng.gen_range(0..n)]).collect();
        path_stats(&path)
    })
}

/// Bootstrap with independent draws. Destroys autocorrelation, which
/// makes it the optimistic baseline next to the block bootstrap.
pub fn iid_bootstrap(returns: &[f64], config: &McConfig) -> Result<BootstrapSummary, McError> {
    check_sample(returns, config)?;
    let paths = iid_paths(returns, config, "iid");
    Ok(summarize_paths(ResampleMethod::Iid, returns.len(), paths))
}

/// Moving-block bootstrap: resample whole blocks so short-range
/// autocorrelation survives. Falls back to IID draws when the sample
/// holds fewer than two blocks.
pub fn block_bootstrap(returns: &[f64], config: &McConfig) -> Result<BootstrapSummary, McError> {
    check_sample(returns, config)?;
    let n = returns.len();
    if n < 2 * config.block_len {
        let paths = iid_paths(returns, config, "iid-fallback");
        return Ok(summarize_paths(ResampleMethod::IidFallback, n, paths));
    }

    let block_len = config.block_len;
    let paths = with_iterations(config.n_iterations, config.parallel, |iteration| {
        let mut rng = StdRng::seed_from_u64(sub_seed(config.seed, "block", iteration));
        let mut path = Vec::with_capacity(n + block_len);
        while path.len() < n {
            let start = rng.gen_range(0..=n - block_len);
            path.extend_from_slice(&returns[start..start + block_len]);
        }
        path.truncate(n);
        path_stats(&path)
    });
    Ok(summarize_paths(
        ResampleMethod::Block { block_len },
        n,
        paths,
    ))
}

// ─── Reality check ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RealityCheckResult {
    /// Mean daily excess return of the strategy over the benchmark.
    pub observed_mean_excess: f64,
    /// Fraction of sign-randomized excess series at least as good as the
    /// observed one, with the add-one adjustment.
    pub p_value: f64,
    pub p_value_bonferroni: f64,
    pub n_iterations: usize,
}

/// Sign-randomization test of the excess-return series. Under the null
/// the daily excess has no direction, so flipping signs at random should
/// produce means as large as the observed one reasonably often.
pub fn reality_check(
    strategy: &[f64],
    benchmark: &[f64],
    config: &McConfig,
) -> Result<RealityCheckResult, McError> {
    if strategy.len() != benchmark.len() {
        return Err(McError::LengthMismatch {
            n_strategy: strategy.len(),
            n_benchmark: benchmark.len(),
        });
    }
    check_sample(strategy, config)?;

    let active: Vec<f64> = strategy
        .iter()
        .zip(benchmark)
        .map(|(s, b)| s - b)
        .collect();
    let observed = stats::mean(&active);

    let hits = with_iterations(config.n_iterations, config.parallel, |iteration| {
        let mut rng = StdRng::seed_from_u64(sub_seed(config.seed, "reality-check", iteration));
        let flipped_sum: f64 = active
            .iter()
            .map(|a| if rng.gen::<bool>() { *a } else { -a })
            .sum();
        let flipped_mean = flipped_sum / active.len() as f64;
        u64::from(flipped_mean >= observed)
    });
    let count = hits.iter().sum::<u64>() as f64;

    let p_value = (count + 1.0) / (config.n_iterations as f64 + 1.0);
    let p_value_bonferroni = (p_value * config.n_strategies_tested as f64).min(1.0);
    Ok(RealityCheckResult {
        observed_mean_excess: observed,
        p_value,
        p_value_bonferroni,
        n_iterations: config.n_iterations,
    })
}

// ─── Probability of ruin ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuinResult {
    /// Fraction of simulated paths that breached the ruin threshold.
    pub probability: f64,
    pub horizon_days: usize,
    pub ruin_threshold: f64,
    pub n_iterations: usize,
}

/// Simulate `horizon_days` of IID-resampled returns per path and count
/// how many breach `ruin_threshold` drawdown from their running peak.
pub fn probability_of_ruin(returns: &[f64], config: &McConfig) -> Result<RuinResult, McError> {
    check_sample(returns, config)?;
    let n = returns.len();

    let ruined = with_iterations(config.n_iterations, config.parallel, |iteration| {
        let mut rng = StdRng::seed_from_u64(sub_seed(config.seed, "ruin", iteration));
        let mut equity = 1.0_f64;
        let mut peak = 1.0_f64;
        for _ in 0..config.horizon_days {
            equity *= 1.0 + returns[rng.gen_range(0..n)];
            peak = peak.max(equity);
            if equity / peak - 1.0 <= config.ruin_threshold {
                return 1u64;
            }
        }
        0u64
    });
    let count = ruined.iter().sum::<u64>() as f64;

    Ok(RuinResult {
        probability: count / config.n_iterations as f64,
        horizon_days: config.horizon_days,
        ruin_threshold: config.ruin_threshold,
        n_iterations: config.n_iterations,
    })
}
