//! AlphaLab Validate — statistical judgment for backtest runs.
//!
//! This crate contains the validation half of the workspace:
//! - Performance metrics with a deflated Sharpe that charges for search
//! - Trade-level reporting on top of an engine run
//! - Purged K-fold cross-validation with embargo for signal models
//! - Rolling walk-forward evaluation and Sharpe-decay classification
//! - Monte-Carlo bootstrap, sign-flip reality check, and ruin probability
//! - Historical stress windows, slippage, and parameter stability
//! - One-sided t-tests under Benjamini-Hochberg multiple-testing control
//!
//! Every randomized procedure derives per-iteration RNGs from one master
//! seed, so results are reproducible and identical whether work runs on
//! one thread or across a rayon pool.

pub mod metrics;
pub mod monte_carlo;
pub mod multiple_testing;
pub mod purged_cv;
pub mod report;
pub mod stats;
pub mod stress;
pub mod trainer;
pub mod walk_forward;

pub use metrics::{StrategyMetrics, TRADING_DAYS_PER_YEAR};
pub use monte_carlo::{
    block_bootstrap, iid_bootstrap, probability_of_ruin, reality_check, BootstrapSummary,
    Distribution, McConfig, McError, RealityCheckResult, ResampleMethod, RuinResult,
    MIN_OBSERVATIONS,
};
pub use multiple_testing::{
    benjamini_hochberg, one_sided_t_test, TTestResult, TestFamily, VariantTest,
};
pub use purged_cv::{
    purged_folds, run_purged_cv, CvError, CvFold, FoldIc, FoldSkip, PurgedCvConfig,
    PurgedCvResult, SkippedFold,
};
pub use report::{summarize, BacktestResult, ExitCounts, TradeSummary};
pub use stress::{
    default_windows, parameter_stability, run_historical_windows, slippage_sensitivity,
    three_windows_test, ParameterStability, Regime, SlippageLevel, SlippageSensitivity,
    StressError, StressWindow, ThreeWindowsResult, WindowResult, WindowSharpe, MIN_WINDOW_DAYS,
};
pub use trainer::{FoldReturns, SignalModel, WalkForwardStrategy};
pub use walk_forward::{
    run_walk_forward, sharpe_decay, walk_forward_folds, SharpeDecayFlag, WalkForwardConfig,
    WalkForwardError, WalkForwardReport, WfFold, WfFoldResult,
};
