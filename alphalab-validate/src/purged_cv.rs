//! Purged K-fold cross-validation for overlapping time-series labels.
//!
//! Standard K-fold leaks when labels span several days: samples adjacent
//! to the test window share label horizons with it. Purging removes
//! training samples just before the test window; the embargo removes
//! samples just after it. The driver scores each fold by information
//! coefficient (Pearson) and rank IC (Spearman) between model predictions
//! and realized labels.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats;
use crate::trainer::SignalModel;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgedCvConfig {
    /// Number of contiguous test windows (default 5).
    pub n_folds: usize,
    /// Training samples dropped immediately before each test window.
    pub purge_days: usize,
    /// Training samples dropped immediately after each test window.
    pub embargo_days: usize,
    /// Folds with fewer training samples are skipped, not errored.
    pub min_train_size: usize,
    /// Folds with fewer test samples are skipped, not errored.
    pub min_test_size: usize,
    pub parallel: bool,
}

impl Default for PurgedCvConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            purge_days: 5,
            embargo_days: 5,
            min_train_size: 126,
            min_test_size: 21,
            parallel: true,
        }
    }
}

impl PurgedCvConfig {
    pub fn validate(&self) -> Result<(), CvError> {
        if self.n_folds < 2 {
            return Err(CvError::InvalidConfig {
                reason: format!("n_folds must be at least 2, got {}", self.n_folds),
            });
        }
        if self.min_train_size < 2 || self.min_test_size < 2 {
            return Err(CvError::InvalidConfig {
                reason: "min_train_size and min_test_size must be at least 2".into(),
            });
        }
        Ok(())
    }
}

// ─── Fold construction ───────────────────────────────────────────────

/// One fold: a contiguous test window and the surviving training indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvFold {
    pub fold_index: usize,
    /// Test window start (inclusive).
    pub test_start: usize,
    /// Test window end (exclusive).
    pub test_end: usize,
    /// Sample indices outside the purged and embargoed exclusion zone.
    pub train_indices: Vec<usize>,
}

/// Split `n_samples` into `n_folds` contiguous test windows; the last
/// window absorbs the remainder. Training indices for each fold exclude
/// `[test_start - purge_days, test_end + embargo_days)`.
pub fn purged_folds(n_samples: usize, config: &PurgedCvConfig) -> Result<Vec<CvFold>, CvError> {
    config.validate()?;
    let base = n_samples / config.n_folds;
    if base == 0 {
        return Err(CvError::InsufficientData {
            n_samples,
            n_folds: config.n_folds,
        });
    }

    let mut folds = Vec::with_capacity(config.n_folds);
    for fold_index in 0..config.n_folds {
        let test_start = fold_index * base;
        let test_end = if fold_index == config.n_folds - 1 {
            n_samples
        } else {
            (fold_index + 1) * base
        };

        let exclude_start = test_start.saturating_sub(config.purge_days);
        let exclude_end = (test_end + config.embargo_days).min(n_samples);
        let train_indices: Vec<usize> = (0..n_samples)
            .filter(|i| *i < exclude_start || *i >= exclude_end)
            .collect();

        folds.push(CvFold {
            fold_index,
            test_start,
            test_end,
            train_indices,
        });
    }
    Ok(folds)
}

// ─── Result types ────────────────────────────────────────────────────

/// Scores for one evaluated fold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldIc {
    pub fold_index: usize,
    pub n_train: usize,
    pub n_test: usize,
    /// Pearson correlation between predictions and labels.
    pub ic: f64,
    /// Spearman rank correlation between predictions and labels.
    pub rank_ic: f64,
}

/// Why a fold produced no score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldSkip {
    TrainTooSmall { n_train: usize, min_train: usize },
    TestTooSmall { n_test: usize, min_test: usize },
    /// Predictions or labels had no variance.
    DegenerateCorrelation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFold {
    pub fold_index: usize,
    pub reason: FoldSkip,
}

/// Aggregate CV outcome. At least one fold is always evaluated; the
/// all-skipped case is reported as `CvError::AllFoldsSkipped` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgedCvResult {
    pub folds: Vec<FoldIc>,
    pub skipped: Vec<SkippedFold>,
    pub mean_ic: f64,
    pub std_ic: f64,
    /// Mean IC over its standard deviation across folds.
    pub ic_ir: f64,
    /// Pearson correlation over all test predictions pooled across folds.
    pub pooled_ic: f64,
    /// Fraction of evaluated folds with positive IC.
    pub positive_ic_fraction: f64,
}

#[derive(Debug, Error)]
pub enum CvError {
    #[error("invalid CV config: {reason}")]
    InvalidConfig { reason: String },
    #[error("insufficient samples: {n_samples} rows cannot fill {n_folds} folds")]
    InsufficientData { n_samples: usize, n_folds: usize },
    #[error("feature/label length mismatch: {n_features} rows vs {n_labels} labels")]
    LengthMismatch { n_features: usize, n_labels: usize },
    #[error("model failed on fold {fold}: {source}")]
    ModelFailed {
        fold: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("model returned {n_predictions} predictions for {n_expected} test rows on fold {fold}")]
    PredictionLengthMismatch {
        fold: usize,
        n_predictions: usize,
        n_expected: usize,
    },
    #[error("all {n_folds} folds were skipped")]
    AllFoldsSkipped {
        n_folds: usize,
        skipped: Vec<SkippedFold>,
    },
}

// ─── Driver ──────────────────────────────────────────────────────────

enum FoldEval {
    Scored {
        ic: FoldIc,
        predictions: Vec<f64>,
        actuals: Vec<f64>,
    },
    Skipped(SkippedFold),
}

/// Run purged K-fold CV: fit the model per fold, score IC and rank IC,
/// and aggregate across folds.
pub fn run_purged_cv<M>(
    model: &M,
    features: &[Vec<f64>],
    labels: &[f64],
    config: &PurgedCvConfig,
) -> Result<PurgedCvResult, CvError>
where
    M: SignalModel + ?Sized,
{
    config.validate()?;
    if features.len() != labels.len() {
        return Err(CvError::LengthMismatch {
            n_features: features.len(),
            n_labels: labels.len(),
        });
    }

    let folds = purged_folds(labels.len(), config)?;
    let evaluate = |fold: &CvFold| evaluate_fold(model, features, labels, fold, config);

    let evals: Vec<FoldEval> = if config.parallel {
        folds.par_iter().map(evaluate).collect::<Result<_, _>>()?
    } else {
        folds.iter().map(evaluate).collect::<Result<_, _>>()?
    };

    let mut fold_ics = Vec::new();
    let mut skipped = Vec::new();
    let mut pooled_predictions = Vec::new();
    let mut pooled_actuals = Vec::new();
    for eval in evals {
        match eval {
            FoldEval::Scored {
                ic,
                predictions,
                actuals,
            } => {
                fold_ics.push(ic);
                pooled_predictions.extend(predictions);
                pooled_actuals.extend(actuals);
            }
            FoldEval::Skipped(skip) => skipped.push(skip),
        }
    }

    if fold_ics.is_empty() {
        return Err(CvError::AllFoldsSkipped {
            n_folds: folds.len(),
            skipped,
        });
    }

    let ics: Vec<f64> = fold_ics.iter().map(|f| f.ic).collect();
    let mean_ic = stats::mean(&ics);
    let std_ic = stats::std_dev(&ics);
    let ic_ir = if std_ic < 1e-15 { 0.0 } else { mean_ic / std_ic };
    let pooled_ic = stats::pearson(&pooled_predictions, &pooled_actuals).unwrap_or(0.0);
    let positive_ic_fraction =
        ics.iter().filter(|ic| **ic > 0.0).count() as f64 / ics.len() as f64;

    Ok(PurgedCvResult {
        folds: fold_ics,
        skipped,
        mean_ic,
        std_ic,
        ic_ir,
        pooled_ic,
        positive_ic_fraction,
    })
}

fn evaluate_fold<M>(
    model: &M,
    features: &[Vec<f64>],
    labels: &[f64],
    fold: &CvFold,
    config: &PurgedCvConfig,
) -> Result<FoldEval, CvError>
where
    M: SignalModel + ?Sized,
{
    let n_train = fold.train_indices.len();
    let n_test = fold.test_end - fold.test_start;

    if n_train < config.min_train_size {
        return Ok(FoldEval::Skipped(SkippedFold {
            fold_index: fold.fold_index,
            reason: FoldSkip::TrainTooSmall {
                n_train,
                min_train: config.min_train_size,
            },
        }));
    }
    if n_test < config.min_test_size {
        return Ok(FoldEval::Skipped(SkippedFold {
            fold_index: fold.fold_index,
            reason: FoldSkip::TestTooSmall {
                n_test,
                min_test: config.min_test_size,
            },
        }));
    }

    let train_x: Vec<Vec<f64>> = fold.train_indices.iter().map(|&i| features[i].clone()).collect();
    let train_y: Vec<f64> = fold.train_indices.iter().map(|&i| labels[i]).collect();
    let test_x: Vec<Vec<f64>> = features[fold.test_start..fold.test_end].to_vec();
    let actuals: Vec<f64> = labels[fold.test_start..fold.test_end].to_vec();

    let predictions = model
        .fit_predict(&train_x, &train_y, &test_x)
        .map_err(|source| CvError::ModelFailed {
            fold: fold.fold_index,
            source,
        })?;
    if predictions.len() != actuals.len() {
        return Err(CvError::PredictionLengthMismatch {
            fold: fold.fold_index,
            n_predictions: predictions.len(),
            n_expected: actuals.len(),
        });
    }

    let ic = stats::pearson(&predictions, &actuals);
    let rank_ic = stats::spearman(&predictions, &actuals);
    match (ic, rank_ic) {
        (Some(ic), Some(rank_ic)) => Ok(FoldEval::Scored {
            ic: FoldIc {
                fold_index: fold.fold_index,
                n_train,
                n_test,
                ic,
                rank_ic,
            },
            predictions,
            actuals,
        }),
        _ => Ok(FoldEval::Skipped(SkippedFold {
            fold_index: fold.fold_index,
            reason: FoldSkip::DegenerateCorrelation,
        })),
    }
}
