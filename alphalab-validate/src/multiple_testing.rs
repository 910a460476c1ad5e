//! Multiple-testing control for families of strategy variants.
//!
//! Every variant tried against the same data costs a multiple-comparison
//! penalty whether or not it shipped. The one-sided t-test here scores a
//! sample of fold-level Sharpe values; Benjamini-Hochberg then adjusts
//! p-values across the whole family of variants. Treat the raw p-values
//! as ranking scores for the BH procedure rather than literal
//! false-positive probabilities: fold Sharpes are neither independent nor
//! normal.

use serde::{Deserialize, Serialize};

use crate::stats::t_cdf;

// ─── One-sided t-test ────────────────────────────────────────────────

/// Result of a one-sided t-test (H0: mean = 0, H1: mean > 0).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TTestResult {
    /// mean / (std / sqrt(n))
    pub t_statistic: f64,
    /// P(T > t) under H0.
    pub p_value: f64,
    /// n - 1
    pub df: f64,
}

/// One-sided t-test against a zero mean. Returns `None` for fewer than
/// two samples. Zero-variance samples take the degenerate conventions:
/// positive mean gives p = 0, otherwise p = 0.5.
pub fn one_sided_t_test(samples: &[f64]) -> Option<TTestResult> {
    let n = samples.len();
    if n < 2 {
        return None;
    }

    let n_f = n as f64;
    let mean = samples.iter().sum::<f64>() / n_f;
    let variance = samples.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n_f - 1.0);
    let std_err = (variance / n_f).sqrt();
    let df = n_f - 1.0;

    if std_err < 1e-15 {
        return if mean > 0.0 {
            Some(TTestResult {
                t_statistic: f64::INFINITY,
                p_value: 0.0,
                df,
            })
        } else {
            Some(TTestResult {
                t_statistic: 0.0,
                p_value: 0.5,
                df,
            })
        };
    }

    let t_statistic = mean / std_err;
    let p_value = 1.0 - t_cdf(t_statistic, df);
    Some(TTestResult {
        t_statistic,
        p_value,
        df,
    })
}

// ─── Benjamini-Hochberg correction ───────────────────────────────────

/// One variant after BH adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantTest {
    pub variant_id: String,
    pub raw_p: f64,
    /// BH-adjusted p-value, clamped to [0, 1].
    pub adjusted_p: f64,
    /// adjusted_p <= alpha.
    pub significant: bool,
}

/// Benjamini-Hochberg step-up correction over `m` hypotheses.
///
/// Adjusted p-values follow `adj_(k) = min(p_(k) * m/k, adj_(k+1))`
/// working down from the largest p-value. Results come back in the same
/// order the tests were supplied.
pub fn benjamini_hochberg(tests: &[(String, f64)], alpha: f64) -> Vec<VariantTest> {
    if tests.is_empty() {
        return Vec::new();
    }

    let m = tests.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| {
        tests[a]
            .1
            .partial_cmp(&tests[b].1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Step-up pass from the largest p-value down, carrying the running
    // minimum so adjusted values stay monotone in rank.
    let mut adjusted = vec![0.0; m];
    let mut running_min = 1.0_f64;
    for rank in (1..=m).rev() {
        let idx = order[rank - 1];
        let corrected = (tests[idx].1 * m as f64 / rank as f64).min(1.0);
        running_min = running_min.min(corrected);
        adjusted[idx] = running_min;
    }

    tests
        .iter()
        .zip(adjusted)
        .map(|((variant_id, raw_p), adjusted_p)| VariantTest {
            variant_id: variant_id.clone(),
            raw_p: *raw_p,
            adjusted_p,
            significant: adjusted_p <= alpha,
        })
        .collect()
}

// ─── Test family tracker ─────────────────────────────────────────────

/// Accumulates p-values for every variant evaluated against one dataset.
///
/// A family is the full set of variants tried on the same universe and
/// date range. Evaluating against a different universe or period starts
/// a new family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestFamily {
    tests: Vec<(String, f64)>,
}

impl TestFamily {
    pub fn new() -> Self {
        Self { tests: Vec::new() }
    }

    pub fn add(&mut self, variant_id: impl Into<String>, p_value: f64) {
        self.tests.push((variant_id.into(), p_value));
    }

    pub fn apply_correction(&self, alpha: f64) -> Vec<VariantTest> {
        benjamini_hochberg(&self.tests, alpha)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
