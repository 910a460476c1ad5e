//! Shared statistics primitives.
//!
//! Moments, percentiles, correlations, and the special functions the
//! significance tests need (normal CDF and its inverse, log-gamma,
//! regularized incomplete beta, Student-t CDF). Everything is hand-rolled
//! from standard numerical approximations so the crate carries no heavy
//! math dependency.

use std::cmp::Ordering;

// ─── Moments ─────────────────────────────────────────────────────────

/// Arithmetic mean. Empty input returns 0.0.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n − 1 denominator). Fewer than two values
/// returns 0.0.
pub fn std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    variance.sqrt()
}

/// Standardized third moment (population convention, sample std in the
/// denominator). Degenerate spread returns 0.0.
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sd = std_dev(values);
    if sd < 1e-15 {
        return 0.0;
    }
    values.iter().map(|v| ((v - m) / sd).powi(3)).sum::<f64>() / n as f64
}

/// Standardized fourth moment minus 3 (excess kurtosis, population
/// convention). Degenerate spread returns 0.0.
pub fn excess_kurtosis(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sd = std_dev(values);
    if sd < 1e-15 {
        return 0.0;
    }
    values.iter().map(|v| ((v - m) / sd).powi(4)).sum::<f64>() / n as f64 - 3.0
}

// ─── Percentiles ─────────────────────────────────────────────────────

/// Percentile of an ascending-sorted slice using linear interpolation.
/// `p` is in [0, 100] and is clamped. Empty input returns 0.0.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

// ─── Correlation ─────────────────────────────────────────────────────

/// Pearson correlation coefficient. `None` on length mismatch, fewer than
/// two pairs, or zero variance in either series.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n != y.len() || n < 2 {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom < 1e-15 {
        return None;
    }
    Some(cov / denom)
}

/// Spearman rank correlation: Pearson on average ranks. Ties share the
/// average of their positional ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let rx = average_ranks(x);
    let ry = average_ranks(y);
    pearson(&rx, &ry)
}

/// 1-based ranks with tied values assigned the average of their positions.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| {
        values[i]
            .partial_cmp(&values[j])
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let tied_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = tied_rank;
        }
        i = j + 1;
    }
    ranks
}

// ─── Normal distribution ─────────────────────────────────────────────

/// Error function via the Abramowitz & Stegun 7.1.26 rational
/// approximation (absolute error below 1.5e-7).
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Inverse standard normal CDF via Acklam's rational approximation
/// (relative error below 1.2e-9). `p <= 0` returns negative infinity and
/// `p >= 1` positive infinity.
pub fn normal_inverse_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -39.69683028665376,
        220.9460984245205,
        -275.9285104469687,
        138.3577518672690,
        -30.66479806614716,
        2.506628277459239,
    ];
    const B: [f64; 5] = [
        -54.47609879822406,
        161.5858368580409,
        -155.6989798598866,
        66.80131188771972,
        -13.28068155288572,
    ];
    const C: [f64; 6] = [
        -0.007784894002430293,
        -0.3223964580411365,
        -2.400758277161838,
        -2.549732539343734,
        4.374664141464968,
        2.938163982698783,
    ];
    const D: [f64; 4] = [
        0.007784695709041462,
        0.3224671290700398,
        2.445134137142996,
        3.754408661907416,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -((((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0))
    }
}

// ─── Gamma, beta, Student-t ──────────────────────────────────────────

const LANCZOS_COF: [f64; 6] = [
    76.18009172947146,
    -86.50532032941677,
    24.01409824083091,
    -1.231739572450155,
    0.001208650973866179,
    -0.000005395239384953,
];

/// Natural log of the gamma function via the Lanczos approximation
/// (g = 5), valid for `x > 0`. Non-positive input returns infinity.
pub fn ln_gamma(x: f64) -> f64 {
    if x <= 0.0 {
        return f64::INFINITY;
    }
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000000000190015;
    for cof in LANCZOS_COF {
        y += 1.0;
        ser += cof / y;
    }
    -tmp + (2.5066282746310005 * ser / x).ln()
}

const BETA_MAX_ITER: usize = 200;
const BETA_EPSILON: f64 = 1e-14;
const BETA_TINY: f64 = 1e-30;

/// Regularized incomplete beta function I_x(a, b), `a, b > 0`, via the
/// continued-fraction expansion with modified Lentz evaluation. `x` outside
/// (0, 1) clamps to the exact endpoint values.
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // The continued fraction converges fastest below the symmetry point;
    // above it, use I_x(a,b) = 1 - I_{1-x}(b,a).
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < BETA_TINY {
        d = BETA_TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=BETA_MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < BETA_TINY {
            d = BETA_TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < BETA_TINY {
            c = BETA_TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < BETA_TINY {
            d = BETA_TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < BETA_TINY {
            c = BETA_TINY;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;

        if (del - 1.0).abs() < BETA_EPSILON {
            break;
        }
    }
    h
}

/// Student-t CDF with `df` degrees of freedom, via the incomplete beta
/// identity. `df <= 0` returns NaN.
pub fn t_cdf(t: f64, df: f64) -> f64 {
    if df <= 0.0 {
        return f64::NAN;
    }
    let x = df / (df + t * t);
    let ib = regularized_incomplete_beta(df / 2.0, 0.5, x);
    if t > 0.0 {
        1.0 - 0.5 * ib
    } else {
        0.5 * ib
    }
}
