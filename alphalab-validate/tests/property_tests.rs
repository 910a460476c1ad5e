//! Property tests for validation invariants.
//!
//! Uses proptest to verify:
//! 1. Metrics — every summary field stays inside its documented range
//! 2. Series — equity recompounds exactly and drawdowns flag each peak
//! 3. Inference — t-test and BH adjustments respect order and bounds
//! 4. Folds — purged and walk-forward schedules tile without leakage
//! 5. Resampling — bootstrap percentiles stay ordered; slippage only hurts

use alphalab_validate::metrics::{drawdown_series, equity_from_returns};
use alphalab_validate::walk_forward::LOW_IS_SHARPE_THRESHOLD;
use alphalab_validate::{
    benjamini_hochberg, block_bootstrap, iid_bootstrap, one_sided_t_test, parameter_stability,
    purged_folds, sharpe_decay, slippage_sensitivity, walk_forward_folds, McConfig,
    PurgedCvConfig, ResampleMethod, SharpeDecayFlag, StrategyMetrics, WalkForwardConfig,
};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_returns(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.12..0.12_f64, len)
}

// ── 1. Metric ranges and series identities ───────────────────────────

proptest! {
    /// Whatever the tape looks like, every summary field lands inside the
    /// range its documentation promises.
    #[test]
    fn metric_fields_stay_in_range(
        returns in arb_returns(2..260),
        n_trials in 0..40_usize,
    ) {
        let m = StrategyMetrics::compute(&returns, None, n_trials);

        prop_assert_eq!(m.n_returns, returns.len());
        for (name, value) in [
            ("total_return", m.total_return),
            ("annualized_return", m.annualized_return),
            ("sharpe", m.sharpe),
            ("sortino", m.sortino),
            ("calmar", m.calmar),
            ("var_95", m.var_95),
            ("cvar_95", m.cvar_95),
            ("skewness", m.skewness),
            ("excess_kurtosis", m.excess_kurtosis),
        ] {
            prop_assert!(value.is_finite(), "{name} not finite: {value}");
        }

        prop_assert!(m.max_drawdown >= 0.0 && m.max_drawdown < 1.0);
        prop_assert!(m.max_underwater_days <= returns.len() + 1);
        prop_assert!(m.annualized_volatility >= 0.0);
        prop_assert!(m.ulcer_index >= 0.0);
        prop_assert!(m.cvar_95 <= m.var_95 + 1e-9);
        prop_assert!((0.0..=100.0).contains(&m.tail_ratio));
        prop_assert!((0.0..=100.0).contains(&m.omega));
        prop_assert!((-1e-9..=1.0 + 1e-9).contains(&m.stability));
        prop_assert!((0.0..=1.0).contains(&m.consistency));
        prop_assert!((0.0..=1.0).contains(&m.deflated_sharpe));
    }

    /// The equity path reconstructs exactly from its own returns, and the
    /// drawdown series marks every running peak with a zero.
    #[test]
    fn equity_and_drawdowns_reconcile(returns in arb_returns(1..200)) {
        let equity = equity_from_returns(&returns);
        prop_assert_eq!(equity.len(), returns.len() + 1);
        prop_assert_eq!(equity[0], 1.0);
        for (i, &r) in returns.iter().enumerate() {
            prop_assert!(equity[i + 1] > 0.0);
            prop_assert_eq!(equity[i + 1], equity[i] * (1.0 + r));
        }

        let drawdowns = drawdown_series(&equity);
        prop_assert_eq!(drawdowns.len(), equity.len());
        let mut peak = f64::MIN;
        for (i, &e) in equity.iter().enumerate() {
            if e > peak {
                peak = e;
                prop_assert_eq!(drawdowns[i], 0.0);
            }
            prop_assert!((0.0..1.0).contains(&drawdowns[i]));
        }
    }
}

// ── 2. Inference bounds ──────────────────────────────────────────────

proptest! {
    /// P-values stay in [0, 1] and sit on the side of 0.5 the sample mean
    /// dictates, degenerate samples included.
    #[test]
    fn t_test_p_values_follow_the_mean(
        samples in prop::collection::vec(-0.5..0.5_f64, 2..60),
    ) {
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let t = one_sided_t_test(&samples).unwrap();

        prop_assert_eq!(t.df, (samples.len() - 1) as f64);
        prop_assert!((-1e-9..=1.0 + 1e-9).contains(&t.p_value));
        if mean > 0.0 {
            prop_assert!(t.p_value <= 0.5 + 1e-9, "positive mean, p = {}", t.p_value);
        } else if mean < 0.0 {
            prop_assert!(t.p_value >= 0.5 - 1e-9, "negative mean, p = {}", t.p_value);
        }
    }

    /// BH never lowers a p-value, never exceeds one, answers in input
    /// order, and stays monotone when viewed in rank order.
    #[test]
    fn bh_adjustment_keeps_order_and_bounds(
        ps in prop::collection::vec(0.0..=1.0_f64, 1..40),
        alpha in 0.01..0.25_f64,
    ) {
        let tests: Vec<(String, f64)> = ps
            .iter()
            .enumerate()
            .map(|(i, &p)| (format!("v{i}"), p))
            .collect();
        let results = benjamini_hochberg(&tests, alpha);

        prop_assert_eq!(results.len(), ps.len());
        for (i, r) in results.iter().enumerate() {
            prop_assert_eq!(&r.variant_id, &format!("v{i}"));
            prop_assert_eq!(r.raw_p, ps[i]);
            prop_assert!(r.adjusted_p >= r.raw_p - 1e-12);
            prop_assert!(r.adjusted_p <= 1.0);
            prop_assert_eq!(r.significant, r.adjusted_p <= alpha);
        }

        let mut by_raw: Vec<_> = results.iter().collect();
        by_raw.sort_by(|a, b| {
            a.raw_p
                .partial_cmp(&b.raw_p)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for pair in by_raw.windows(2) {
            prop_assert!(pair[1].adjusted_p >= pair[0].adjusted_p - 1e-12);
        }
    }
}

// ── 3. Fold schedules ────────────────────────────────────────────────

proptest! {
    /// Test windows tile the sample exactly and no training index ever
    /// falls inside the purged-and-embargoed exclusion zone.
    #[test]
    fn purged_folds_tile_and_respect_exclusions(
        n in 50..400_usize,
        purge in 0..12_usize,
        embargo in 0..12_usize,
    ) {
        let config = PurgedCvConfig {
            purge_days: purge,
            embargo_days: embargo,
            ..PurgedCvConfig::default()
        };
        let folds = purged_folds(n, &config).unwrap();

        prop_assert_eq!(folds.len(), config.n_folds);
        prop_assert_eq!(folds[0].test_start, 0);
        prop_assert_eq!(folds[folds.len() - 1].test_end, n);
        for pair in folds.windows(2) {
            prop_assert_eq!(pair[0].test_end, pair[1].test_start);
        }

        for fold in &folds {
            let excl_start = fold.test_start.saturating_sub(purge);
            let excl_end = (fold.test_end + embargo).min(n);
            prop_assert_eq!(fold.train_indices.len(), n - (excl_end - excl_start));
            for pair in fold.train_indices.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            for &idx in &fold.train_indices {
                prop_assert!(idx < n);
                prop_assert!(
                    idx < excl_start || idx >= excl_end,
                    "train index {idx} inside exclusion [{excl_start}, {excl_end})"
                );
            }
        }
    }

    /// Folds step by exactly step_days, keep their window widths, fit the
    /// sample, and the schedule is maximal.
    #[test]
    fn walk_forward_schedule_is_exact(
        total in 250..1500_usize,
        train in 40..150_usize,
        test in 10..60_usize,
        step in 5..50_usize,
    ) {
        let config = WalkForwardConfig {
            train_days: train,
            test_days: test,
            step_days: step,
            parallel: false,
        };
        let folds = walk_forward_folds(total, &config).unwrap();

        for (i, fold) in folds.iter().enumerate() {
            prop_assert_eq!(fold.fold_index, i);
            prop_assert_eq!(fold.train_start, i * step);
            prop_assert_eq!(fold.train_end, fold.train_start + train);
            prop_assert_eq!(fold.test_start, fold.train_end);
            prop_assert_eq!(fold.test_end, fold.test_start + test);
            prop_assert!(fold.test_end <= total);
        }
        let last = folds[folds.len() - 1];
        prop_assert!(last.train_start + step + train + test > total);
    }

    /// The decay flag is decided by the in-sample Sharpe alone, and each
    /// region computes the decay the way the flag says it does.
    #[test]
    fn decay_flag_partitions_by_in_sample_sharpe(
        is_sharpe in -3.0..3.0_f64,
        oos_sharpe in -3.0..3.0_f64,
    ) {
        let (decay, flag) = sharpe_decay(is_sharpe, oos_sharpe);
        if is_sharpe < 0.0 {
            prop_assert_eq!(flag, SharpeDecayFlag::NegativeInSample);
            prop_assert!(decay.is_none());
        } else if is_sharpe < LOW_IS_SHARPE_THRESHOLD {
            prop_assert_eq!(flag, SharpeDecayFlag::LowInSample);
            prop_assert_eq!(decay, Some(is_sharpe - oos_sharpe));
        } else {
            prop_assert_eq!(flag, SharpeDecayFlag::Normal);
            prop_assert_eq!(decay, Some(1.0 - oos_sharpe / is_sharpe));
        }
    }
}

// ── 4. Bootstrap summaries ───────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Percentiles come out ordered, the loss probability is a fraction,
    /// and the same seed reproduces the same summary bit for bit.
    #[test]
    fn bootstrap_summaries_are_ordered_and_deterministic(
        returns in arb_returns(120..180),
        seed in any::<u64>(),
    ) {
        let config = McConfig {
            n_iterations: 64,
            seed,
            parallel: false,
            ..McConfig::default()
        };
        let summary = iid_bootstrap(&returns, &config).unwrap();

        prop_assert_eq!(summary.method, ResampleMethod::Iid);
        prop_assert_eq!(summary.n_iterations, 64);
        prop_assert_eq!(summary.sample_size, returns.len());
        prop_assert!((0.0..=1.0).contains(&summary.p_net_loss));
        for dist in [
            summary.sharpe,
            summary.total_return,
            summary.max_drawdown,
            summary.annualized_return,
        ] {
            prop_assert!(dist.p5 <= dist.median && dist.median <= dist.p95);
            prop_assert!(dist.std >= 0.0);
        }

        let again = iid_bootstrap(&returns, &config).unwrap();
        prop_assert_eq!(summary.sharpe.mean, again.sharpe.mean);
        prop_assert_eq!(summary.total_return.p95, again.total_return.p95);
        prop_assert_eq!(summary.p_net_loss, again.p_net_loss);
    }

    /// The block bootstrap downgrades to IID draws when the sample cannot
    /// hold two full blocks, and records which path it took.
    #[test]
    fn block_bootstrap_reports_its_method(
        returns in arb_returns(120..260),
        block_len in 20..140_usize,
    ) {
        let config = McConfig {
            n_iterations: 32,
            block_len,
            parallel: false,
            ..McConfig::default()
        };
        let summary = block_bootstrap(&returns, &config).unwrap();
        let expected = if returns.len() < 2 * block_len {
            ResampleMethod::IidFallback
        } else {
            ResampleMethod::Block { block_len }
        };
        prop_assert_eq!(summary.method, expected);
    }
}

// ── 5. Stress conventions ────────────────────────────────────────────

proptest! {
    /// More slippage never helps: the Sharpe curve is non-increasing over
    /// ascending cost levels, and breakeven names the first level at or
    /// below zero.
    #[test]
    fn slippage_only_ever_hurts(
        returns in arb_returns(10..90),
        round_trips in 1.0..400.0_f64,
        raw_levels in prop::collection::vec(0.0..80.0_f64, 2..7),
    ) {
        let mut levels = raw_levels;
        levels.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let result = slippage_sensitivity(&returns, round_trips, &levels).unwrap();

        prop_assert_eq!(result.levels.len(), levels.len());
        for (level, &bps) in result.levels.iter().zip(&levels) {
            prop_assert_eq!(level.slippage_bps, bps);
        }
        for pair in result.levels.windows(2) {
            prop_assert!(pair[1].sharpe <= pair[0].sharpe);
        }
        match result.breakeven_bps {
            Some(bps) => {
                let first = result
                    .levels
                    .iter()
                    .find(|l| l.sharpe <= 0.0)
                    .map(|l| l.slippage_bps);
                prop_assert_eq!(first, Some(bps));
            }
            None => prop_assert!(result.levels.iter().all(|l| l.sharpe > 0.0)),
        }
    }

    /// The stability verdict is exactly the documented predicate over the
    /// record's own fields.
    #[test]
    fn stability_verdict_matches_its_own_fields(
        sharpes in prop::collection::vec(-2.0..2.0_f64, 2..30),
    ) {
        let result = parameter_stability(&sharpes);
        prop_assert!(result.std_sharpe >= 0.0);
        prop_assert!(result.coefficient_of_variation >= 0.0);
        prop_assert_eq!(
            result.stable,
            result.mean_sharpe > 0.0 && result.coefficient_of_variation < 0.5
        );
    }
}
