//! Integration tests for the backtest day loop.
//!
//! Tests:
//! 1. Accounting: equity, cash, fee, and per-trade pnl identities
//! 2. Exits: stop, take-profit, max-hold, terminal force-close, halt latch
//! 3. Gating: rebalance cadence, gap days, cash rejection, final-bar rule
//! 4. Determinism: reruns identical, truncated history matches full-run prefix

use alphalab_core::domain::{Direction, PriceTable, SectorMap, Signal, SignalCategory, SignalTable};
use alphalab_core::engine::{BacktestEngine, EngineConfig, EngineError, RebalanceCadence};
use alphalab_core::{CostModel, ExitReason};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::HashMap;

/// First `n` weekdays starting 2024-01-02.
fn weekdays(n: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(n);
    let mut date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    while dates.len() < n {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(date);
        }
        date += chrono::Duration::days(1);
    }
    dates
}

/// Build a price table from per-ticker close columns on the weekday axis.
fn table(columns: &[(&str, Vec<Option<f64>>)]) -> PriceTable {
    let n = columns[0].1.len();
    let closes: HashMap<String, Vec<Option<f64>>> = columns
        .iter()
        .map(|(ticker, column)| (ticker.to_string(), column.clone()))
        .collect();
    PriceTable::new(weekdays(n), closes).unwrap()
}

/// Deterministic pseudo-random walk using a simple LCG, floored at 10.
fn walk_column(n: usize, salt: u64, start: f64) -> Vec<Option<f64>> {
    let mut price = start;
    (0..n)
        .map(|i| {
            let seed = (i as u64)
                .wrapping_add(salt)
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1);
            let change = ((seed % 200) as f64 - 100.0) * 0.05; // -5.0 to +5.0
            price = (price + change).max(10.0);
            Some(price)
        })
        .collect()
}

fn signal(ticker: &str, date: NaiveDate, direction: Direction, confidence: f64) -> Signal {
    Signal {
        ticker: ticker.into(),
        date,
        score: confidence,
        direction,
        confidence,
        holding_days: 20,
        category: SignalCategory::Momentum,
        strategy: "xsec_momentum".into(),
    }
}

/// Frictionless, daily-rebalance config. Default sizing gives a 0.8-confidence
/// momentum signal a weight of exactly 0.08 of equity.
fn zero_cost_daily() -> EngineConfig {
    EngineConfig {
        costs: CostModel::zero_cost(),
        rebalance: RebalanceCadence::Daily,
        ..EngineConfig::default()
    }
}

/// One ticker allowed to absorb the whole book. Used to push equity around
/// hard enough to exercise the drawdown halt and the cash check.
fn full_book_config(costs: CostModel, stop_loss_pct: f64) -> EngineConfig {
    let mut config = zero_cost_daily();
    config.costs = costs;
    config.stop_loss_pct = stop_loss_pct;
    config.sizer.max_position_pct = 1.0;
    config.constructor.max_positions = 1;
    config.constructor.max_position_pct = 1.0;
    config.constructor.max_sector_pct = 1.0;
    config.constructor.max_daily_turnover_pct = 1.0;
    config
}

fn run(
    config: EngineConfig,
    prices: &PriceTable,
    signals: Vec<Signal>,
) -> alphalab_core::BacktestRun {
    let engine = BacktestEngine::new(config).unwrap();
    engine
        .run(
            prices,
            &SectorMap::default(),
            &SignalTable::new(signals),
            "xsec_momentum",
        )
        .unwrap()
}

/// The standard busy fixture: three walks, a signal every fifth day with
/// rotating direction and confidence.
fn busy_fixture(n: usize) -> (PriceTable, Vec<Signal>) {
    let prices = table(&[
        ("AAA", walk_column(n, 11, 100.0)),
        ("BBB", walk_column(n, 47, 150.0)),
        ("CCC", walk_column(n, 83, 200.0)),
    ]);
    let tickers = ["AAA", "BBB", "CCC"];
    let confidences = [0.5, 0.7, 0.9];
    let mut signals = Vec::new();
    for (k, index) in (0..n).step_by(5).enumerate() {
        let direction = if k % 3 == 2 {
            Direction::Short
        } else {
            Direction::Long
        };
        signals.push(signal(
            tickers[k % 3],
            prices.dates()[index],
            direction,
            confidences[k % 3],
        ));
    }
    (prices, signals)
}

// ──────────────────────────────────────────────
// Degenerate inputs
// ──────────────────────────────────────────────

#[test]
fn empty_price_history_is_an_error() {
    let prices = table(&[("AAA", vec![Some(100.0); 5])]);
    let empty = prices.slice(0, 0);
    let engine = BacktestEngine::new(zero_cost_daily()).unwrap();
    let result = engine.run(
        &empty,
        &SectorMap::default(),
        &SignalTable::default(),
        "xsec_momentum",
    );
    assert!(matches!(result, Err(EngineError::EmptyPriceHistory)));
}

#[test]
fn flat_market_no_signals_equity_constant() {
    let prices = table(&[("AAA", vec![Some(100.0); 30])]);
    let run = run(zero_cost_daily(), &prices, vec![]);

    assert_eq!(run.n_days(), 30);
    assert_eq!(run.equity_curve.len(), 30);
    assert_eq!(run.daily_returns.len(), 30);
    for (i, &eq) in run.equity_curve.iter().enumerate() {
        assert_eq!(eq, 100_000.0, "equity drifted at bar {i}, got {eq}");
    }
    for &r in &run.daily_returns {
        assert_eq!(r, 0.0);
    }
    assert!(run.trades.is_empty());
    assert!(!run.halted);
}

// ──────────────────────────────────────────────
// Round-trip accounting, known values
// ──────────────────────────────────────────────

#[test]
fn single_long_round_trip_known_values() {
    // 0.8 confidence momentum signal sizes to 8% of 100k at 100 = 80 shares.
    let closes: Vec<Option<f64>> = [100.0, 101.0, 102.0, 103.0, 104.0]
        .iter()
        .map(|&p| Some(p))
        .collect();
    let prices = table(&[("AAA", closes)]);
    let entry_date = prices.dates()[0];
    let run = run(
        zero_cost_daily(),
        &prices,
        vec![signal("AAA", entry_date, Direction::Long, 0.8)],
    );

    let expected = [100_000.0, 100_080.0, 100_160.0, 100_240.0, 100_320.0];
    for (i, (&got, &want)) in run.equity_curve.iter().zip(&expected).enumerate() {
        assert!(
            (got - want).abs() < 1e-9,
            "equity mismatch at bar {i}: got {got}, want {want}"
        );
    }

    assert_eq!(run.trades.len(), 1);
    let trade = &run.trades[0];
    assert_eq!(trade.ticker, "AAA");
    assert_eq!(trade.exit_reason, ExitReason::EndOfBacktest);
    assert_eq!(trade.holding_days, 4);
    assert!((trade.shares - 80.0).abs() < 1e-12);
    assert!((trade.entry_price - 100.0).abs() < 1e-12);
    assert!((trade.exit_price - 104.0).abs() < 1e-12);
    assert!((trade.pnl - 320.0).abs() < 1e-9);
    assert!((run.final_equity() - 100_320.0).abs() < 1e-9);
    assert!((run.final_cash - run.final_equity()).abs() < 1e-9);
}

#[test]
fn short_round_trip_profits_when_price_falls() {
    let closes: Vec<Option<f64>> = [100.0, 96.0, 90.0].iter().map(|&p| Some(p)).collect();
    let prices = table(&[("AAA", closes)]);
    let entry_date = prices.dates()[0];
    let run = run(
        zero_cost_daily(),
        &prices,
        vec![signal("AAA", entry_date, Direction::Short, 0.8)],
    );

    // Short 80 shares at 100: proceeds post to cash, the mark offsets them.
    let expected = [100_000.0, 100_320.0, 100_800.0];
    for (i, (&got, &want)) in run.equity_curve.iter().zip(&expected).enumerate() {
        assert!(
            (got - want).abs() < 1e-9,
            "equity mismatch at bar {i}: got {got}, want {want}"
        );
    }

    assert_eq!(run.trades.len(), 1);
    let trade = &run.trades[0];
    assert_eq!(trade.direction, Direction::Short);
    assert_eq!(trade.exit_reason, ExitReason::EndOfBacktest);
    assert!((trade.pnl - 800.0).abs() < 1e-9);
}

// ──────────────────────────────────────────────
// Exit triggers
// ──────────────────────────────────────────────

#[test]
fn stop_loss_fires_on_breach_day() {
    // Stop sits at 92 after a fill at 100; the drop to 91 breaches it.
    let closes: Vec<Option<f64>> = [100.0, 100.0, 98.0, 91.0, 91.0, 91.0]
        .iter()
        .map(|&p| Some(p))
        .collect();
    let prices = table(&[("AAA", closes)]);
    let entry_date = prices.dates()[0];
    let run = run(
        zero_cost_daily(),
        &prices,
        vec![signal("AAA", entry_date, Direction::Long, 0.8)],
    );

    assert_eq!(run.trades.len(), 1);
    let trade = &run.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_date, prices.dates()[3]);
    assert_eq!(trade.holding_days, 3);
    assert!((trade.exit_price - 91.0).abs() < 1e-12);
    assert!((trade.pnl - (91.0 - 100.0) * 80.0).abs() < 1e-9);
}

#[test]
fn take_profit_fires_on_breach_day() {
    // Take-profit sits at 115; the pop to 116 clears it.
    let closes: Vec<Option<f64>> = [100.0, 102.0, 116.0, 116.0]
        .iter()
        .map(|&p| Some(p))
        .collect();
    let prices = table(&[("AAA", closes)]);
    let entry_date = prices.dates()[0];
    let run = run(
        zero_cost_daily(),
        &prices,
        vec![signal("AAA", entry_date, Direction::Long, 0.8)],
    );

    assert_eq!(run.trades.len(), 1);
    let trade = &run.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_eq!(trade.exit_date, prices.dates()[2]);
    assert!((trade.pnl - (116.0 - 100.0) * 80.0).abs() < 1e-9);
}

#[test]
fn max_hold_forces_exit() {
    let mut config = zero_cost_daily();
    config.hard_max_hold_days = 5;
    let prices = table(&[("AAA", vec![Some(100.0); 10])]);
    let entry_date = prices.dates()[0];
    let run = run(
        config,
        &prices,
        vec![signal("AAA", entry_date, Direction::Long, 0.8)],
    );

    assert_eq!(run.trades.len(), 1);
    let trade = &run.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::MaxHold);
    assert_eq!(trade.exit_date, prices.dates()[5]);
    assert_eq!(trade.holding_days, 5);
    assert!(trade.pnl.abs() < 1e-9);
}

#[test]
fn drawdown_halt_flattens_book_and_latches() {
    // Whole book in one name with a wide 40% stop so the bleed reaches the
    // 20% halt before the stop can fire.
    let config = full_book_config(CostModel::zero_cost(), 0.40);
    let closes: Vec<Option<f64>> = [100.0, 95.0, 88.0, 80.0, 74.0, 74.0, 74.0, 74.0]
        .iter()
        .map(|&p| Some(p))
        .collect();
    let prices = table(&[("AAA", closes)]);
    let signals = vec![
        signal("AAA", prices.dates()[0], Direction::Long, 1.0),
        // Arrives after the halt; the latch must refuse it.
        signal("AAA", prices.dates()[5], Direction::Long, 1.0),
    ];
    let run = run(config, &prices, signals);

    assert!(run.halted);
    assert_eq!(run.trades.len(), 1);
    let trade = &run.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::DrawdownHalt);
    assert_eq!(trade.exit_date, prices.dates()[4]);
    assert!((trade.pnl - (74.0 - 100.0) * 1000.0).abs() < 1e-9);

    // Flat from the halt day on.
    for &eq in &run.equity_curve[4..] {
        assert!((eq - 74_000.0).abs() < 1e-9);
    }
    assert!((run.final_cash - 74_000.0).abs() < 1e-9);
}

// ──────────────────────────────────────────────
// Entry gating
// ──────────────────────────────────────────────

#[test]
fn insufficient_cash_rejects_the_fill() {
    // Construction sizes at the raw close, but the fill carries 15bps of
    // impact; a full-equity order cannot clear and must be rejected whole.
    let config = full_book_config(CostModel::retail(), 0.08);
    let prices = table(&[("AAA", vec![Some(100.0); 6])]);
    let entry_date = prices.dates()[0];
    let run = run(
        config,
        &prices,
        vec![signal("AAA", entry_date, Direction::Long, 1.0)],
    );

    assert!(run.trades.is_empty());
    for &eq in &run.equity_curve {
        assert_eq!(eq, 100_000.0);
    }
    assert_eq!(run.total_fees, 0.0);
}

#[test]
fn gap_days_carry_the_last_mark() {
    let prices = table(&[(
        "AAA",
        vec![Some(100.0), None, None, Some(103.0), Some(103.0)],
    )]);
    let entry_date = prices.dates()[0];
    let run = run(
        zero_cost_daily(),
        &prices,
        vec![signal("AAA", entry_date, Direction::Long, 0.8)],
    );

    // 80 shares at 100; the gap days hold the entry mark, the resume at 103
    // adds 240.
    let expected = [100_000.0, 100_000.0, 100_000.0, 100_240.0, 100_240.0];
    for (i, (&got, &want)) in run.equity_curve.iter().zip(&expected).enumerate() {
        assert!(
            (got - want).abs() < 1e-9,
            "equity mismatch at bar {i}: got {got}, want {want}"
        );
    }
    // No exit fired during the gap.
    assert_eq!(run.trades.len(), 1);
    assert_eq!(run.trades[0].exit_reason, ExitReason::EndOfBacktest);
}

#[test]
fn weekly_cadence_defers_midweek_signals() {
    let mut config = zero_cost_daily();
    config.rebalance = RebalanceCadence::Weekly;
    // 9 weekdays: Tue 01-02 .. Fri 01-12; the second ISO week opens Mon 01-08.
    let prices = table(&[
        ("WED", vec![Some(100.0); 9]),
        ("MON", vec![Some(100.0); 9]),
    ]);
    let wednesday = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
    let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
    let signals = vec![
        signal("WED", wednesday, Direction::Long, 0.8),
        signal("MON", monday, Direction::Long, 0.8),
        // No price column for this one; it must be skipped quietly.
        signal("GHOST", monday, Direction::Long, 0.8),
    ];
    let run = run(config, &prices, signals);

    assert_eq!(run.trades.len(), 1);
    assert_eq!(run.trades[0].ticker, "MON");
    assert_eq!(run.trades[0].entry_date, monday);
}

#[test]
fn final_bar_never_opens_positions() {
    let prices = table(&[("AAA", vec![Some(100.0); 5])]);
    let last_date = prices.dates()[4];
    let run = run(
        zero_cost_daily(),
        &prices,
        vec![signal("AAA", last_date, Direction::Long, 0.9)],
    );

    assert!(run.trades.is_empty());
    assert_eq!(run.final_equity(), 100_000.0);
}

// ──────────────────────────────────────────────
// Accounting identities on a busy tape
// ──────────────────────────────────────────────

#[test]
fn accounting_identities_on_a_busy_tape() {
    let (prices, signals) = busy_fixture(120);
    let mut config = zero_cost_daily();
    config.costs = CostModel::retail();
    let run = run(config, &prices, signals);

    assert!(!run.trades.is_empty(), "fixture should produce trades");

    // Terminal force-close leaves the book flat, so cash is equity.
    assert!((run.final_cash - run.final_equity()).abs() < 1e-6);

    // Equity identity: every dollar of pnl is accounted for by a trade.
    let total_pnl: f64 = run.trades.iter().map(|t| t.pnl).sum();
    assert!(
        (run.final_equity() - (run.initial_capital + total_pnl)).abs() < 1e-6,
        "final equity {} != initial {} + pnl {}",
        run.final_equity(),
        run.initial_capital,
        total_pnl
    );

    // Per-trade identity: pnl == signed price move minus cash fees, and
    // pnl_pct is that pnl over the entry notional.
    for trade in &run.trades {
        let gross = (trade.exit_price - trade.entry_price) * trade.shares * trade.direction.sign();
        assert!(
            (trade.pnl - (gross - trade.costs)).abs() < 1e-9,
            "pnl identity violated for {} entered {}",
            trade.ticker,
            trade.entry_date
        );
        assert!(
            (trade.pnl_pct - trade.pnl / (trade.entry_price * trade.shares)).abs() < 1e-12,
            "pnl_pct identity violated for {} entered {}",
            trade.ticker,
            trade.entry_date
        );
        assert!(trade.costs >= 0.0);
    }

    // Every opened position closed, so the fee ledger matches the trade log.
    let total_costs: f64 = run.trades.iter().map(|t| t.costs).sum();
    assert!((run.total_fees - total_costs).abs() < 1e-9);
}

#[test]
fn daily_returns_compound_to_final_equity() {
    let (prices, signals) = busy_fixture(120);
    let run = run(zero_cost_daily(), &prices, signals);

    let compounded: f64 = run.daily_returns.iter().map(|r| 1.0 + r).product();
    let implied = run.initial_capital * compounded;
    assert!(
        (implied - run.final_equity()).abs() / run.final_equity() < 1e-9,
        "returns compound to {implied}, equity curve ends at {}",
        run.final_equity()
    );
}

// ──────────────────────────────────────────────
// Determinism
// ──────────────────────────────────────────────

#[test]
fn reruns_are_identical() {
    let (prices, signals) = busy_fixture(120);
    let mut config = zero_cost_daily();
    config.costs = CostModel::retail();

    let first = run(config.clone(), &prices, signals.clone());
    let second = run(config, &prices, signals);

    assert_eq!(first.equity_curve, second.equity_curve);
    assert_eq!(first.daily_returns, second.daily_returns);
    assert_eq!(first.final_cash, second.final_cash);
    assert_eq!(first.trades.len(), second.trades.len());
    for (a, b) in first.trades.iter().zip(&second.trades) {
        assert_eq!(a.ticker, b.ticker);
        assert_eq!(a.entry_date, b.entry_date);
        assert_eq!(a.exit_date, b.exit_date);
        assert_eq!(a.pnl, b.pnl);
    }
    assert_eq!(first.config_id, second.config_id);
}

#[test]
fn truncated_history_matches_full_run_prefix() {
    // Day t of a run may depend only on data up to day t. Rerunning on a
    // truncated tape must reproduce the full run exactly, except on the
    // truncated run's own final bar where the terminal force-close differs.
    let (prices, signals) = busy_fixture(120);
    let truncated_prices = prices.slice(0, 60);
    let mut config = zero_cost_daily();
    config.costs = CostModel::retail();

    let full = run(config.clone(), &prices, signals.clone());
    let truncated = run(config, &truncated_prices, signals);

    let boundary = prices.dates()[59];
    for i in 0..59 {
        let f = full.equity_curve[i];
        let t = truncated.equity_curve[i];
        assert!(
            (f - t).abs() < 1e-10,
            "future data leaked into bar {i}: full={f}, truncated={t}"
        );
        assert!((full.daily_returns[i] - truncated.daily_returns[i]).abs() < 1e-12);
    }

    // Trades that completed before the boundary must agree event for event.
    let full_prefix: Vec<_> = full
        .trades
        .iter()
        .filter(|t| t.exit_date < boundary)
        .collect();
    let truncated_prefix: Vec<_> = truncated
        .trades
        .iter()
        .filter(|t| t.exit_date < boundary)
        .collect();
    assert_eq!(full_prefix.len(), truncated_prefix.len());
    for (f, t) in full_prefix.iter().zip(&truncated_prefix) {
        assert_eq!(f.ticker, t.ticker);
        assert_eq!(f.entry_date, t.entry_date);
        assert_eq!(f.exit_date, t.exit_date);
        assert_eq!(f.exit_reason, t.exit_reason);
        assert!((f.pnl - t.pnl).abs() < 1e-10);
    }
}
