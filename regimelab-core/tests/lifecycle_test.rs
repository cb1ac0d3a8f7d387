//! End-to-end lifecycle scenarios through the simulation loop.

use chrono::{DateTime, Duration, TimeZone, Utc};
use regimelab_core::domain::{AnnotatedCandle, Candle, Direction, ExitReason, Regime, Signal};
use regimelab_core::{run_simulation, EngineConfig, OffsetMode, RegimeParams};

// ── Helpers ──────────────────────────────────────────────────────────

fn t(hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
}

fn candle(hour: i64, open: f64, high: f64, low: f64, close: f64) -> AnnotatedCandle {
    AnnotatedCandle::plain(Candle::new(t(hour), open, high, low, close))
}

fn with_signal(mut c: AnnotatedCandle, signal: Signal) -> AnnotatedCandle {
    c.signal = Some(signal);
    c
}

/// TP 2/4/7%, fractions 0.5/0.3/0.2, trailing 1.5%, no costs, same for both regimes.
fn scenario_config(max_positions: usize) -> EngineConfig {
    let params = RegimeParams {
        tp_mode: OffsetMode::Percent,
        tp_offsets: [2.0, 4.0, 7.0],
        close_fractions: [0.5, 0.3, 0.2],
        trailing_distance_pct: 1.5,
        timeout_hours: 1000.0,
    };
    EngineConfig {
        max_positions,
        trend: params.clone(),
        range: params,
        ..Default::default()
    }
}

fn assert_approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "actual={actual}, expected={expected}"
    );
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn tp1_tp2_then_trailing_stop_closes_remainder() {
    let stream = vec![
        with_signal(candle(0, 99.8, 100.2, 99.6, 100.0), Signal::long(98.0)),
        candle(1, 100.0, 103.0, 99.5, 102.5),
        candle(2, 103.7, 105.0, 103.6, 104.5),
        candle(3, 104.5, 104.8, 103.3, 103.5),
    ];
    let res = run_simulation(&stream, &scenario_config(1)).unwrap();

    assert_eq!(res.trades.len(), 1);
    let trade = &res.trades[0];
    assert_eq!(trade.direction, Direction::Long);
    assert_eq!(trade.exit_reason, ExitReason::TrailingSl);
    assert!(trade.tp1_hit);
    assert!(trade.tp2_hit);
    assert!(!trade.tp3_hit);
    assert!(trade.trailing_used);
    assert_approx(trade.exit_price, 105.0 * (1.0 - 0.015));
    assert_approx(trade.final_sl, 103.425);
    assert_eq!(trade.exit_time, t(3));

    let reasons: Vec<ExitReason> = res.partials.iter().map(|p| p.reason).collect();
    assert_eq!(
        reasons,
        vec![ExitReason::Tp1, ExitReason::Tp2, ExitReason::TrailingSl]
    );
    assert_approx(res.partials[0].price, 102.0);
    assert_approx(res.partials[1].price, 104.0);
    assert_approx(res.partials[0].fraction, 0.5);
    assert_approx(res.partials[1].fraction, 0.3);
    assert_approx(res.partials[2].fraction, 0.2);

    // 0.5 * 2% + 0.3 * 4% + 0.2 * 3.425%
    assert_approx(trade.pnl_pct, 1.0 + 1.2 + 0.685);
    let slice_sum: f64 = res.partials.iter().map(|p| p.pnl_pct).sum();
    assert_approx(slice_sum, trade.pnl_pct);
}

#[test]
fn short_mirror_of_trailing_scenario() {
    let stream = vec![
        with_signal(candle(0, 100.1, 100.3, 99.8, 100.0), Signal::short(102.0)),
        candle(1, 100.0, 100.5, 97.0, 97.5),
        candle(2, 96.3, 96.4, 95.0, 95.5),
        candle(3, 95.5, 96.7, 95.2, 96.5),
    ];
    let res = run_simulation(&stream, &scenario_config(1)).unwrap();
    let trade = &res.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::TrailingSl);
    assert!(trade.tp1_hit && trade.tp2_hit && !trade.tp3_hit);
    assert_approx(trade.exit_price, 95.0 * 1.015);
    assert_approx(trade.pnl_pct, 1.0 + 1.2 + 0.2 * (100.0 - 96.425));
}

#[test]
fn trailing_seed_on_tp1_candle_does_not_fire_same_candle() {
    // TP1 candle dips below the freshly seeded stop: stops are checked before TPs.
    let stream = vec![
        with_signal(candle(0, 99.8, 100.2, 99.6, 100.0), Signal::long(98.0)),
        candle(1, 100.0, 103.0, 99.0, 101.0),
    ];
    let cfg = EngineConfig {
        close_at_end: false,
        ..scenario_config(1)
    };
    let res = run_simulation(&stream, &cfg).unwrap();
    assert!(res.trades.is_empty());
    assert_eq!(res.partials.len(), 1);
    assert_eq!(res.open_at_end, 1);
}

#[test]
fn zero_distance_stop_never_creates_a_position() {
    let stream = vec![
        with_signal(candle(0, 99.8, 100.2, 99.6, 100.0), Signal::long(100.0)),
        with_signal(candle(1, 100.0, 100.2, 99.6, 100.0), Signal::short(100.0)),
        candle(2, 100.0, 110.0, 90.0, 100.0),
    ];
    let res = run_simulation(&stream, &scenario_config(3)).unwrap();
    assert!(res.trades.is_empty());
    assert_eq!(res.skips.rejected_signals, 2);
    assert_eq!(res.skips.positions_opened, 0);
    assert!(res.equity.iter().all(|p| p.open_positions == 0));
}

#[test]
fn max_positions_one_drops_second_signal() {
    let stream = vec![
        with_signal(candle(0, 99.8, 100.2, 99.6, 100.0), Signal::long(98.0)),
        with_signal(candle(1, 100.0, 100.6, 99.7, 100.3), Signal::long(98.5)),
        candle(2, 100.3, 100.8, 99.9, 100.5),
        candle(3, 100.5, 100.9, 97.5, 97.9),
    ];
    let res = run_simulation(&stream, &scenario_config(1)).unwrap();
    assert_eq!(res.skips.capacity_drops, 1);
    assert_eq!(res.skips.positions_opened, 1);
    assert_eq!(res.trades.len(), 1);
    assert_eq!(res.trades[0].exit_reason, ExitReason::Sl);
    assert!(res.equity.iter().all(|p| p.open_positions <= 1));
}

#[test]
fn capacity_frees_up_on_the_candle_after_closure() {
    // Position closes on candle 1; the signal on candle 1 is still dropped,
    // the one on candle 2 is admitted.
    let stream = vec![
        with_signal(candle(0, 99.8, 100.2, 99.6, 100.0), Signal::long(98.0)),
        with_signal(candle(1, 100.0, 100.1, 97.0, 97.5), Signal::long(96.0)),
        with_signal(candle(2, 97.5, 97.9, 97.1, 97.6), Signal::long(96.0)),
    ];
    let res = run_simulation(&stream, &scenario_config(1)).unwrap();
    assert_eq!(res.skips.capacity_drops, 1);
    assert_eq!(res.skips.positions_opened, 2);
    assert_eq!(res.trades.len(), 2);
    assert_eq!(res.trades[1].exit_reason, ExitReason::EndOfData);
}

#[test]
fn timeout_closes_at_candle_close() {
    let mut cfg = scenario_config(1);
    cfg.range.timeout_hours = 5.0;
    let mut stream = vec![with_signal(
        candle(0, 99.8, 100.2, 99.6, 100.0),
        Signal::long(95.0),
    )];
    for h in 1..=6 {
        stream.push(candle(h, 100.0, 101.0, 99.5, 100.0 + h as f64 * 0.1));
    }
    let res = run_simulation(&stream, &cfg).unwrap();
    let trade = &res.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::Timeout);
    assert_eq!(trade.exit_time, t(5));
    assert_approx(trade.exit_price, 100.5);
    assert_eq!(trade.duration_secs, 5 * 3600);
}

#[test]
fn regime_is_frozen_at_entry() {
    // 100 rising candles classify as TREND; 100 flat ones afterwards as RANGE.
    let mut stream: Vec<AnnotatedCandle> = (0..100)
        .map(|i| {
            let c = 100.0 + i as f64 * 0.5;
            candle(i, c, c + 0.2, c - 0.2, c)
        })
        .collect();
    stream[99].signal = Some(Signal::long(140.0));
    for i in 100..200 {
        stream.push(candle(i, 149.5, 149.55, 149.45, 149.5));
    }
    stream[199].signal = Some(Signal::long(145.0));

    let mut cfg = EngineConfig::default();
    cfg.trend.timeout_hours = 500.0;
    let res = run_simulation(&stream, &cfg).unwrap();

    assert_eq!(res.trades.len(), 2);
    assert_eq!(res.trades[0].regime, Regime::Trend);
    assert_eq!(res.trades[1].regime, Regime::Range);
    assert!(res.trades.iter().all(|t| t.exit_reason == ExitReason::EndOfData));
}

#[test]
fn short_signal_in_two_of_five_window_is_range() {
    // Sawtooth with a slight drift and a volatility burst on the last candles:
    // only the volatility and sequential heuristics vote.
    let mut stream: Vec<AnnotatedCandle> = (0..100)
        .map(|i| {
            let c = 100.0 + 0.01 * (i / 3) as f64 + 0.5 * (i % 3) as f64;
            let half = if i >= 97 { 0.6 } else { 0.1 };
            candle(i as i64, c, c + half, c - half, c)
        })
        .collect();
    let entry = stream[99].candle.close;
    stream[99].signal = Some(Signal::short(entry + 1.0));

    let res = run_simulation(&stream, &EngineConfig::default()).unwrap();
    assert_eq!(res.trades.len(), 1);
    assert_eq!(res.trades[0].direction, Direction::Short);
    assert_eq!(res.trades[0].regime, Regime::Range);
}

#[test]
fn identical_inputs_give_identical_records() {
    let stream = vec![
        with_signal(candle(0, 99.8, 100.2, 99.6, 100.0), Signal::long(98.0)),
        candle(1, 100.0, 103.0, 99.5, 102.5),
        with_signal(candle(2, 103.7, 105.0, 103.6, 104.5), Signal::short(106.0)),
        candle(3, 104.5, 104.8, 103.3, 103.5),
        candle(4, 103.5, 103.9, 101.0, 101.5),
    ];
    let cfg = scenario_config(2);
    let a = run_simulation(&stream, &cfg).unwrap();
    let b = run_simulation(&stream, &cfg).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a.trades).unwrap(),
        serde_json::to_string(&b.trades).unwrap()
    );
}
