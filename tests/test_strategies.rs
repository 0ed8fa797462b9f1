mod common;

use common::series_from_closes;
use trade_flow::indicators;
use trade_flow::model::Series;
use trade_flow::strategies::SpotStrategy;

/// Ramp 100→110 then back down to 100.
fn triangle_closes() -> Vec<f64> {
    let mut closes: Vec<f64> = (100..=110).map(|c| c as f64).collect();
    closes.extend((100..110).rev().map(|c| c as f64));
    closes
}

#[test]
fn sma_crossover_fires_once_each_way() {
    let strategy = SpotStrategy::SmaCrossover {
        fast_period: 3,
        slow_period: 5,
    };
    let series = series_from_closes(&triangle_closes());
    let output = strategy.evaluate(&series, None);

    let buys: Vec<usize> = output
        .signals
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == 1)
        .map(|(i, _)| i)
        .collect();
    let sells: Vec<usize> = output
        .signals
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == -1)
        .map(|(i, _)| i)
        .collect();

    assert_eq!(buys.len(), 1, "exactly one buy: {:?}", output.signals);
    assert_eq!(sells.len(), 1, "exactly one sell: {:?}", output.signals);
    assert!(buys[0] < sells[0]);

    // Every other bar holds.
    let nonzero = output.signals.iter().filter(|s| **s != 0).count();
    assert_eq!(nonzero, 2);

    assert!(output.indicators.contains_key("sma_fast"));
    assert!(output.indicators.contains_key("sma_slow"));
}

/// Between two consecutive buy signals there must be a bar where the
/// condition was violated: no level emission.
#[test]
fn signals_are_edge_triggered() {
    let mut closes = triangle_closes();
    // Second ramp: same shape again, which re-arms each crossover.
    closes.extend(triangle_closes());
    let series = series_from_closes(&closes);

    for name in ["sma_crossover", "ema_crossover", "macd", "triple_ema"] {
        let strategy = SpotStrategy::from_name(name).expect(name);
        let output = strategy.evaluate(&series, None);
        assert!(
            output.signals.contains(&1),
            "{name} found no buy in two full cycles"
        );

        let mut last_buy: Option<usize> = None;
        for (i, s) in output.signals.iter().enumerate() {
            if *s == 1 {
                if let Some(prev) = last_buy {
                    assert!(
                        output.signals[prev + 1..i].iter().any(|x| *x == -1),
                        "{name}: two buys at {prev},{i} with no exit between"
                    );
                }
                last_buy = Some(i);
            }
        }
    }
}

#[test]
fn rsi_stays_bounded_and_crosses_oversold() {
    let closes = triangle_closes();
    let rsi = indicators::rsi(&closes, 5);
    for v in rsi.iter().filter(|v| v.is_finite()) {
        assert!((0.0..=100.0).contains(v), "rsi out of range: {v}");
    }

    // A V-shape drives RSI down then back up through the oversold line.
    let mut v_closes: Vec<f64> = (0..20).map(|i| 200.0 - 4.0 * i as f64).collect();
    v_closes.extend((0..20).map(|i| 124.0 + 4.0 * i as f64));
    let strategy = SpotStrategy::Rsi {
        period: 5,
        overbought: 70.0,
        oversold: 30.0,
    };
    let output = strategy.evaluate(&series_from_closes(&v_closes), None);
    assert!(
        output.signals.contains(&1),
        "expected a buy on the oversold recovery"
    );
}

#[test]
fn momentum_roc_threshold_crossing() {
    // Flat, then a sharp jump: ROC crosses the +5% threshold exactly once.
    let mut closes = vec![100.0; 30];
    closes.extend([101.0, 103.0, 106.0, 110.0, 110.0, 110.0, 110.0]);
    let strategy = SpotStrategy::Momentum {
        roc_period: 14,
        threshold: 5.0,
    };
    let output = strategy.evaluate(&series_from_closes(&closes), None);
    assert_eq!(output.signals.iter().filter(|s| **s == 1).count(), 1);
}

#[test]
fn volume_weighted_requires_volume_confirmation() {
    let closes = triangle_closes();
    let mut series = series_from_closes(&closes);
    // Flat low volume everywhere: the SMA cross alone must not fire.
    for bar in &mut series.bars {
        bar.volume = 100.0;
    }
    let strategy = SpotStrategy::VolumeWeighted {
        sma_period: 5,
        vol_multiplier: 1.5,
    };
    let output = strategy.evaluate(&series, None);
    assert!(output.signals.iter().all(|s| *s == 0));

    // Spike the volume around the upward cross and it fires.
    let mut spiked = series.clone();
    for bar in &mut spiked.bars {
        bar.volume = 100.0;
    }
    for bar in spiked.bars.iter_mut().skip(4).take(8) {
        bar.volume = 1_000.0;
    }
    let output = strategy.evaluate(&spiked, None);
    assert!(output.signals.contains(&1));
}

#[test]
fn pairs_spread_degrades_without_secondary() {
    let strategy = SpotStrategy::PairsSpread {
        lookback: 5,
        entry_z: 2.0,
        exit_z: 0.5,
    };
    let series = series_from_closes(&triangle_closes());

    let degraded = strategy.evaluate(&series, None);
    assert!(degraded.degraded);

    let closes_b: Vec<f64> = triangle_closes().iter().map(|c| c * 2.0).collect();
    let proper = strategy.evaluate(&series, Some(&closes_b));
    assert!(!proper.degraded);
    // A constant ratio has zero deviation: no signals.
    assert!(proper.signals.iter().all(|s| *s == 0));
}

#[test]
fn insufficient_history_yields_no_signals() {
    for name in SpotStrategy::NAMES {
        let strategy = SpotStrategy::from_name(name).expect(name);
        let short = series_from_closes(&[100.0, 101.0, 102.0]);
        let output = strategy.evaluate(&short, None);
        assert!(
            output.signals.iter().all(|s| *s == 0),
            "{name} fired on a 3-bar series"
        );
    }
}

#[test]
fn indicator_warmup_is_nan() {
    let closes: Vec<f64> = (1..=30).map(|c| c as f64).collect();
    let sma = indicators::sma(&closes, 10);
    assert!(sma[..9].iter().all(|v| v.is_nan()));
    assert!(sma[9..].iter().all(|v| v.is_finite()));
    assert!((sma[9] - 5.5).abs() < 1e-12);

    let z = indicators::zscore(&closes, 10);
    assert!(z[..9].iter().all(|v| v.is_nan()));

    let (mid, upper, lower) = indicators::bollinger(&closes, 10, 2.0);
    for i in 9..closes.len() {
        assert!(lower[i] <= mid[i] && mid[i] <= upper[i]);
    }
}

#[test]
fn series_validation_rejects_bad_bars() {
    let good = series_from_closes(&[100.0, 101.0]);
    assert!(good.validate().is_ok());

    let mut dup = good.clone();
    dup.bars[1].timestamp_ms = dup.bars[0].timestamp_ms;
    assert!(dup.validate().is_err());

    let mut crossed = good.clone();
    crossed.bars[0].low = crossed.bars[0].close + 10.0;
    assert!(crossed.validate().is_err());
}

#[test]
fn align_with_inner_joins_on_timestamp() {
    let a = series_from_closes(&[1.0, 2.0, 3.0, 4.0]);
    let mut b = series_from_closes(&[10.0, 20.0, 30.0, 40.0]);
    b.bars.remove(1);

    let (aligned, closes_b) = a.align_with(&Series::new(b.bars));
    assert_eq!(aligned.len(), 3);
    assert_eq!(closes_b, vec![10.0, 30.0, 40.0]);
}
