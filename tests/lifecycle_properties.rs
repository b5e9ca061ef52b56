//! Property tests for signal fusion and lifecycle invariants.
//!
//! 1. Fusion is order independent and never loosens stop or target
//! 2. Every accepted signal clears the reward:risk minimum
//! 3. Trade levels survive any sequence of price observations unchanged
//! 4. At most one active signal per instrument
//! 5. Non-crossing ticks are idempotent
//! 6. Each signal completes exactly once
//! 7. Concurrent callers on one instrument see the same guarantees
//! plus the worked examples for fusion and tick evaluation.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use signal_engine::lifecycle::{spawn_statistics, CacheConfig, SignalCache, StatisticsReport};
use signal_engine::signals::CombinerConfig;
use signal_engine::strategies::Strategy as Source;
use signal_engine::{Candidate, Combiner, Direction, EngineError, Rejection, Signal, TradeLevels, TradeResult};
use std::sync::Arc;
use tokio::sync::Barrier;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn candidate(source: Source, direction: Direction, entry: f64, risk: f64, reward: f64, score: f64, key: f64) -> Candidate {
    let sign = direction.sign();
    Candidate {
        instrument: "BTCUSDT".to_string(),
        direction,
        levels: TradeLevels::new(entry, entry - sign * risk, entry + sign * reward),
        score,
        rationale: vec![format!("{} setup", source)],
        strategy: source,
        key_level: key,
    }
}

fn signal(instrument: &str, direction: Direction, entry: f64, stop: f64, target: f64) -> Signal {
    Signal::new(
        instrument,
        direction,
        TradeLevels::new(entry, stop, target),
        8.0,
        "BREAKOUT_RETEST".to_string(),
        Vec::new(),
        Utc::now(),
    )
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

/// (entry, risk, reward, score, key offset)
fn arb_leg() -> impl Strategy<Value = (f64, f64, f64, f64, f64)> {
    (90.0..110.0_f64, 0.5..5.0_f64, 0.5..15.0_f64, 0.0..10.0_f64, -1.0..1.0_f64)
}

// ── 1. Fusion ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn fusion_is_order_independent(dir in arb_direction(), a in arb_leg(), b in arb_leg()) {
        let ca = candidate(Source::BreakoutRetest, dir, a.0, a.1, a.2, a.3, a.0 + a.4);
        let cb = candidate(Source::LiquiditySweep, dir, b.0, b.1, b.2, b.3, b.0 + b.4);
        let combiner = Combiner::default();
        let now = Utc::now();

        let ab = combiner.evaluate(&[ca.clone(), cb.clone()], now);
        let ba = combiner.evaluate(&[cb, ca], now);
        match (ab, ba) {
            (Ok(x), Ok(y)) => {
                prop_assert_eq!(x.levels(), y.levels());
                prop_assert_eq!(x.reliability_score(), y.reliability_score());
                prop_assert_eq!(x.strategy_label(), y.strategy_label());
            }
            (Err(x), Err(y)) => prop_assert_eq!(x, y),
            (x, y) => prop_assert!(false, "outcomes differ: {:?} vs {:?}", x, y),
        }
    }

    #[test]
    fn fusion_is_conservative(dir in arb_direction(), a in arb_leg(), b in arb_leg()) {
        let ca = candidate(Source::BreakoutRetest, dir, a.0, a.1, a.2, a.3, a.0);
        let cb = candidate(Source::LiquiditySweep, dir, b.0, b.1, b.2, b.3, b.0);
        if let Ok(signal) = Combiner::default().evaluate(&[ca.clone(), cb.clone()], Utc::now()) {
            let sign = dir.sign();
            for c in [&ca, &cb] {
                // Stop at least as far on the adverse side, target no farther on the favourable side
                prop_assert!(sign * (signal.stop() - c.levels.stop) <= 1e-12);
                prop_assert!(sign * (signal.target() - c.levels.target) <= 1e-12);
            }
        }
    }

    #[test]
    fn opposite_directions_never_fuse(a in arb_leg(), b in arb_leg()) {
        let ca = candidate(Source::BreakoutRetest, Direction::Long, a.0, a.1, a.2, a.3, a.0);
        let cb = candidate(Source::LiquiditySweep, Direction::Short, b.0, b.1, b.2, b.3, b.0);
        prop_assert_eq!(
            Combiner::default().evaluate(&[ca, cb], Utc::now()).unwrap_err(),
            Rejection::ConflictingDirections
        );
    }
}

// ── 2. Minimum quality ───────────────────────────────────────────────

proptest! {
    #[test]
    fn accepted_signals_clear_reward_risk(dir in arb_direction(), a in arb_leg(), b in arb_leg(), pair in any::<bool>()) {
        let config = CombinerConfig::default();
        let ca = candidate(Source::BreakoutRetest, dir, a.0, a.1, a.2, a.3, a.0 + a.4);
        let cb = candidate(Source::LiquiditySweep, dir, b.0, b.1, b.2, b.3, b.0 + b.4);
        let candidates = if pair { vec![ca, cb] } else { vec![ca] };

        if let Ok(signal) = Combiner::new(config.clone()).evaluate(&candidates, Utc::now()) {
            let minimum = if pair { config.min_reward_risk } else { config.standalone_min_reward_risk };
            prop_assert!(signal.reward_risk() >= minimum);
            prop_assert!(signal.levels().is_coherent(dir));
            prop_assert!(signal.reliability_score() <= 10.0);
        }
    }
}

// ── 3-6. Lifecycle ───────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn levels_are_immutable_across_observations(
        dir in arb_direction(),
        prices in prop::collection::vec(80.0..120.0_f64, 1..30),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let cache = SignalCache::new(CacheConfig::default(), spawn_statistics(100));
            let sign = dir.sign();
            let s = signal("BTCUSDT", dir, 100.0, 100.0 - sign * 5.0, 100.0 + sign * 10.0);
            let committed = s.levels();
            let id = s.id();
            cache.submit(s).await.unwrap();

            let mut completions = 0;
            for price in prices {
                if let Some(record) = cache.observe("BTCUSDT", price, Utc::now()).await.unwrap() {
                    completions += 1;
                    assert_eq!(record.signal_id, id);
                    assert_eq!(record.levels, committed);
                }
                if let Some(active) = cache.snapshot("BTCUSDT").await.unwrap() {
                    assert_eq!(active.signal.levels(), committed);
                    assert_eq!(active.signal.id(), id);
                }
            }
            assert!(completions <= 1);
        });
    }

    #[test]
    fn at_most_one_active_per_instrument(ops in prop::collection::vec((0..3usize, any::<bool>(), 90.0..110.0_f64), 1..40)) {
        let rt = runtime();
        rt.block_on(async {
            let instruments = ["AAA", "BBB", "CCC"];
            let cache = SignalCache::new(CacheConfig::default(), spawn_statistics(100));

            for (idx, submit, price) in ops {
                let name = instruments[idx];
                if submit {
                    let had_active = cache.snapshot(name).await.unwrap().is_some();
                    let result = cache.submit(signal(name, Direction::Long, 100.0, 98.0, 104.0)).await;
                    match result {
                        Ok(()) => assert!(!had_active),
                        Err(EngineError::InvariantViolation { .. }) => assert!(had_active),
                        Err(e) => panic!("unexpected error {}", e),
                    }
                } else {
                    cache.observe(name, price, Utc::now()).await.unwrap();
                }

                let snapshots = cache.snapshots().await;
                for name in instruments {
                    let count = snapshots.iter().filter(|a| a.signal.instrument() == name).count();
                    assert!(count <= 1);
                }
            }
        });
    }

    #[test]
    fn non_crossing_ticks_are_idempotent(dir in arb_direction(), offset in -4.9..9.9_f64, repeats in 1..10usize) {
        let rt = runtime();
        rt.block_on(async {
            let cache = SignalCache::new(CacheConfig::default(), spawn_statistics(100));
            let sign = dir.sign();
            cache.submit(signal("BTCUSDT", dir, 100.0, 100.0 - sign * 5.0, 100.0 + sign * 10.0)).await.unwrap();
            let price = 100.0 + sign * offset;

            let first = cache.observe("BTCUSDT", price, Utc::now()).await.unwrap();
            assert!(first.is_none());
            let before = cache.snapshot("BTCUSDT").await.unwrap().unwrap();
            for _ in 0..repeats {
                assert!(cache.observe("BTCUSDT", price, Utc::now()).await.unwrap().is_none());
            }
            let after = cache.snapshot("BTCUSDT").await.unwrap().unwrap();
            assert_eq!(before.signal, after.signal);
            assert_eq!(before.last_price, after.last_price);
        });
    }

    #[test]
    fn each_signal_completes_once(dir in arb_direction(), prices in prop::collection::vec(80.0..120.0_f64, 1..30)) {
        let rt = runtime();
        rt.block_on(async {
            let cache = SignalCache::new(CacheConfig::default(), spawn_statistics(100));
            let sign = dir.sign();
            cache.submit(signal("BTCUSDT", dir, 100.0, 100.0 - sign * 5.0, 100.0 + sign * 10.0)).await.unwrap();

            let mut completions = 0;
            for price in prices {
                if cache.observe("BTCUSDT", price, Utc::now()).await.unwrap().is_some() {
                    completions += 1;
                }
            }
            match cache.stats().query(None).await.unwrap() {
                StatisticsReport::Global(g) => assert_eq!(g.total_signals, completions),
                other => panic!("unexpected report {:?}", other),
            }
        });
    }
}

// ── 7. Concurrent access ─────────────────────────────────────────────

fn shared_cache() -> Arc<SignalCache> {
    Arc::new(SignalCache::new(CacheConfig::default(), spawn_statistics(100)))
}

async fn global_counts(cache: &SignalCache) -> (u32, u32) {
    match cache.stats().query(None).await.unwrap() {
        StatisticsReport::Global(g) => (g.total_signals, g.abandoned),
        other => panic!("unexpected report {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_keep_one_active() {
    let cache = shared_cache();
    let barrier = Arc::new(Barrier::new(16));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let cache = cache.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                if i % 2 == 0 {
                    Some(cache.submit(signal("BTCUSDT", Direction::Long, 100.0, 98.0, 106.0)).await)
                } else {
                    cache.observe("BTCUSDT", 100.0 + i as f64 * 0.1, Utc::now()).await.unwrap();
                    None
                }
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Some(Ok(())) => accepted += 1,
            Some(Err(EngineError::InvariantViolation { .. })) | None => {}
            Some(Err(e)) => panic!("unexpected error {}", e),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(cache.snapshots().await.len(), 1);
    assert_eq!(cache.active_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_crossings_complete_once() {
    let cache = shared_cache();
    let s = signal("BTCUSDT", Direction::Long, 100.0, 98.0, 106.0);
    let id = s.id();
    cache.submit(s).await.unwrap();
    let barrier = Arc::new(Barrier::new(16));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let cache = cache.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                // Half cross the target, half the stop
                let price = if i % 2 == 0 { 106.5 } else { 97.5 };
                cache.observe("BTCUSDT", price, Utc::now()).await.unwrap()
            })
        })
        .collect();

    let mut records = Vec::new();
    for task in tasks {
        if let Some(record) = task.await.unwrap() {
            records.push(record);
        }
    }

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].signal_id, id);
    assert!(cache.snapshot("BTCUSDT").await.unwrap().is_none());
    assert_eq!(global_counts(&cache).await, (1, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn eviction_racing_completion_counts_once() {
    for _ in 0..20 {
        let cache = shared_cache();
        let s = signal("BTCUSDT", Direction::Long, 100.0, 98.0, 106.0);
        let id = s.id();
        cache.submit(s).await.unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let evicting = {
            let cache = cache.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                cache.evict("BTCUSDT", id).await.unwrap()
            })
        };
        let observing = {
            let cache = cache.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                cache.observe("BTCUSDT", 106.5, Utc::now()).await.unwrap()
            })
        };

        let evicted = evicting.await.unwrap();
        let completed = observing.await.unwrap();

        // Exactly one of the two wins, and statistics see exactly that one
        assert!(evicted.is_some() != completed.is_some());
        let (total, abandoned) = global_counts(&cache).await;
        assert_eq!(total + abandoned, 1);
        assert_eq!(total == 1, completed.is_some());
        assert!(cache.snapshots().await.is_empty());
        assert_eq!(cache.active_count().await, 0);
    }
}

// ── Worked examples ──────────────────────────────────────────────────

#[test]
fn worked_example_fusion() {
    let a = Candidate {
        instrument: "BTCUSDT".to_string(),
        direction: Direction::Long,
        levels: TradeLevels::new(100.0, 98.0, 106.0),
        score: 7.0,
        rationale: Vec::new(),
        strategy: Source::BreakoutRetest,
        key_level: 99.5,
    };
    let b = Candidate {
        levels: TradeLevels::new(100.4, 97.5, 108.0),
        score: 6.5,
        strategy: Source::LiquiditySweep,
        key_level: 99.6,
        ..a.clone()
    };

    let signal = Combiner::default().evaluate(&[a, b], Utc::now()).unwrap();
    assert!((signal.entry() - 100.2).abs() < 1e-9);
    assert_eq!(signal.stop(), 97.5);
    assert_eq!(signal.target(), 106.0);
    assert!((signal.reward_risk() - 2.15).abs() < 0.01);
}

#[test]
fn worked_example_ticks_to_loss() {
    runtime().block_on(async {
        let cache = SignalCache::new(CacheConfig::default(), spawn_statistics(100));
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let s = Signal::new(
            "BTCUSDT",
            Direction::Long,
            TradeLevels::new(100.0, 98.0, 106.0),
            8.0,
            "BREAKOUT_RETEST".to_string(),
            Vec::new(),
            created,
        );
        cache.submit(s).await.unwrap();

        assert!(cache.observe("BTCUSDT", 101.0, created + Duration::minutes(15)).await.unwrap().is_none());
        assert!(cache.observe("BTCUSDT", 103.0, created + Duration::minutes(30)).await.unwrap().is_none());
        let record = cache
            .observe("BTCUSDT", 97.9, created + Duration::minutes(45))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.result, TradeResult::Loss);
        assert_eq!(record.exit_price, 97.9);
        assert_eq!(record.duration_secs, 45 * 60);
        assert!(cache.snapshot("BTCUSDT").await.unwrap().is_none());
        assert!(cache.snapshots().await.is_empty());
    });
}

#[test]
fn worked_example_opposite_directions() {
    let long = candidate(Source::BreakoutRetest, Direction::Long, 100.0, 2.0, 6.0, 9.0, 99.0);
    let short = candidate(Source::LiquiditySweep, Direction::Short, 100.0, 2.0, 6.0, 9.0, 101.0);
    assert!(Combiner::default().combine(&[long, short], Utc::now()).is_none());
}
