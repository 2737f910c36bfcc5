// Adaptation engine scenarios: cooldown gating, priority resolution, and
// manual activation, all driven by a manual clock and a steerable probe.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use textlab::adaptation::{
    AdaptationCondition, AdaptationStrategy, DynamicAdaptationEngine, MetricsProbe, Operator,
};
use textlab::clock::ManualClock;

#[derive(Default)]
struct SteerableProbe {
    latency_ms: AtomicU32,
    errors: AtomicU32,
}

impl SteerableProbe {
    fn set_latency(&self, ms: u32) {
        self.latency_ms.store(ms, Ordering::SeqCst);
    }
    fn set_errors(&self, count: u32) {
        self.errors.store(count, Ordering::SeqCst);
    }
}

impl MetricsProbe for SteerableProbe {
    fn latency_ms(&self) -> f64 {
        self.latency_ms.load(Ordering::SeqCst) as f64
    }
    fn throughput_ops(&self) -> f64 {
        30.0
    }
    fn memory_bytes(&self) -> i64 {
        512 * 1024 * 1024
    }
    fn cpu_percent(&self) -> f64 {
        35.0
    }
    fn error_count(&self) -> u32 {
        self.errors.load(Ordering::SeqCst)
    }
    fn cache_hit_rate(&self) -> f64 {
        0.8
    }
    fn active_actions(&self) -> u32 {
        2
    }
}

fn engine() -> (Arc<DynamicAdaptationEngine>, ManualClock, Arc<SteerableProbe>) {
    let clock = ManualClock::new(0);
    let probe = Arc::new(SteerableProbe::default());
    let engine = Arc::new(DynamicAdaptationEngine::new(
        Arc::new(clock.clone()),
        probe.clone(),
    ));
    (engine, clock, probe)
}

fn latency_strategy(name: &str, cooldown_ms: i64, priority: u32) -> AdaptationStrategy {
    AdaptationStrategy {
        name: name.to_string(),
        description: format!("{name} test strategy"),
        priority,
        cooldown_ms,
        conditions: vec![AdaptationCondition {
            metric: "avg_latency".to_string(),
            operator: Operator::Gt,
            threshold: 400.0,
            required_duration_ms: 0,
        }],
        actions: vec![],
    }
}

#[test]
fn cooldowns_gate_repeated_activation() {
    let (engine, clock, probe) = engine();
    engine.register_strategy(latency_strategy("hot_path", 60_000, 0));

    probe.set_latency(600);
    engine.collect_metrics();

    // t=0: the strategy fires.
    assert_eq!(
        engine.evaluate_adaptation_needs(),
        Some("hot_path".to_string())
    );
    assert_eq!(engine.active_strategy(), "hot_path");

    // t=30s: condition still true, but the global 2-minute cooldown
    // blocks any activation.
    clock.set_ms(30_000);
    engine.collect_metrics();
    assert_eq!(engine.evaluate_adaptation_needs(), None);

    // t=150s: both the 60s strategy cooldown and the global cooldown
    // have elapsed; the strategy fires again.
    clock.set_ms(150_000);
    engine.collect_metrics();
    assert_eq!(
        engine.evaluate_adaptation_needs(),
        Some("hot_path".to_string())
    );

    let metrics = engine.strategy_metrics("hot_path").unwrap();
    assert_eq!(metrics.activation_count, 2);
    assert_eq!(metrics.success_count, 2);
    assert_eq!(metrics.failure_count, 0);

    let history = engine.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| e.trigger == "automatic"));
    // At least strategy.cooldown elapsed between the two activations.
    assert!(history[1].timestamp_ms - history[0].timestamp_ms >= 60_000);
}

#[test]
fn per_strategy_cooldown_still_applies_after_global() {
    let (engine, clock, probe) = engine();
    // Strategy cooldown longer than the global one. Latency sits between
    // this strategy's 400ms threshold and the built-in 500ms one, so only
    // the registered strategy is ever eligible.
    engine.register_strategy(latency_strategy("slow_cooldown", 600_000, 0));

    probe.set_latency(450);
    engine.collect_metrics();
    assert!(engine.evaluate_adaptation_needs().is_some());

    // Global cooldown (120s) elapsed, strategy cooldown (600s) not.
    clock.set_ms(200_000);
    engine.collect_metrics();
    assert_eq!(engine.evaluate_adaptation_needs(), None);

    clock.set_ms(700_000);
    engine.collect_metrics();
    assert!(engine.evaluate_adaptation_needs().is_some());
}

#[test]
fn conditions_must_all_hold() {
    let (engine, _clock, probe) = engine();
    engine.register_strategy(AdaptationStrategy {
        name: "latency_and_errors".to_string(),
        description: "both conditions".to_string(),
        priority: 0,
        cooldown_ms: 0,
        conditions: vec![
            AdaptationCondition {
                metric: "avg_latency".to_string(),
                operator: Operator::Gt,
                threshold: 400.0,
                required_duration_ms: 0,
            },
            AdaptationCondition {
                metric: "error_rate".to_string(),
                operator: Operator::Gt,
                threshold: 50.0,
                required_duration_ms: 0,
            },
        ],
        actions: vec![],
    });

    // Latency alone is not enough (and stays under the built-in
    // high_latency threshold of 500ms).
    probe.set_latency(450);
    engine.collect_metrics();
    assert_eq!(engine.evaluate_adaptation_needs(), None);

    // Two errors over two samples: error_rate = 2 / 2 * 100 = 100.
    probe.set_errors(2);
    engine.collect_metrics();
    assert!(engine.metric_value("error_rate") > 50.0);
    assert_eq!(
        engine.evaluate_adaptation_needs(),
        Some("latency_and_errors".to_string())
    );
}

#[test]
fn highest_priority_strategy_wins_ties_by_name() {
    let (engine, _clock, probe) = engine();
    engine.register_strategy(latency_strategy("b_second", 0, 1));
    engine.register_strategy(latency_strategy("a_first", 0, 1));
    engine.register_strategy(latency_strategy("z_low_priority", 0, 9));

    probe.set_latency(800);
    engine.collect_metrics();
    assert_eq!(
        engine.evaluate_adaptation_needs(),
        Some("a_first".to_string())
    );
}

#[test]
fn manual_activation_bypasses_conditions() {
    let (engine, _clock, probe) = engine();
    // Latency is fine; high_latency conditions do not hold.
    probe.set_latency(50);
    engine.collect_metrics();
    assert_eq!(engine.evaluate_adaptation_needs(), None);

    assert!(engine.activate("high_latency", "operator drill"));
    assert_eq!(engine.active_strategy(), "high_latency");

    let history = engine.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].trigger, "manual");
    assert_eq!(history[0].reason, "operator drill");
}

#[test]
fn status_snapshot_is_serializable() {
    let (engine, _clock, probe) = engine();
    probe.set_latency(100);
    engine.collect_metrics();
    engine.activate("high_memory", "test");

    let status = engine.status();
    assert_eq!(status["active_strategy"], "high_memory");
    assert!(status["adaptation_history"].is_array());
    assert!(serde_json::to_string(&status).is_ok());
}
