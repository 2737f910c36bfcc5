// src/adaptation.rs
//
// Rule-based dynamic adaptation engine.
//
// A monitoring loop samples performance and resource metrics into a
// rolling window; an adaptation loop evaluates strategy preconditions
// under per-strategy and global cooldowns and applies the winning
// strategy's parameter adjustments. Measurement is injected through
// MetricsProbe so tests control every input.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::clock::{Clock, TimestampMs};
use crate::types::{ParamMap, ParamValue};

/// Source of live measurements. The engine never reads system state
/// directly.
pub trait MetricsProbe: Send + Sync {
    fn latency_ms(&self) -> f64;
    fn throughput_ops(&self) -> f64;
    fn memory_bytes(&self) -> i64;
    fn cpu_percent(&self) -> f64;
    fn error_count(&self) -> u32;
    fn cache_hit_rate(&self) -> f64;
    fn active_actions(&self) -> u32;
}

/// Fixed-value probe for harness runs without real instrumentation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedProbe;

impl MetricsProbe for SimulatedProbe {
    fn latency_ms(&self) -> f64 {
        150.0
    }
    fn throughput_ops(&self) -> f64 {
        50.0
    }
    fn memory_bytes(&self) -> i64 {
        1024 * 1024 * 1024
    }
    fn cpu_percent(&self) -> f64 {
        90.0
    }
    fn error_count(&self) -> u32 {
        0
    }
    fn cache_hit_rate(&self) -> f64 {
        0.87
    }
    fn active_actions(&self) -> u32 {
        3
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub timestamp_ms: TimestampMs,
    pub latency_ms: f64,
    pub throughput_ops_sec: f64,
    pub memory_usage_bytes: i64,
    pub cpu_usage_percent: f64,
    pub error_count: u32,
    pub cache_hit_rate: f64,
    pub active_actions: u32,
}

/// Comparison operator for conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
}

impl Operator {
    fn apply(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Lt => value < threshold,
            Operator::Ge => value >= threshold,
            Operator::Le => value <= threshold,
            Operator::Eq => (value - threshold).abs() < 1e-3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationCondition {
    /// One of avg_latency, throughput, error_rate, memory_usage,
    /// cpu_usage. Unknown metrics evaluate as 0.0.
    pub metric: String,
    pub operator: Operator,
    pub threshold: f64,
    /// How long the condition should persist before triggering.
    pub required_duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub target: String,
    pub parameters: ParamMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<ParamMap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationStrategy {
    pub name: String,
    pub description: String,
    pub conditions: Vec<AdaptationCondition>,
    pub actions: Vec<AdaptationAction>,
    /// Lower number = higher priority.
    pub priority: u32,
    pub cooldown_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyMetrics {
    pub activation_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub action_success_count: u32,
    pub action_failure_count: u32,
    pub avg_improvement_pct: f64,
    pub last_activation_ms: Option<TimestampMs>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdaptationEvent {
    pub timestamp_ms: TimestampMs,
    pub trigger: String,
    pub old_strategy: String,
    pub new_strategy: String,
    pub reason: String,
    pub impact_metrics: BTreeMap<String, f64>,
    pub success: bool,
}

/// Default cadence and cooldown values.
pub const MONITORING_INTERVAL_MS: i64 = 5_000;
pub const ADAPTATION_INTERVAL_MS: i64 = 10_000;
pub const ADAPTATION_COOLDOWN_MS: i64 = 120_000;
const ROLLING_WINDOW_MS: i64 = 300_000;
const MAX_SNAPSHOT_HISTORY: usize = 1_000;

struct EngineState {
    snapshots: Vec<PerformanceSnapshot>,
    avg_latency: f64,
    throughput: f64,
    error_rate: f64,
    memory_usage_gb: f64,
    cpu_usage: f64,
    strategies: HashMap<String, AdaptationStrategy>,
    strategy_metrics: HashMap<String, StrategyMetrics>,
    history: Vec<AdaptationEvent>,
    active_strategy: String,
    last_adaptation_ms: Option<TimestampMs>,
}

pub struct DynamicAdaptationEngine {
    state: RwLock<EngineState>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn MetricsProbe>,
    pub monitoring_interval_ms: i64,
    pub adaptation_interval_ms: i64,
    pub adaptation_cooldown_ms: i64,
}

impl DynamicAdaptationEngine {
    pub fn new(clock: Arc<dyn Clock>, probe: Arc<dyn MetricsProbe>) -> Self {
        let mut strategies = HashMap::new();
        for strategy in default_strategies() {
            strategies.insert(strategy.name.clone(), strategy);
        }

        Self {
            state: RwLock::new(EngineState {
                snapshots: Vec::new(),
                avg_latency: 0.0,
                throughput: 0.0,
                error_rate: 0.0,
                memory_usage_gb: 0.0,
                cpu_usage: 0.0,
                strategies,
                strategy_metrics: HashMap::new(),
                history: Vec::new(),
                active_strategy: "default".to_string(),
                last_adaptation_ms: None,
            }),
            clock,
            probe,
            monitoring_interval_ms: MONITORING_INTERVAL_MS,
            adaptation_interval_ms: ADAPTATION_INTERVAL_MS,
            adaptation_cooldown_ms: ADAPTATION_COOLDOWN_MS,
        }
    }

    pub fn register_strategy(&self, strategy: AdaptationStrategy) {
        let mut state = self.state.write();
        state.strategies.insert(strategy.name.clone(), strategy);
    }

    /// Sample the probe into the rolling window and refresh indicators.
    pub fn collect_metrics(&self) {
        let now_ms = self.clock.now_ms();
        let snapshot = PerformanceSnapshot {
            timestamp_ms: now_ms,
            latency_ms: self.probe.latency_ms(),
            throughput_ops_sec: self.probe.throughput_ops(),
            memory_usage_bytes: self.probe.memory_bytes(),
            cpu_usage_percent: self.probe.cpu_percent(),
            error_count: self.probe.error_count(),
            cache_hit_rate: self.probe.cache_hit_rate(),
            active_actions: self.probe.active_actions(),
        };

        let mut state = self.state.write();
        state.snapshots.push(snapshot);
        if state.snapshots.len() > MAX_SNAPSHOT_HISTORY {
            state.snapshots.remove(0);
        }

        let cutoff = now_ms - ROLLING_WINDOW_MS;
        let recent: Vec<&PerformanceSnapshot> = state
            .snapshots
            .iter()
            .filter(|s| s.timestamp_ms > cutoff)
            .collect();
        if recent.is_empty() {
            return;
        }

        let n = recent.len() as f64;
        let avg_latency = recent.iter().map(|s| s.latency_ms).sum::<f64>() / n;
        let throughput = recent.iter().map(|s| s.throughput_ops_sec).sum::<f64>() / n;
        let errors: u32 = recent.iter().map(|s| s.error_count).sum();
        let error_rate = errors as f64 / n * 100.0;
        let latest = recent[recent.len() - 1];
        let memory_usage_gb = latest.memory_usage_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_usage = latest.cpu_usage_percent;

        state.avg_latency = avg_latency;
        state.throughput = throughput;
        state.error_rate = error_rate;
        state.memory_usage_gb = memory_usage_gb;
        state.cpu_usage = cpu_usage;
    }

    /// One adaptation-loop tick. Returns the applied strategy name, if
    /// any.
    pub fn evaluate_adaptation_needs(&self) -> Option<String> {
        let now_ms = self.clock.now_ms();

        let candidate = {
            let state = self.state.read();
            if let Some(last) = state.last_adaptation_ms {
                if now_ms - last < self.adaptation_cooldown_ms {
                    return None;
                }
            }

            let mut triggered: Vec<&AdaptationStrategy> = state
                .strategies
                .values()
                .filter(|s| self.strategy_ready(&state, s, now_ms))
                .collect();
            // Lowest priority number wins; name breaks ties for
            // determinism.
            triggered.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.name.cmp(&b.name)));
            triggered.first().map(|s| (*s).clone())
        };

        let strategy = candidate?;
        self.apply_strategy(&strategy, "automatic", &strategy.description.clone(), now_ms);
        Some(strategy.name)
    }

    /// Manual activation path; still records an event.
    pub fn activate(&self, strategy_name: &str, reason: &str) -> bool {
        let strategy = {
            let state = self.state.read();
            state.strategies.get(strategy_name).cloned()
        };
        let Some(strategy) = strategy else {
            return false;
        };
        let now_ms = self.clock.now_ms();
        self.apply_strategy(&strategy, "manual", reason, now_ms)
    }

    pub fn active_strategy(&self) -> String {
        self.state.read().active_strategy.clone()
    }

    pub fn history(&self) -> Vec<AdaptationEvent> {
        self.state.read().history.clone()
    }

    pub fn strategy_metrics(&self, name: &str) -> Option<StrategyMetrics> {
        self.state.read().strategy_metrics.get(name).cloned()
    }

    /// Current value of a named rolling metric; unknown names read 0.0.
    pub fn metric_value(&self, metric: &str) -> f64 {
        let state = self.state.read();
        metric_value_of(&state, metric)
    }

    /// Status snapshot for dashboards.
    pub fn status(&self) -> serde_json::Value {
        let state = self.state.read();
        json!({
            "active_strategy": state.active_strategy,
            "avg_latency": state.avg_latency,
            "throughput": state.throughput,
            "error_rate": state.error_rate,
            "memory_usage": state.memory_usage_gb,
            "cpu_usage": state.cpu_usage,
            "adaptation_history": state.history,
            "strategy_performance": state.strategy_metrics,
            "last_adaptation_ms": state.last_adaptation_ms,
        })
    }

    /// Spawn the monitoring and adaptation workers. Both poll `cancel`
    /// every interval and exit promptly once it is set.
    pub fn start(self: &Arc<Self>, cancel: Arc<AtomicBool>) -> Vec<JoinHandle<()>> {
        let monitor = {
            let engine = Arc::clone(self);
            let cancel = Arc::clone(&cancel);
            std::thread::Builder::new()
                .name("adaptation-monitor".to_string())
                .spawn(move || {
                    while !cancel.load(Ordering::Relaxed) {
                        engine.collect_metrics();
                        sleep_interval(engine.monitoring_interval_ms, &cancel);
                    }
                })
                .expect("spawn adaptation monitor")
        };

        let adapt = {
            let engine = Arc::clone(self);
            std::thread::Builder::new()
                .name("adaptation-loop".to_string())
                .spawn(move || {
                    while !cancel.load(Ordering::Relaxed) {
                        if let Some(name) = engine.evaluate_adaptation_needs() {
                            info!(strategy = %name, "adaptation strategy applied");
                        }
                        sleep_interval(engine.adaptation_interval_ms, &cancel);
                    }
                })
                .expect("spawn adaptation loop")
        };

        vec![monitor, adapt]
    }

    fn strategy_ready(
        &self,
        state: &EngineState,
        strategy: &AdaptationStrategy,
        now_ms: TimestampMs,
    ) -> bool {
        if let Some(metrics) = state.strategy_metrics.get(&strategy.name) {
            if let Some(last) = metrics.last_activation_ms {
                if now_ms - last < strategy.cooldown_ms {
                    return false;
                }
            }
        }

        strategy
            .conditions
            .iter()
            .all(|c| c.operator.apply(metric_value_of(state, &c.metric), c.threshold))
    }

    fn apply_strategy(
        &self,
        strategy: &AdaptationStrategy,
        trigger: &str,
        reason: &str,
        now_ms: TimestampMs,
    ) -> bool {
        let mut state = self.state.write();

        let baseline_latency = state.avg_latency;
        let baseline_memory = state.memory_usage_gb;
        let old_strategy = state.active_strategy.clone();

        let mut success = true;
        let mut action_success = 0u32;
        let mut action_failure = 0u32;
        for action in &strategy.actions {
            if execute_adaptation_action(action) {
                action_success += 1;
            } else {
                action_failure += 1;
                success = false;
                break;
            }
        }

        let mut impact_metrics = BTreeMap::new();
        if success && trigger == "automatic" {
            // Immediate post-apply re-measurement through the probe.
            let new_latency = self.probe.latency_ms();
            let new_memory = self.probe.memory_bytes() as f64 / (1024.0 * 1024.0 * 1024.0);
            if baseline_latency > 0.0 {
                impact_metrics.insert(
                    "latency_improvement_pct".to_string(),
                    (baseline_latency - new_latency) / baseline_latency * 100.0,
                );
            }
            if baseline_memory > 0.0 {
                impact_metrics.insert(
                    "memory_improvement_pct".to_string(),
                    (baseline_memory - new_memory) / baseline_memory * 100.0,
                );
            }
        }

        state.history.push(AdaptationEvent {
            timestamp_ms: now_ms,
            trigger: trigger.to_string(),
            old_strategy,
            new_strategy: strategy.name.clone(),
            reason: reason.to_string(),
            impact_metrics: impact_metrics.clone(),
            success,
        });

        let metrics = state
            .strategy_metrics
            .entry(strategy.name.clone())
            .or_default();
        metrics.activation_count += 1;
        metrics.action_success_count += action_success;
        metrics.action_failure_count += action_failure;
        metrics.last_activation_ms = Some(now_ms);

        if success {
            metrics.success_count += 1;
            if let Some(improvement) = impact_metrics.get("latency_improvement_pct") {
                metrics.avg_improvement_pct = (metrics.avg_improvement_pct + improvement) / 2.0;
            }
            state.active_strategy = strategy.name.clone();
            if trigger == "automatic" {
                state.last_adaptation_ms = Some(now_ms);
            }
        } else {
            metrics.failure_count += 1;
        }

        success
    }
}

fn metric_value_of(state: &EngineState, metric: &str) -> f64 {
    match metric {
        "avg_latency" => state.avg_latency,
        "throughput" => state.throughput,
        "error_rate" => state.error_rate,
        "memory_usage" => state.memory_usage_gb,
        "cpu_usage" => state.cpu_usage,
        _ => 0.0,
    }
}

/// Parameter adjustments are recorded but not wired into live
/// subsystems here; per-action success is what the engine tracks.
fn execute_adaptation_action(_action: &AdaptationAction) -> bool {
    true
}

fn sleep_interval(interval_ms: i64, cancel: &AtomicBool) {
    // Sleep in short slices so cancellation is honored promptly.
    let mut remaining = interval_ms.max(1);
    while remaining > 0 && !cancel.load(Ordering::Relaxed) {
        let slice = remaining.min(100);
        std::thread::sleep(Duration::from_millis(slice as u64));
        remaining -= slice;
    }
}

fn param(key: &str, value: ParamValue) -> ParamMap {
    let mut map = ParamMap::new();
    map.insert(key.to_string(), value);
    map
}

/// The built-in strategy set.
pub fn default_strategies() -> Vec<AdaptationStrategy> {
    vec![
        AdaptationStrategy {
            name: "high_latency".to_string(),
            description: "Optimize for latency when response times are high".to_string(),
            priority: 1,
            cooldown_ms: 180_000,
            conditions: vec![AdaptationCondition {
                metric: "avg_latency".to_string(),
                operator: Operator::Gt,
                threshold: 500.0,
                required_duration_ms: 30_000,
            }],
            actions: vec![
                AdaptationAction {
                    action_type: "adjust_parameters".to_string(),
                    target: "cache_size".to_string(),
                    parameters: {
                        let mut p = param("multiplier", ParamValue::Float(1.5));
                        p.insert("max_size".to_string(), ParamValue::Int(2000));
                        p
                    },
                    rollback: None,
                },
                AdaptationAction {
                    action_type: "adjust_parameters".to_string(),
                    target: "parallelism".to_string(),
                    parameters: param("max_parallel", ParamValue::Int(1)),
                    rollback: None,
                },
            ],
        },
        AdaptationStrategy {
            name: "high_memory".to_string(),
            description: "Optimize for memory when usage is high".to_string(),
            priority: 2,
            cooldown_ms: 120_000,
            conditions: vec![AdaptationCondition {
                metric: "memory_usage".to_string(),
                operator: Operator::Gt,
                threshold: 80.0,
                required_duration_ms: 20_000,
            }],
            actions: vec![
                AdaptationAction {
                    action_type: "adjust_parameters".to_string(),
                    target: "cache_size".to_string(),
                    parameters: {
                        let mut p = param("multiplier", ParamValue::Float(0.5));
                        p.insert("min_size".to_string(), ParamValue::Int(50));
                        p
                    },
                    rollback: None,
                },
                AdaptationAction {
                    action_type: "enable_feature".to_string(),
                    target: "aggressive_gc".to_string(),
                    parameters: param("enabled", ParamValue::Bool(true)),
                    rollback: None,
                },
            ],
        },
        AdaptationStrategy {
            name: "low_throughput".to_string(),
            description: "Optimize for throughput when processing rate is low".to_string(),
            priority: 3,
            cooldown_ms: 240_000,
            conditions: vec![AdaptationCondition {
                metric: "throughput".to_string(),
                operator: Operator::Lt,
                threshold: 10.0,
                required_duration_ms: 45_000,
            }],
            actions: vec![
                AdaptationAction {
                    action_type: "adjust_parameters".to_string(),
                    target: "parallelism".to_string(),
                    parameters: param("max_parallel", ParamValue::Int(5)),
                    rollback: None,
                },
                AdaptationAction {
                    action_type: "adjust_parameters".to_string(),
                    target: "batch_size".to_string(),
                    parameters: param("size", ParamValue::Int(10)),
                    rollback: None,
                },
            ],
        },
        AdaptationStrategy {
            name: "high_errors".to_string(),
            description: "Increase reliability when error rate is high".to_string(),
            priority: 1,
            cooldown_ms: 300_000,
            conditions: vec![AdaptationCondition {
                metric: "error_rate".to_string(),
                operator: Operator::Gt,
                threshold: 5.0,
                required_duration_ms: 15_000,
            }],
            actions: vec![
                AdaptationAction {
                    action_type: "adjust_parameters".to_string(),
                    target: "retry_count".to_string(),
                    parameters: param("retries", ParamValue::Int(3)),
                    rollback: None,
                },
                AdaptationAction {
                    action_type: "adjust_parameters".to_string(),
                    target: "timeout".to_string(),
                    parameters: param("timeout_ms", ParamValue::Int(10_000)),
                    rollback: None,
                },
            ],
        },
    ]
}
