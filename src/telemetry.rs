// src/telemetry.rs
//
// Batched metrics push client.
//
// Metrics queue into a bounded ring that drops the oldest entry on
// overflow (the drop counter is exposed). A worker thread flushes
// batches to <endpoint>/api/v1/metrics as JSON arrays; with no endpoint
// configured, batches are only counted locally. Non-2xx responses are
// logged and discarded; telemetry never fails the run.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::{Clock, TimestampMs};
use crate::event_log::{LearningMetrics, PerformanceMetrics};

/// Environment variable naming the metrics endpoint.
pub const TELEMETRY_ENDPOINT_ENV: &str = "TELEMETRY_ENDPOINT";

/// Flush batches at most this many metrics at a time.
const MAX_BATCH: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    pub timestamp: TimestampMs,
}

pub struct TelemetryClient {
    endpoint: Option<String>,
    buffer: Arc<Mutex<VecDeque<Metric>>>,
    buffer_size: usize,
    dropped: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    clock: Arc<dyn Clock>,
}

impl TelemetryClient {
    /// Endpoint from TELEMETRY_ENDPOINT; empty means local-only mode.
    pub fn from_env(buffer_size: usize, flush_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let endpoint = std::env::var(TELEMETRY_ENDPOINT_ENV)
            .ok()
            .filter(|e| !e.trim().is_empty());
        Self::new(endpoint, buffer_size, flush_interval, clock)
    }

    pub fn new(
        endpoint: Option<String>,
        buffer_size: usize,
        flush_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let buffer: Arc<Mutex<VecDeque<Metric>>> =
            Arc::new(Mutex::new(VecDeque::with_capacity(buffer_size.max(1))));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let buffer = Arc::clone(&buffer);
            let shutdown = Arc::clone(&shutdown);
            let endpoint = endpoint.clone();
            std::thread::Builder::new()
                .name("telemetry".to_string())
                .spawn(move || {
                    let http = reqwest::blocking::Client::new();
                    loop {
                        std::thread::sleep(flush_interval);
                        flush(&http, endpoint.as_deref(), &buffer);
                        if shutdown.load(Ordering::SeqCst) {
                            flush(&http, endpoint.as_deref(), &buffer);
                            break;
                        }
                    }
                })
                .expect("spawn telemetry worker")
        };

        Self {
            endpoint,
            buffer,
            buffer_size: buffer_size.max(1),
            dropped: Arc::new(AtomicU64::new(0)),
            shutdown,
            worker: Some(worker),
            clock,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Metrics dropped to overflow. Best-effort counter.
    pub fn dropped_metrics(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn send_metric(&self, metric: Metric) {
        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.buffer_size {
            buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(metric);
    }

    pub fn record_function_call(&self, function_name: &str, success: bool, duration_ms: i64) {
        let now = self.clock.now_ms();
        let mut tags = BTreeMap::new();
        tags.insert("function".to_string(), function_name.to_string());
        tags.insert("success".to_string(), success.to_string());
        self.send_metric(Metric {
            name: "textlab.function.call".to_string(),
            value: 1.0,
            tags: tags.clone(),
            timestamp: now,
        });

        tags.remove("success");
        self.send_metric(Metric {
            name: "textlab.function.duration".to_string(),
            value: duration_ms as f64 / 1000.0,
            tags,
            timestamp: now,
        });
    }

    pub fn record_learning_metrics(&self, metrics: &LearningMetrics) {
        let now = self.clock.now_ms();
        for (name, value) in [
            ("rl.q_value.convergence", metrics.q_value_convergence),
            ("rl.exploration.rate", metrics.exploration_rate),
            ("rl.policy.stability", metrics.policy_stability),
            ("rl.action.diversity", metrics.action_diversity),
            ("rl.learning.progress", metrics.learning_progress),
        ] {
            self.send_metric(Metric {
                name: name.to_string(),
                value,
                tags: BTreeMap::new(),
                timestamp: now,
            });
        }
    }

    pub fn record_performance_metrics(&self, metrics: &PerformanceMetrics) {
        let now = self.clock.now_ms();
        for (name, value) in [
            ("rl.performance.cumulative_reward", metrics.cumulative_reward),
            ("rl.performance.average_reward", metrics.average_reward),
            ("rl.performance.success_rate", metrics.success_rate),
            ("rl.performance.efficiency_score", metrics.efficiency_score),
            (
                "rl.performance.task_completion_rate",
                metrics.task_completion_rate,
            ),
        ] {
            self.send_metric(Metric {
                name: name.to_string(),
                value,
                tags: BTreeMap::new(),
                timestamp: now,
            });
        }
    }

    pub fn record_episode_metrics(
        &self,
        episode_id: &str,
        total_reward: f64,
        step_count: u32,
        duration_ms: i64,
    ) {
        let now = self.clock.now_ms();
        let mut tags = BTreeMap::new();
        tags.insert("episode_id".to_string(), episode_id.to_string());
        for (name, value) in [
            ("rl.episode.total_reward", total_reward),
            ("rl.episode.step_count", step_count as f64),
            ("rl.episode.duration", duration_ms as f64 / 1000.0),
        ] {
            self.send_metric(Metric {
                name: name.to_string(),
                value,
                tags: tags.clone(),
                timestamp: now,
            });
        }
    }

    /// Drain outstanding metrics and stop the worker. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn flush(
    http: &reqwest::blocking::Client,
    endpoint: Option<&str>,
    buffer: &Mutex<VecDeque<Metric>>,
) {
    loop {
        let batch: Vec<Metric> = {
            let mut buffer = buffer.lock();
            let take = buffer.len().min(MAX_BATCH);
            buffer.drain(..take).collect()
        };
        if batch.is_empty() {
            return;
        }

        match endpoint {
            None => {
                debug!(count = batch.len(), "telemetry batch (local mode)");
            }
            Some(endpoint) => {
                let url = format!("{}/api/v1/metrics", endpoint.trim_end_matches('/'));
                match http.post(&url).json(&batch).send() {
                    Ok(response) if response.status().is_success() => {}
                    Ok(response) => {
                        warn!(status = %response.status(), "metrics endpoint rejected batch");
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to push metrics batch");
                    }
                }
            }
        }
    }
}
