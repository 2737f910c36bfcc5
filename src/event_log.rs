// src/event_log.rs
//
// Structured event model, the in-memory metrics store, and the
// file-backed event sink.
//
// The sink is single-consumer: producers push through a bounded channel
// that drops new events (with a counter) when full, and a worker thread
// batches events into JSON files under the log directory. The store keeps
// everything indexed in memory for the analyzer; reads copy out snapshots
// so iteration never observes partial writes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::{Clock, TimestampMs};

/// Event discriminant used for indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateObservation,
    ActionSelected,
    RewardCalculated,
    QValueUpdated,
    EpisodeEnd,
}

/// State snapshot captured before each action selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateMetrics {
    pub text_length: usize,
    pub text_complexity: f64,
    pub entity_density: f64,
    pub code_presence: bool,
    pub math_presence: bool,
    pub state_hash: String,
    #[serde(default)]
    pub features: std::collections::BTreeMap<String, f64>,
}

/// What the agent chose, and why.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionMetrics {
    pub function_name: String,
    pub category: String,
    pub compute_cost: i64,
    pub input_size: usize,
    pub q_value: f64,
    pub exploration: bool,
}

/// What the simulator returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetrics {
    pub success: bool,
    pub output_quality: f64,
    pub execution_time: f64,
    pub memory_used: i64,
    #[serde(default)]
    pub error_type: String,
    pub output_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub cumulative_reward: f64,
    #[serde(default)]
    pub average_reward: f64,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub efficiency_score: f64,
    #[serde(default)]
    pub task_completion_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub q_value_convergence: f64,
    #[serde(default)]
    pub exploration_rate: f64,
    #[serde(default)]
    pub policy_stability: f64,
    #[serde(default)]
    pub action_diversity: f64,
    #[serde(default)]
    pub learning_progress: f64,
}

/// Event-type-specific payload. Tagged so JSON carries an explicit
/// `event_type` discriminant rather than an untyped map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    StateObservation(StateMetrics),
    ActionSelected(ActionMetrics),
    RewardCalculated {
        result: ResultMetrics,
        performance: PerformanceMetrics,
    },
    QValueUpdated(LearningMetrics),
    EpisodeEnd {
        total_reward: f64,
        steps: u32,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::StateObservation(_) => EventKind::StateObservation,
            EventPayload::ActionSelected(_) => EventKind::ActionSelected,
            EventPayload::RewardCalculated { .. } => EventKind::RewardCalculated,
            EventPayload::QValueUpdated(_) => EventKind::QValueUpdated,
            EventPayload::EpisodeEnd { .. } => EventKind::EpisodeEnd,
        }
    }
}

/// One normalized log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp_ms: TimestampMs,
    pub session_id: String,
    pub episode_id: String,
    pub step_number: u32,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Per-episode summary persisted alongside the event batches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    pub episode_id: String,
    pub start_time_ms: TimestampMs,
    pub end_time_ms: TimestampMs,
    pub actions: Vec<ActionMetrics>,
    pub rewards: Vec<f64>,
    pub states: Vec<StateMetrics>,
    pub total_reward: f64,
}

#[derive(Default)]
struct StoreInner {
    events: Vec<LogEvent>,
    by_kind: HashMap<EventKind, Vec<usize>>,
    by_episode: HashMap<String, Vec<usize>>,
    episodes: HashMap<String, EpisodeMetrics>,
}

/// In-memory metrics store with per-kind and per-episode indexes.
///
/// Single writer (the sink worker), many readers (analyzer, dashboards).
#[derive(Default)]
pub struct MetricsStore {
    inner: RwLock<StoreInner>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_event(&self, event: LogEvent) {
        let mut inner = self.inner.write();
        let idx = inner.events.len();
        inner.by_kind.entry(event.payload.kind()).or_default().push(idx);
        inner
            .by_episode
            .entry(event.episode_id.clone())
            .or_default()
            .push(idx);
        inner.events.push(event);
    }

    pub fn insert_episode(&self, metrics: EpisodeMetrics) {
        let mut inner = self.inner.write();
        inner.episodes.insert(metrics.episode_id.clone(), metrics);
    }

    /// Snapshot of all events in insertion order.
    pub fn events(&self) -> Vec<LogEvent> {
        self.inner.read().events.clone()
    }

    pub fn events_by_kind(&self, kind: EventKind) -> Vec<LogEvent> {
        let inner = self.inner.read();
        inner
            .by_kind
            .get(&kind)
            .map(|idxs| idxs.iter().map(|&i| inner.events[i].clone()).collect())
            .unwrap_or_default()
    }

    pub fn events_by_episode(&self, episode_id: &str) -> Vec<LogEvent> {
        let inner = self.inner.read();
        inner
            .by_episode
            .get(episode_id)
            .map(|idxs| idxs.iter().map(|&i| inner.events[i].clone()).collect())
            .unwrap_or_default()
    }

    pub fn episodes(&self) -> HashMap<String, EpisodeMetrics> {
        self.inner.read().episodes.clone()
    }

    pub fn event_count(&self) -> usize {
        self.inner.read().events.len()
    }
}

/// Default bound on the producer channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// File-backed event sink with an in-memory store.
pub struct InsightLogger {
    store: Arc<MetricsStore>,
    sender: SyncSender<LogEvent>,
    dropped: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    log_dir: PathBuf,
}

impl InsightLogger {
    /// Create the log directory and start the sink worker.
    pub fn start(
        log_dir: impl Into<PathBuf>,
        batch_size: usize,
        flush_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let log_dir = log_dir.into();
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

        let store = Arc::new(MetricsStore::new());
        let (sender, receiver) = mpsc::sync_channel(EVENT_CHANNEL_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let store = Arc::clone(&store);
            let shutdown = Arc::clone(&shutdown);
            let log_dir = log_dir.clone();
            std::thread::Builder::new()
                .name("event-sink".to_string())
                .spawn(move || {
                    sink_loop(receiver, store, shutdown, log_dir, batch_size, flush_interval, clock)
                })
                .context("failed to spawn event sink worker")?
        };

        Ok(Self {
            store,
            sender,
            dropped,
            shutdown,
            worker: Some(worker),
            log_dir,
        })
    }

    pub fn store(&self) -> Arc<MetricsStore> {
        Arc::clone(&self.store)
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Non-blocking enqueue; drops the event (and counts it) when full.
    pub fn log_event(&self, event: LogEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Events dropped due to sink backpressure. Best-effort counter.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record an episode summary and persist it as episode_<id>.json.
    pub fn log_episode_summary(&self, metrics: &EpisodeMetrics) {
        self.store.insert_episode(metrics.clone());
        let path = self
            .log_dir
            .join(format!("episode_{}.json", metrics.episode_id));
        if let Err(err) = write_json(&path, metrics) {
            warn!(error = %err, "failed to write episode summary");
        }
    }

    /// Persist the latest insight report as insights.json.
    pub fn log_insights<T: Serialize>(&self, insights: &T) {
        let path = self.log_dir.join("insights.json");
        if let Err(err) = write_json(&path, insights) {
            warn!(error = %err, "failed to write insights");
        }
    }

    /// Drain the sink and stop the worker. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for InsightLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sink_loop(
    receiver: Receiver<LogEvent>,
    store: Arc<MetricsStore>,
    shutdown: Arc<AtomicBool>,
    log_dir: PathBuf,
    batch_size: usize,
    flush_interval: Duration,
    clock: Arc<dyn Clock>,
) {
    let mut batch: Vec<LogEvent> = Vec::with_capacity(batch_size.max(1));
    let mut batch_seq: u64 = 0;

    loop {
        match receiver.recv_timeout(flush_interval) {
            Ok(event) => {
                store.insert_event(event.clone());
                batch.push(event);
                if batch.len() >= batch_size.max(1) {
                    flush_batch(&log_dir, &mut batch, &mut batch_seq, clock.as_ref());
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                flush_batch(&log_dir, &mut batch, &mut batch_seq, clock.as_ref());
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if shutdown.load(Ordering::SeqCst) {
            // Drain whatever is already queued, then exit.
            while let Ok(event) = receiver.try_recv() {
                store.insert_event(event.clone());
                batch.push(event);
            }
            break;
        }
    }

    flush_batch(&log_dir, &mut batch, &mut batch_seq, clock.as_ref());
}

fn flush_batch(log_dir: &Path, batch: &mut Vec<LogEvent>, batch_seq: &mut u64, clock: &dyn Clock) {
    if batch.is_empty() {
        return;
    }

    let ts = clock.now_ms() / 1000;
    // Suffix with a sequence number so rapid flushes within one second
    // cannot overwrite each other.
    let path = if *batch_seq == 0 {
        log_dir.join(format!("events_{ts}.json"))
    } else {
        log_dir.join(format!("events_{ts}_{batch_seq}.json"))
    };
    *batch_seq += 1;

    if let Err(err) = write_json(&path, &batch) {
        warn!(error = %err, "failed to flush event batch");
        return;
    }
    batch.clear();
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value)?;
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
