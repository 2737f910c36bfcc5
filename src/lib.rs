//! TextLab core library.
//!
//! An offline experimentation harness that learns optimal usage patterns
//! over a fixed catalog of text-processing operations: which functions to
//! call, in which order, with which parameters.
//!
//! # Architecture
//!
//! - **Trainer** (`agent`, `reward`, `runner`): tabular Q-learning over
//!   simulated episodes, with multi-term task-conditioned reward shaping.
//! - **Simulator** (`catalog`): the fixed operation catalog with
//!   deterministic, seedable execution outcomes.
//! - **Evolutionary search** (`optimizer`): a per-function parameter GA
//!   and an NSGA-II multi-objective optimizer.
//! - **Caching** (`cache`): content-addressed memoization with a learned
//!   eviction score and a predictive should-cache decision.
//! - **Adaptation** (`adaptation`): rule-based runtime strategy engine
//!   over rolling performance metrics.
//! - **Observability** (`event_log`, `analyzer`, `telemetry`): structured
//!   event stream, in-memory indexes, insight reports, and metric pushes.
//!
//! Design principle: no global state. Every component takes its clock,
//! RNG seed, and collaborators explicitly, so runs are reproducible and
//! tests are deterministic.

pub mod adaptation;
pub mod agent;
pub mod analyzer;
pub mod cache;
pub mod catalog;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod event_log;
pub mod optimizer;
pub mod persist;
pub mod report;
pub mod reward;
pub mod runner;
pub mod telemetry;
pub mod training;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use adaptation::{
    AdaptationStrategy, DynamicAdaptationEngine, MetricsProbe, SimulatedProbe,
};
pub use agent::{AgentConfig, QLearningAgent, QTable};
pub use analyzer::{ApiFeedbackReport, InsightAnalyzer};
pub use cache::IntelligentCache;
pub use catalog::ActionSimulator;
pub use clock::{Clock, ManualClock, SystemClock, TimestampMs};
pub use config::SystemConfig;
pub use event_log::{EpisodeMetrics, EventKind, EventPayload, InsightLogger, LogEvent, MetricsStore};
pub use optimizer::{
    Direction, GaConfig, MultiObjectiveOptimizer, NsgaConfig, Objective, ParameterOptimizer,
    Solution,
};
pub use reward::{EnhancedRewardCalculator, RewardCalculator};
pub use runner::{TrainingSummary, TrainingSystem};
pub use telemetry::TelemetryClient;
pub use types::{
    Action, ActionResult, Category, ErrorKind, ParamMap, ParamValue, ParameterRange, State,
    TaskType, TrainingExample,
};
