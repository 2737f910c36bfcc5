// src/runner.rs
//
// The episode runner: drives training episode by episode, feeding the
// agent, simulator, and reward calculator, and emitting the structured
// event stream.
//
// All collaborators are injected; the runner owns the live state during
// an episode and is the only writer into the agent's Q-table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{error, info};

use crate::agent::{state_key, AgentConfig, QLearningAgent};
use crate::analyzer::InsightAnalyzer;
use crate::catalog::ActionSimulator;
use crate::clock::Clock;
use crate::config::SystemConfig;
use crate::event_log::{
    ActionMetrics, EpisodeMetrics, EventPayload, InsightLogger, LearningMetrics, LogEvent,
    PerformanceMetrics, ResultMetrics, StateMetrics,
};
use crate::persist::{save_checkpoint, ModelCheckpoint};
use crate::reward::EnhancedRewardCalculator;
use crate::telemetry::TelemetryClient;
use crate::types::{session_id, Action, ActionResult, State, TrainingExample};

/// Outcome summary returned by `train`.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub session_id: String,
    pub episodes_run: u64,
    pub q_table_states: usize,
    pub dropped_events: u64,
    pub cancelled: bool,
}

pub struct TrainingSystem {
    agent: QLearningAgent,
    simulator: ActionSimulator,
    reward_calc: EnhancedRewardCalculator,
    catalog: Vec<Action>,
    training_data: Vec<TrainingExample>,
    config: SystemConfig,
    clock: Arc<dyn Clock>,
    rng: ChaCha8Rng,
}

impl TrainingSystem {
    pub fn new(config: SystemConfig, seed: u64, clock: Arc<dyn Clock>) -> Self {
        let simulator = ActionSimulator::new(seed.wrapping_add(1));
        let catalog = simulator.available_actions();
        Self {
            agent: QLearningAgent::new(AgentConfig::default(), seed),
            simulator,
            reward_calc: EnhancedRewardCalculator::default(),
            catalog,
            training_data: crate::training::builtin_training_data(),
            config,
            clock,
            rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(2)),
        }
    }

    pub fn load_training_data(&mut self, data: Vec<TrainingExample>) {
        if !data.is_empty() {
            self.training_data = data;
        }
    }

    pub fn agent(&self) -> &QLearningAgent {
        &self.agent
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Build a persistable snapshot of the current model.
    pub fn checkpoint(&self) -> ModelCheckpoint {
        ModelCheckpoint::new(
            self.agent.q_table().clone(),
            self.config.clone(),
            self.clock.now_ms(),
        )
    }

    /// Run the configured number of episodes.
    ///
    /// Cancellation is honored between episodes and between steps;
    /// progress up to the last checkpoint is preserved either way.
    pub fn train(
        &mut self,
        logger: &InsightLogger,
        telemetry: Option<&TelemetryClient>,
        cancel: &AtomicBool,
    ) -> Result<TrainingSummary> {
        let session = session_id(self.clock.now_ms());
        info!(session = %session, episodes = self.config.max_episodes, "training started");

        let mut episodes_run = 0u64;
        let mut cancelled = false;

        for episode in 0..self.config.max_episodes {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let episode_id = format!("{session}-ep{episode}");
            let metrics = self.run_episode(&session, &episode_id, logger, telemetry, cancel);
            logger.log_episode_summary(&metrics);

            if let Some(telemetry) = telemetry {
                telemetry.record_episode_metrics(
                    &episode_id,
                    metrics.total_reward,
                    metrics.actions.len() as u32,
                    metrics.end_time_ms - metrics.start_time_ms,
                );
            }

            episodes_run += 1;

            if episode % self.config.checkpoint_interval == 0 {
                let path = save_checkpoint(
                    std::path::Path::new(&self.config.checkpoint_dir),
                    &self.checkpoint(),
                    episode,
                )?;
                info!(episode, path = %path.display(), "checkpointed model");
            }

            if episode % self.config.logging_interval == 0 {
                let analyzer = InsightAnalyzer::new(
                    logger.store(),
                    self.config.max_episodes,
                    Arc::clone(&self.clock),
                );
                logger.log_insights(&analyzer.generate_insights());
            }
        }

        info!(episodes_run, cancelled, "training finished");
        Ok(TrainingSummary {
            session_id: session,
            episodes_run,
            q_table_states: self.agent.q_table().len(),
            dropped_events: logger.dropped_events(),
            cancelled,
        })
    }

    fn run_episode(
        &mut self,
        session: &str,
        episode_id: &str,
        logger: &InsightLogger,
        telemetry: Option<&TelemetryClient>,
        cancel: &AtomicBool,
    ) -> EpisodeMetrics {
        let example = self.select_training_example().clone();
        let mut state = State::with_budget(&example, self.config.initial_budget);

        let mut metrics = EpisodeMetrics {
            episode_id: episode_id.to_string(),
            start_time_ms: self.clock.now_ms(),
            ..EpisodeMetrics::default()
        };

        for step in 0..self.config.max_steps_per_episode {
            if cancel.load(Ordering::Relaxed) {
                break;
            }

            // A negative budget on entry means a transition accounting
            // bug; abort this episode only.
            if state.remaining_budget < 0 {
                error!(
                    episode = episode_id,
                    step,
                    budget = state.remaining_budget,
                    "invariant violation: negative budget on step entry"
                );
                self.emit(
                    logger,
                    session,
                    episode_id,
                    step,
                    EventPayload::EpisodeEnd {
                        total_reward: metrics.rewards.iter().sum(),
                        steps: state.step_count,
                    },
                );
                break;
            }

            let state_metrics = extract_state_metrics(&state);
            self.emit(
                logger,
                session,
                episode_id,
                step,
                EventPayload::StateObservation(state_metrics.clone()),
            );

            let Some((action, action_metrics)) = self
                .agent
                .select_action_with_metrics(&state, &self.catalog)
            else {
                break;
            };
            self.emit(
                logger,
                session,
                episode_id,
                step,
                EventPayload::ActionSelected(action_metrics.clone()),
            );

            let result = self
                .simulator
                .execute(&action, &state.text, &action.parameters);
            let reward = self
                .reward_calc
                .calculate(&state, &action, &result, &example);

            self.emit(
                logger,
                session,
                episode_id,
                step,
                EventPayload::RewardCalculated {
                    result: extract_result_metrics(&result),
                    performance: PerformanceMetrics {
                        cumulative_reward: reward,
                        ..PerformanceMetrics::default()
                    },
                },
            );

            if let Some(telemetry) = telemetry {
                telemetry.record_function_call(
                    &action.function_name,
                    result.success,
                    result.duration_ms,
                );
            }

            let next_state = state.update(&action, &result);

            let old_q = self.agent.get_q(&state, &action);
            self.agent
                .update_q(&state, &action, reward, &next_state, &self.catalog);
            let new_q = self.agent.get_q(&state, &action);

            self.emit(
                logger,
                session,
                episode_id,
                step,
                EventPayload::QValueUpdated(LearningMetrics {
                    q_value_convergence: (new_q - old_q).abs(),
                    exploration_rate: self.agent.exploration_rate(),
                    ..LearningMetrics::default()
                }),
            );

            metrics.actions.push(action_metrics);
            metrics.rewards.push(reward);
            metrics.states.push(state_metrics);

            if next_state.is_terminal(self.config.max_steps_per_episode) {
                state = next_state;
                break;
            }
            state = next_state;
        }

        metrics.end_time_ms = self.clock.now_ms();
        metrics.total_reward = metrics.rewards.iter().sum();

        self.emit(
            logger,
            session,
            episode_id,
            state.step_count,
            EventPayload::EpisodeEnd {
                total_reward: metrics.total_reward,
                steps: state.step_count,
            },
        );

        metrics
    }

    /// Uniform-random selection from the pool, via the runner's seeded
    /// RNG.
    fn select_training_example(&mut self) -> &TrainingExample {
        let idx = self.rng.gen_range(0..self.training_data.len());
        &self.training_data[idx]
    }

    fn emit(
        &self,
        logger: &InsightLogger,
        session: &str,
        episode_id: &str,
        step: u32,
        payload: EventPayload,
    ) {
        logger.log_event(LogEvent {
            timestamp_ms: self.clock.now_ms(),
            session_id: session.to_string(),
            episode_id: episode_id.to_string(),
            step_number: step,
            payload,
        });
    }
}

fn extract_state_metrics(state: &State) -> StateMetrics {
    let mut features = std::collections::BTreeMap::new();
    features.insert("steps_taken".to_string(), state.step_count as f64);
    features.insert(
        "remaining_budget".to_string(),
        state.remaining_budget as f64,
    );
    features.insert("actions_used".to_string(), state.actions_used.len() as f64);

    StateMetrics {
        text_length: state.text.len(),
        text_complexity: (state.text.len() as f64 / 1000.0).min(1.0),
        entity_density: 0.1,
        code_presence: looks_like_code(&state.text),
        math_presence: false,
        state_hash: state_key(state),
        features,
    }
}

fn looks_like_code(text: &str) -> bool {
    const HINTS: [&str; 4] = ["def ", "fn ", "import ", "function "];
    HINTS.iter().any(|h| text.contains(h))
}

fn extract_result_metrics(result: &ActionResult) -> ResultMetrics {
    let output_size = result
        .output
        .as_ref()
        .and_then(|o| serde_json::to_vec(o).ok())
        .map(|b| b.len())
        .unwrap_or(0);

    ResultMetrics {
        success: result.success,
        output_quality: if result.output.is_some() { 0.8 } else { 0.0 },
        execution_time: result.duration_ms as f64 / 1000.0,
        memory_used: result.memory_used,
        error_type: result.error.clone(),
        output_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event_log::EventKind;
    use std::time::Duration;

    fn quick_config(dir: &std::path::Path) -> SystemConfig {
        SystemConfig {
            max_episodes: 3,
            max_steps_per_episode: 3,
            logging_interval: 100,
            checkpoint_interval: 2,
            initial_budget: 10,
            log_dir: dir.join("logs").to_string_lossy().into_owned(),
            checkpoint_dir: dir.join("models").to_string_lossy().into_owned(),
            ..SystemConfig::default()
        }
    }

    fn run_quick_training(dir: &std::path::Path) -> (TrainingSummary, Arc<crate::event_log::MetricsStore>) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = quick_config(dir);
        let mut logger = InsightLogger::start(
            &config.log_dir,
            64,
            Duration::from_millis(20),
            Arc::clone(&clock),
        )
        .unwrap();

        let mut system = TrainingSystem::new(config, 42, clock);
        let cancel = AtomicBool::new(false);
        let summary = system.train(&logger, None, &cancel).unwrap();
        logger.stop();
        (summary, logger.store())
    }

    #[test]
    fn training_runs_all_episodes_and_learns() {
        let dir = tempfile::tempdir().unwrap();
        let (summary, store) = run_quick_training(dir.path());

        assert_eq!(summary.episodes_run, 3);
        assert!(!summary.cancelled);
        assert!(summary.q_table_states > 0);
        assert_eq!(store.episodes().len(), 3);
    }

    #[test]
    fn every_step_emits_the_four_core_events() {
        let dir = tempfile::tempdir().unwrap();
        let (_, store) = run_quick_training(dir.path());

        let observations = store.events_by_kind(EventKind::StateObservation).len();
        let selections = store.events_by_kind(EventKind::ActionSelected).len();
        let rewards = store.events_by_kind(EventKind::RewardCalculated).len();
        let updates = store.events_by_kind(EventKind::QValueUpdated).len();

        assert!(selections > 0);
        assert_eq!(observations, selections);
        assert_eq!(selections, rewards);
        assert_eq!(rewards, updates);
        assert_eq!(store.events_by_kind(EventKind::EpisodeEnd).len(), 3);
    }

    #[test]
    fn per_episode_events_are_step_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let (summary, store) = run_quick_training(dir.path());

        for episode in 0..summary.episodes_run {
            let id = format!("{}-ep{}", summary.session_id, episode);
            let steps: Vec<u32> = store
                .events_by_episode(&id)
                .iter()
                .map(|e| e.step_number)
                .collect();
            let mut sorted = steps.clone();
            sorted.sort();
            assert_eq!(steps, sorted);
        }
    }

    #[test]
    fn cancellation_stops_before_more_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        let config = quick_config(dir.path());
        let mut logger = InsightLogger::start(
            &config.log_dir,
            64,
            Duration::from_millis(20),
            Arc::clone(&clock),
        )
        .unwrap();

        let mut system = TrainingSystem::new(config, 1, clock);
        let cancel = AtomicBool::new(true);
        let summary = system.train(&logger, None, &cancel).unwrap();
        logger.stop();

        assert!(summary.cancelled);
        assert_eq!(summary.episodes_run, 0);
    }

    #[test]
    fn checkpoints_land_in_checkpoint_dir() {
        let dir = tempfile::tempdir().unwrap();
        run_quick_training(dir.path());

        // Episodes 0 and 2 checkpoint with interval 2.
        assert!(dir.path().join("models/checkpoint_0.json").exists());
        assert!(dir.path().join("models/checkpoint_2.json").exists());
    }

    #[test]
    fn budgets_never_overdraw_between_steps() {
        // The terminal predicate stops an episode before a step could
        // begin with negative budget.
        let example = crate::training::builtin_training_data()[0].clone();
        let mut state = State::with_budget(&example, 10);
        let action = Action::new("summarize_text", crate::types::Category::Generation, 8);
        let result = ActionResult::failure("timeout", 5, 10);

        state = state.update(&action, &result);
        assert!(!state.is_terminal(10));
        state = state.update(&action, &result);
        assert!(state.is_terminal(10));
    }
}
