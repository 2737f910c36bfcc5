// src/agent.rs
//
// Tabular Q-learning agent.
//
// The Q-table is a sparse double-keyed map: a short hash of the observed
// state buckets, then "function_category" action keys. The agent owns the
// table exclusively; the episode runner is the only caller.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use crate::event_log::ActionMetrics;
use crate::types::{Action, State};

/// Sparse state_key -> action_key -> value table.
pub type QTable = HashMap<String, HashMap<String, f64>>;

/// Q-learning hyperparameters.
#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub exploration_rate: f64,
    pub min_exploration: f64,
    pub decay_rate: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.95,
            exploration_rate: 1.0,
            min_exploration: 0.01,
            decay_rate: 0.995,
        }
    }
}

pub struct QLearningAgent {
    q_table: QTable,
    learning_rate: f64,
    discount_factor: f64,
    exploration_rate: f64,
    min_exploration: f64,
    decay_rate: f64,
    rng: ChaCha8Rng,
}

impl QLearningAgent {
    pub fn new(config: AgentConfig, seed: u64) -> Self {
        Self {
            q_table: QTable::new(),
            learning_rate: config.learning_rate,
            discount_factor: config.discount_factor,
            exploration_rate: config.exploration_rate,
            min_exploration: config.min_exploration,
            decay_rate: config.decay_rate,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// ε-greedy selection over the catalog, with the metrics the event log
    /// wants alongside.
    ///
    /// Ties on the greedy path break toward the earlier catalog entry.
    pub fn select_action_with_metrics(
        &mut self,
        state: &State,
        actions: &[Action],
    ) -> Option<(Action, ActionMetrics)> {
        if actions.is_empty() {
            return None;
        }

        let explore = self.rng.gen::<f64>() < self.exploration_rate;
        let selected = if explore {
            actions[self.rng.gen_range(0..actions.len())].clone()
        } else {
            self.best_action(state, actions).clone()
        };

        let q_value = self.get_q(state, &selected);
        let metrics = ActionMetrics {
            function_name: selected.function_name.clone(),
            category: selected.category.as_str().to_string(),
            compute_cost: selected.cost,
            input_size: state.text.len(),
            q_value,
            exploration: explore,
        };

        Some((selected, metrics))
    }

    /// Q(s, a) with a 0.0 default for unseen pairs.
    pub fn get_q(&self, state: &State, action: &Action) -> f64 {
        let state_key = state_key(state);
        let action_key = action_key(action);
        self.q_table
            .get(&state_key)
            .and_then(|entries| entries.get(&action_key))
            .copied()
            .unwrap_or(0.0)
    }

    /// Temporal-difference update, followed by ε decay.
    ///
    /// ε never increases: ε <- max(ε_min, ε * decay).
    pub fn update_q(
        &mut self,
        state: &State,
        action: &Action,
        reward: f64,
        next_state: &State,
        actions: &[Action],
    ) {
        let old = self.get_q(state, action);
        let max_next = self.max_q(next_state, actions);
        let target = reward + self.discount_factor * max_next;
        let new = old + self.learning_rate * (target - old);

        self.q_table
            .entry(state_key(state))
            .or_default()
            .insert(action_key(action), new);

        self.exploration_rate = (self.exploration_rate * self.decay_rate).max(self.min_exploration);
    }

    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    /// Replace the table wholesale (checkpoint restore).
    pub fn load_q_table(&mut self, table: QTable) {
        self.q_table = table;
    }

    fn best_action<'a>(&self, state: &State, actions: &'a [Action]) -> &'a Action {
        let mut best = &actions[0];
        let mut best_q = self.get_q(state, best);
        for action in &actions[1..] {
            let q = self.get_q(state, action);
            if q > best_q {
                best_q = q;
                best = action;
            }
        }
        best
    }

    fn max_q(&self, state: &State, actions: &[Action]) -> f64 {
        if actions.is_empty() {
            return 0.0;
        }
        actions
            .iter()
            .map(|a| self.get_q(state, a))
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Short hash bucketing the observed state.
///
/// Keyed on task type, a text prefix, step count, and remaining budget;
/// the hash choice only matters for bucketing, not semantics.
pub fn state_key(state: &State) -> String {
    let prefix: String = state.text.chars().take(100).collect();
    let data = format!(
        "{}|{}|{}|{}",
        state.task_type.as_str(),
        prefix,
        state.step_count,
        state.remaining_budget
    );
    let digest = Sha256::digest(data.as_bytes());
    hex_prefix(&digest, 16)
}

pub fn action_key(action: &Action) -> String {
    format!("{}_{}", action.function_name, action.category.as_str())
}

fn hex_prefix(digest: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= len {
            break;
        }
    }
    out.truncate(len);
    out
}
