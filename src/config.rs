// src/config.rs
//
// Central configuration for the training harness.
//
// Precedence (highest to lowest):
// 1. Environment variables (MAX_EPISODES, CHECKPOINT_INTERVAL)
// 2. JSON config file (--config)
// 3. CLI flags (--episodes)
// 4. Built-in defaults

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Harness-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Number of training episodes to run.
    pub max_episodes: u64,
    /// Step cap per episode.
    pub max_steps_per_episode: u32,
    /// Emit an insight snapshot every this many episodes.
    pub logging_interval: u64,
    /// Persist the Q-table every this many episodes.
    pub checkpoint_interval: u64,
    /// Port reserved for a local metrics endpoint.
    pub metrics_port: u16,
    /// CPU/memory profiling toggle.
    pub enable_profiling: bool,
    /// Per-episode action budget.
    pub initial_budget: i64,
    /// Directory for event batches, episode summaries, and insights.
    pub log_dir: String,
    /// Directory for model checkpoints.
    pub checkpoint_dir: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_episodes: 10_000,
            max_steps_per_episode: 15,
            logging_interval: 100,
            checkpoint_interval: 500,
            metrics_port: 8080,
            enable_profiling: false,
            initial_budget: crate::types::INITIAL_BUDGET,
            log_dir: "./logs".to_string(),
            checkpoint_dir: "./models".to_string(),
        }
    }
}

impl SystemConfig {
    /// Resolve the effective config from defaults, an optional JSON file,
    /// CLI-provided values, and environment overrides.
    pub fn resolve(
        config_file: Option<&Path>,
        cli_episodes: Option<u64>,
        checkpoint_dir: Option<&str>,
        enable_profiling: bool,
    ) -> Result<Self> {
        let mut config = SystemConfig::default();

        if let Some(episodes) = cli_episodes {
            config.max_episodes = episodes;
        }
        if let Some(dir) = checkpoint_dir {
            config.checkpoint_dir = dir.to_string();
        }
        config.enable_profiling = enable_profiling;

        if let Some(path) = config_file {
            config = config.merge_file(path)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overlay fields from a JSON config file.
    ///
    /// Missing fields keep their current values (serde default = self via
    /// round-trip merge).
    fn merge_file(self, path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut value: serde_json::Value = serde_json::from_str(&data)
            .with_context(|| format!("invalid JSON in config file {}", path.display()))?;

        let base = serde_json::to_value(&self).expect("config serializes");
        if let (Some(obj), Some(base_obj)) = (value.as_object_mut(), base.as_object()) {
            for (key, base_val) in base_obj {
                obj.entry(key.clone()).or_insert_with(|| base_val.clone());
            }
        }

        serde_json::from_value(value)
            .with_context(|| format!("invalid config in {}", path.display()))
    }

    /// MAX_EPISODES and CHECKPOINT_INTERVAL override everything when set.
    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = env::var("MAX_EPISODES") {
            if let Ok(episodes) = raw.trim().parse::<u64>() {
                self.max_episodes = episodes;
            }
        }
        if let Ok(raw) = env::var("CHECKPOINT_INTERVAL") {
            if let Ok(interval) = raw.trim().parse::<u64>() {
                self.checkpoint_interval = interval;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_steps_per_episode > 0, "max_steps_per_episode must be positive");
        anyhow::ensure!(self.initial_budget > 0, "initial_budget must be positive");
        anyhow::ensure!(self.checkpoint_interval > 0, "checkpoint_interval must be positive");
        anyhow::ensure!(self.logging_interval > 0, "logging_interval must be positive");
        Ok(())
    }
}
