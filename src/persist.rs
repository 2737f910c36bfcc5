// src/persist.rs
//
// JSON persistence for model checkpoints.
//
// Layout: <checkpoint_dir>/final_model_<unix_ts>.json holding
// { q_table, config, timestamp, version: "1.0" }. Interim checkpoints
// use the same payload under checkpoint_<episode>.json.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agent::QTable;
use crate::clock::TimestampMs;
use crate::config::SystemConfig;

pub const MODEL_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    pub q_table: QTable,
    pub config: SystemConfig,
    pub timestamp: TimestampMs,
    pub version: String,
}

impl ModelCheckpoint {
    pub fn new(q_table: QTable, config: SystemConfig, timestamp: TimestampMs) -> Self {
        Self {
            q_table,
            config,
            timestamp,
            version: MODEL_VERSION.to_string(),
        }
    }
}

/// Persist the final model; returns the written path.
pub fn save_final_model(checkpoint_dir: &Path, model: &ModelCheckpoint) -> Result<PathBuf> {
    fs::create_dir_all(checkpoint_dir).with_context(|| {
        format!(
            "failed to create checkpoint directory {}",
            checkpoint_dir.display()
        )
    })?;

    let path = checkpoint_dir.join(format!("final_model_{}.json", model.timestamp / 1000));
    write_model(&path, model)?;
    Ok(path)
}

/// Persist an interim checkpoint for the given episode.
pub fn save_checkpoint(
    checkpoint_dir: &Path,
    model: &ModelCheckpoint,
    episode: u64,
) -> Result<PathBuf> {
    fs::create_dir_all(checkpoint_dir).with_context(|| {
        format!(
            "failed to create checkpoint directory {}",
            checkpoint_dir.display()
        )
    })?;

    let path = checkpoint_dir.join(format!("checkpoint_{episode}.json"));
    write_model(&path, model)?;
    Ok(path)
}

pub fn load_model(path: &Path) -> Result<ModelCheckpoint> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read model file {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("invalid model file {}", path.display()))
}

fn write_model(path: &Path, model: &ModelCheckpoint) -> Result<()> {
    let data = serde_json::to_string_pretty(model).context("failed to serialize model")?;
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
