//! Runtime tunables.  Every field has a default, so a JSON file only needs
//! the keys it wants to change.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub run: RunConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Discount factor for the one-step backup.
    pub gamma: f32,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    /// Multiplied into epsilon after every completed update.
    pub epsilon_decay: f64,
    pub learning_rate: f64,
    /// Widths of the hidden ReLU layers.
    pub hidden_layers: Vec<usize>,
    pub replay_capacity: usize,
    pub batch_size: usize,
}

impl AgentConfig {
    /// Rejects settings the learner cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.replay_capacity == 0 {
            return Err(Error::InvalidConfig("replay_capacity must be at least 1".into()));
        }
        if self.batch_size == 0 || self.batch_size > self.replay_capacity {
            return Err(Error::InvalidConfig(format!(
                "batch_size {} must be between 1 and replay_capacity {}",
                self.batch_size, self.replay_capacity
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(Error::InvalidConfig(format!("gamma {} is outside [0, 1]", self.gamma)));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "epsilon_decay {} is outside (0, 1]",
                self.epsilon_decay
            )));
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            learning_rate: 0.001,
            hidden_layers: vec![24, 24],
            replay_capacity: 2000,
            batch_size: 32,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Seed for the simulation and exploration RNGs; `None` draws from entropy.
    pub seed: Option<u64>,
    /// Truncate training episodes after this many steps.
    pub max_steps_per_episode: Option<u64>,
    /// Directory used by the file model store.
    pub model_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_steps_per_episode: None,
            model_dir: PathBuf::from("models"),
        }
    }
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.agent.validate()?;
        Ok(config)
    }
}
