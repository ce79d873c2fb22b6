use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lower bound for the Q-agent's exploration rate after decay.
pub const MIN_EXPLORATION: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    pub learning_rate: f32,
    pub discount: f32,
    pub exploration: f32,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        QLearningConfig {
            learning_rate: 0.1,
            discount: 0.9,
            exploration: 0.1,
        }
    }
}

impl QLearningConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(out_of_range("learning_rate", self.learning_rate, "0 < value <= 1"));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(out_of_range("discount", self.discount, "0 <= value <= 1"));
        }
        if !(0.0..=1.0).contains(&self.exploration) {
            return Err(out_of_range("exploration", self.exploration, "0 <= value <= 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub exploration_constant: f32,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        MonteCarloConfig {
            exploration_constant: 1.4,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.exploration_constant > 0.0 && self.exploration_constant.is_finite()) {
            return Err(out_of_range(
                "exploration_constant",
                self.exploration_constant,
                "finite value > 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub num_episodes: usize,
    /// Episodes between checkpoints; 0 disables interval checkpoints.
    pub save_interval: usize,
    /// Episodes between exploration decays of the agents.
    pub decay_interval: usize,
    pub decay_rate: f32,
    /// Episodes between progress log lines; 0 disables them.
    pub log_interval: usize,
    /// Seed for the move-selection RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
    pub checkpoint_dir: PathBuf,
    pub prefix: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            num_episodes: 10_000,
            save_interval: 1_000,
            decay_interval: 100,
            decay_rate: 0.995,
            log_interval: 1_000,
            seed: None,
            checkpoint_dir: PathBuf::from("ai_models"),
            prefix: "models".to_owned(),
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.decay_interval == 0 {
            return Err(ConfigurationError::Invalid(
                "decay_interval must be > 0".to_owned(),
            ));
        }
        if !(self.decay_rate > 0.0 && self.decay_rate <= 1.0) {
            return Err(out_of_range("decay_rate", self.decay_rate, "0 < value <= 1"));
        }
        if self.prefix.is_empty() {
            return Err(ConfigurationError::Invalid(
                "prefix must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub q_learning: QLearningConfig,
    pub monte_carlo: MonteCarloConfig,
    pub trainer: TrainerConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigurationError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Falls back to defaults when `path` does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigurationError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::warn!("config file '{}' not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.q_learning.validate()?;
        self.monte_carlo.validate()?;
        self.trainer.validate()
    }
}

fn out_of_range(name: &'static str, value: f32, expected: &'static str) -> ConfigurationError {
    ConfigurationError::OutOfRange {
        name,
        value: value as f64,
        expected,
    }
}
