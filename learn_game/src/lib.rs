//! Tic-tac-toe self-play training of tabular agents.
//!
//! A Q-learning agent and a Monte-Carlo/UCB1 agent learn by playing against
//! each other through the stateless [`Environment`]. The [`Trainer`] runs the
//! episodes, decays exploration, and checkpoints both agents together with the
//! [`TrainingStats`] of the run.

pub mod board;
pub mod config;
pub mod error;
pub mod monte_carlo;
pub mod persistence;
pub mod players;
pub mod q_learning;
pub mod q_table;
pub mod stats;
pub mod trainer;

pub use board::{Environment, GameState, GameStatus, Marks, Move, StateKey};
pub use config::{AppConfig, MonteCarloConfig, QLearningConfig, TrainerConfig};
pub use error::{CheckpointError, ConfigurationError, GameError, ModelLoadError, TrainingError};
pub use monte_carlo::MonteCarloPlayer;
pub use players::{GameResult, Outcome, Player, Record};
pub use q_learning::QLearningPlayer;
pub use stats::{StatsSummary, TrainingStats};
pub use trainer::{GameRecord, MatchReport, Trainer, TrainingRun};
