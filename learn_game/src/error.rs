use std::path::PathBuf;

use crate::board::Move;

/// Errors raised by the environment when a move cannot be applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("invalid move {mv:?}: {reason}")]
    InvalidMove { mv: Move, reason: InvalidMoveReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidMoveReason {
    Occupied,
    OutOfBounds,
    GameOver,
}

impl std::fmt::Display for InvalidMoveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Occupied => write!(f, "cell is already occupied"),
            Self::OutOfBounds => write!(f, "cell is outside the 3x3 board"),
            Self::GameOver => write!(f, "game is already over"),
        }
    }
}

/// Errors that can occur while reading a checkpoint back into memory.
///
/// A failed load never leaves an agent or the statistics half-updated.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("checkpoint not found: {path}")]
    Missing {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode checkpoint {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("checkpoint {path} holds a '{found}' agent, expected '{expected}'")]
    KindMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("checkpoint {path} is malformed: {message}")]
    Schema { path: PathBuf, message: String },
}

/// Errors that can occur while writing a checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("I/O error while writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode pickle: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Hyperparameters or configuration files that cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{name} = {value} is out of range ({expected})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("{0}")]
    Invalid(String),

    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Errors that abort a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("agent '{agent}' chose an illegal move: {source}")]
    IllegalMove {
        agent: String,
        #[source]
        source: GameError,
    },

    #[error("agent '{agent}' returned no move although {legal} moves were legal")]
    NoMoveChosen { agent: String, legal: usize },

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}
