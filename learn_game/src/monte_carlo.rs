//! Monte-Carlo player choosing moves with UCB1.

use crate::board::{GameState, Move};
use crate::config::MonteCarloConfig;
use crate::error::{CheckpointError, ConfigurationError, ModelLoadError};
use crate::persistence::AgentCheckpoint;
use crate::players::{Outcome, Player, Record, Step};
use crate::q_table::VisitTable;
use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::RngCore;
use std::path::Path;

pub const KIND: &str = "monte_carlo";

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloPlayer {
    name: String,
    config: MonteCarloConfig,
    initial: MonteCarloConfig,
    table: VisitTable,
    record: Record,
}

impl MonteCarloPlayer {
    pub fn new(name: &str, config: MonteCarloConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(MonteCarloPlayer {
            name: name.to_owned(),
            config,
            initial: config,
            table: VisitTable::new(),
            record: Record::default(),
        })
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    pub fn table(&self) -> &VisitTable {
        &self.table
    }

    /// Folds a finished episode into the running means, one visit per step.
    pub fn update(&mut self, episode: &[Step]) {
        for step in episode {
            self.table
                .entry(step.state.state_key(), step.mv)
                .record(step.reward);
        }
    }

    fn ucb1_action(
        &self,
        state: &GameState,
        valid_moves: &[Move],
        rng: &mut dyn RngCore,
    ) -> Option<Move> {
        let key = state.state_key();
        let total_visits = self.table.total_visits(&key, valid_moves);
        if total_visits == 0 {
            return valid_moves.choose(rng).copied();
        }
        let ln_total = (total_visits as f32).ln();
        let mut best: Option<(Move, f32)> = None;
        for &mv in valid_moves {
            let arm = self.table.get(&key, &mv);
            if arm.visits == 0 {
                return Some(mv);
            }
            let bound =
                arm.mean + self.config.exploration_constant * (ln_total / arm.visits as f32).sqrt();
            if best.map_or(true, |(_, value)| bound > value) {
                best = Some((mv, bound));
            }
        }
        best.map(|(mv, _)| mv)
    }

    fn best_action(
        &self,
        state: &GameState,
        valid_moves: &[Move],
        rng: &mut dyn RngCore,
    ) -> Option<Move> {
        let key = state.state_key();
        if self.table.total_visits(&key, valid_moves) == 0 {
            return valid_moves.choose(rng).copied();
        }
        let best = valid_moves.iter().copied().max_set_by(|mv1, mv2| {
            self.table
                .get(&key, mv1)
                .mean
                .total_cmp(&self.table.get(&key, mv2).mean)
        });
        best.choose(rng).copied()
    }
}

impl Player for MonteCarloPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn choose_action(
        &self,
        state: &GameState,
        valid_moves: &[Move],
        explore: bool,
        rng: &mut dyn RngCore,
    ) -> Option<Move> {
        if valid_moves.is_empty() {
            None
        } else if explore {
            self.ucb1_action(state, valid_moves, rng)
        } else {
            self.best_action(state, valid_moves, rng)
        }
    }

    fn learn_episode(&mut self, steps: &[Step]) {
        self.update(steps);
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_outcome(&mut self, outcome: Outcome) {
        self.record.add(outcome);
    }

    fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        AgentCheckpoint::new(KIND, &self.name, self.config, &self.table, self.record).to_disk(path)
    }

    fn load(&mut self, path: &Path) -> Result<(), ModelLoadError> {
        let checkpoint = AgentCheckpoint::<MonteCarloConfig, VisitTable>::from_disk(path, KIND)?;
        checkpoint
            .config
            .validate()
            .map_err(|e| ModelLoadError::Schema {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        if let Some((key, mv)) = checkpoint.table.iter().find_map(|(key, moves)| {
            moves
                .iter()
                .find(|(_, arm)| arm.visits == 0)
                .map(|(mv, _)| (key, mv))
        }) {
            return Err(ModelLoadError::Schema {
                path: path.to_path_buf(),
                message: format!("zero visit count stored for {key} {mv:?}"),
            });
        }
        self.config = checkpoint.config;
        self.table = checkpoint.table;
        self.record = checkpoint.record;
        log::debug!(
            "loaded {} with {} state-move pairs from {}",
            self.name,
            self.table.pair_count(),
            path.display()
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.config = self.initial;
        self.table = VisitTable::new();
        self.record = Record::default();
    }
}
