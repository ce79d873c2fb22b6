//! Tabular Q-learning player.
//!
//! A single table is shared between both seats: every key is written from
//! the point of view of the player who is about to move, so the acting
//! player's marks always read as `X`.

use crate::board::{GameState, Move, StateKey};
use crate::config::{QLearningConfig, MIN_EXPLORATION};
use crate::error::{CheckpointError, ConfigurationError, ModelLoadError};
use crate::persistence::AgentCheckpoint;
use crate::players::{Outcome, Player, Record, Transition};
use crate::q_table::QTable;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::path::Path;

pub const KIND: &str = "q_learning";

#[derive(Debug, Clone, PartialEq)]
pub struct QLearningPlayer {
    name: String,
    config: QLearningConfig,
    initial: QLearningConfig,
    table: QTable,
    record: Record,
}

impl QLearningPlayer {
    pub fn new(name: &str, config: QLearningConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(QLearningPlayer {
            name: name.to_owned(),
            config,
            initial: config,
            table: QTable::new(),
            record: Record::default(),
        })
    }

    pub fn config(&self) -> &QLearningConfig {
        &self.config
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn exploration(&self) -> f32 {
        self.config.exploration
    }

    /// One-step Q-learning backup for a move this player made from `state`.
    ///
    /// The successor is keyed from the same player's perspective as `state`.
    /// Such a key has the mark counts of a position where the opponent is to
    /// move, while a player only ever writes entries for positions where it is
    /// to move. In alternating play the successor value is therefore always 0
    /// and `discount` has no effect.
    pub fn update(
        &mut self,
        state: &GameState,
        mv: Move,
        reward: f32,
        next_state: &GameState,
        done: bool,
    ) {
        let perspective = state.current();
        let target = if done {
            reward
        } else {
            let next_key = StateKey::new(next_state.board(), perspective);
            let next_moves = next_state.available_moves();
            reward + self.config.discount * self.table.max_value(&next_key, &next_moves)
        };
        let value = self.table.entry(state.state_key(), mv);
        *value += self.config.learning_rate * (target - *value);
    }

    /// Multiplies the exploration rate by `rate`, never going below
    /// [`MIN_EXPLORATION`].
    pub fn decay(&mut self, rate: f32) {
        self.config.exploration = (self.config.exploration * rate).max(MIN_EXPLORATION);
    }
}

impl Player for QLearningPlayer {
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
            return None;
        }
        if explore && rng.gen::<f32>() < self.config.exploration {
            return valid_moves.choose(rng).copied();
        }
        let best = self.table.max_moves(&state.state_key(), valid_moves);
        best.choose(rng).copied()
    }

    fn learn_step(&mut self, t: &Transition) {
        self.update(&t.state, t.mv, t.reward, &t.next_state, t.done);
    }

    fn decay_exploration(&mut self, rate: f32) {
        self.decay(rate);
    }

    fn exploration_rate(&self) -> Option<f32> {
        Some(self.config.exploration)
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
        let checkpoint = AgentCheckpoint::<QLearningConfig, QTable>::from_disk(path, KIND)?;
        checkpoint
            .config
            .validate()
            .map_err(|e| ModelLoadError::Schema {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
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
        self.table = QTable::new();
        self.record = Record::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Environment, Marks};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn player(exploration: f32) -> QLearningPlayer {
        QLearningPlayer::new(
            "QLearning_X",
            QLearningConfig {
                learning_rate: 0.1,
                discount: 0.9,
                exploration,
            },
        )
        .unwrap()
    }

    fn after(moves: &[Move]) -> GameState {
        let env = Environment::new();
        moves
            .iter()
            .fold(env.reset(), |state, &mv| env.apply_move(&state, mv).unwrap().0)
    }

    #[test]
    fn rejects_invalid_hyperparameters() {
        let config = QLearningConfig {
            learning_rate: -1.0,
            ..Default::default()
        };
        assert!(QLearningPlayer::new("bad", config).is_err());
    }

    #[test]
    fn terminal_update_moves_value_toward_reward() {
        let mut agent = player(0.1);
        let state = after(&[(0, 0), (1, 1), (0, 1), (2, 2)]);
        let next = after(&[(0, 0), (1, 1), (0, 1), (2, 2), (0, 2)]);
        let alpha = agent.config().learning_rate;

        let old = agent.table().get(&state.state_key(), &(0, 2));
        agent.update(&state, (0, 2), 1.0, &next, true);
        let first = agent.table().get(&state.state_key(), &(0, 2));
        assert_eq!(first, old + alpha * (1.0 - old));

        agent.update(&state, (0, 2), 1.0, &next, true);
        let second = agent.table().get(&state.state_key(), &(0, 2));
        assert_eq!(second, first + alpha * (1.0 - first));
    }

    #[test]
    fn non_terminal_update_uses_discounted_successor() {
        let mut agent = player(0.1);
        let state = after(&[]);
        let next = after(&[(1, 1)]);
        // never happens in alternating play; seeded to reach the discounted term
        let next_key = StateKey::new(next.board(), state.current());
        *agent.table.entry(next_key, (0, 0)) = 0.5;

        agent.update(&state, (1, 1), 0.0, &next, false);
        let expected = 0.0 + 0.1 * (0.0 + 0.9 * 0.5 - 0.0);
        assert_eq!(agent.table().get(&state.state_key(), &(1, 1)), expected);
    }

    #[test]
    fn unseen_successor_counts_as_zero() {
        let mut agent = player(0.1);
        let state = after(&[]);
        let next = after(&[(1, 1)]);
        agent.update(&state, (1, 1), 0.0, &next, false);
        assert_eq!(agent.table().get(&state.state_key(), &(1, 1)), 0.0);
        assert_eq!(agent.table().pair_count(), 1);
    }

    #[test]
    fn greedy_choice_takes_highest_value() {
        let mut agent = player(1.0);
        let state = after(&[(0, 0), (1, 1)]);
        *agent.table.entry(state.state_key(), (2, 2)) = 0.7;
        *agent.table.entry(state.state_key(), (0, 1)) = 0.2;
        let moves = state.available_moves();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..20 {
            assert_eq!(agent.choose_action(&state, &moves, false, &mut rng), Some((2, 2)));
        }
    }

    #[test]
    fn greedy_ties_are_broken_among_maximizers_only() {
        let mut agent = player(0.0);
        let state = after(&[]);
        *agent.table.entry(state.state_key(), (0, 0)) = -0.3;
        *agent.table.entry(state.state_key(), (2, 2)) = -0.1;
        let moves = state.available_moves();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            let mv = agent.choose_action(&state, &moves, true, &mut rng).unwrap();
            assert!(mv != (0, 0) && mv != (2, 2));
            seen.insert(mv);
        }
        assert_eq!(seen.len(), 7);
    }

    #[test]
    fn full_exploration_is_uniform_over_legal_moves() {
        let agent = player(1.0);
        let state = after(&[(0, 0), (1, 1)]);
        let moves = state.available_moves();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..100 {
            let mv = agent.choose_action(&state, &moves, true, &mut rng).unwrap();
            assert!(moves.contains(&mv));
        }
        assert_eq!(agent.choose_action(&state, &[], true, &mut rng), None);
    }

    #[test]
    fn decay_is_floored() {
        let mut agent = player(0.1);
        agent.decay_exploration(0.5);
        assert_eq!(agent.exploration(), 0.05);
        for _ in 0..20 {
            agent.decay_exploration(0.5);
        }
        assert_eq!(agent.exploration(), MIN_EXPLORATION);
    }

    #[test]
    fn keys_are_written_from_the_movers_side() {
        let mut agent = player(0.0);
        let state = after(&[(1, 1), (0, 0), (2, 2)]);
        assert_eq!(state.current(), Marks::Nought);
        assert_eq!(state.state_key().as_str(), "X---O---O");
        let next = after(&[(1, 1), (0, 0), (2, 2), (0, 2)]);
        agent.update(&state, (0, 2), 0.0, &next, false);
        assert!(agent.table().contains_key(&state.state_key()));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models_agent1.pickle");
        let mut agent = player(0.3);
        let state = after(&[(0, 0), (1, 1)]);
        *agent.table.entry(state.state_key(), (2, 2)) = 0.123_456_79;
        agent.record_outcome(Outcome::Win);
        agent.record_outcome(Outcome::Draw);
        agent.decay_exploration(0.5);
        agent.save(&path).unwrap();

        let mut restored = player(0.1);
        restored.load(&path).unwrap();
        assert_eq!(restored.config(), agent.config());
        assert_eq!(restored.table(), agent.table());
        assert_eq!(restored.record(), agent.record());
    }

    #[test]
    fn failed_load_leaves_agent_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = player(0.3);
        agent.record_outcome(Outcome::Loss);
        let before = agent.clone();
        assert!(agent.load(&dir.path().join("absent.pickle")).is_err());
        std::fs::write(dir.path().join("junk.pickle"), b"not a pickle").unwrap();
        assert!(agent.load(&dir.path().join("junk.pickle")).is_err());
        assert_eq!(agent, before);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut agent = player(0.3);
        let state = after(&[]);
        agent.update(&state, (0, 0), 1.0, &state, true);
        agent.decay_exploration(0.5);
        agent.record_outcome(Outcome::Win);
        agent.reset();
        assert_eq!(agent, player(0.3));
    }
}
