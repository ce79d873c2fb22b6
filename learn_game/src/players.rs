use crate::board::{GameState, GameStatus, Marks, Move};
use crate::error::{CheckpointError, ModelLoadError};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One move of an episode together with what it led to.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub player: Marks,
    pub state: GameState,
    pub mv: Move,
    /// Immediate reward of the player who moved.
    pub reward: f32,
    pub next_state: GameState,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: GameState,
    pub mv: Move,
    pub reward: f32,
}

impl From<&Transition> for Step {
    fn from(t: &Transition) -> Self {
        Step {
            state: t.state.clone(),
            mv: t.mv,
            reward: t.reward,
        }
    }
}

/// Final result of an episode from the table's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    CrossWins,
    NoughtWins,
    Draw,
}

impl GameResult {
    /// `None` while the game is still in play.
    pub fn from_state(state: &GameState) -> Option<Self> {
        match state.status() {
            GameStatus::InPlay => None,
            GameStatus::Drawn => Some(GameResult::Draw),
            GameStatus::Won(Marks::Cross) => Some(GameResult::CrossWins),
            GameStatus::Won(Marks::Nought) => Some(GameResult::NoughtWins),
        }
    }

    pub fn outcome_for(self, mark: Marks) -> Outcome {
        match (self, mark) {
            (GameResult::Draw, _) => Outcome::Draw,
            (GameResult::CrossWins, Marks::Cross) | (GameResult::NoughtWins, Marks::Nought) => {
                Outcome::Win
            }
            _ => Outcome::Loss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl Outcome {
    pub fn reward(self) -> i32 {
        match self {
            Outcome::Win => 1,
            Outcome::Loss => -1,
            Outcome::Draw => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
}

impl Record {
    pub fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
        }
    }
    pub fn total(&self) -> u64 {
        self.wins + self.losses + self.draws
    }
    pub fn win_rate(&self) -> f64 {
        rate(self.wins, self.total())
    }
    pub fn loss_rate(&self) -> f64 {
        rate(self.losses, self.total())
    }
    pub fn draw_rate(&self) -> f64 {
        rate(self.draws, self.total())
    }
}

pub(crate) fn rate(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// A learning policy that can sit on either side of the board.
pub trait Player {
    fn name(&self) -> &str;

    /// Picks one of `valid_moves`, or `None` when there is nothing to pick.
    /// With `explore` false the choice is greedy and only the tie-break draws
    /// from `rng`.
    fn choose_action(
        &self,
        state: &GameState,
        valid_moves: &[Move],
        explore: bool,
        rng: &mut dyn RngCore,
    ) -> Option<Move>;

    /// Called right after each move this player made.
    fn learn_step(&mut self, _transition: &Transition) {}

    /// Called once per finished episode with this player's own steps.
    fn learn_episode(&mut self, _steps: &[Step]) {}

    fn decay_exploration(&mut self, _rate: f32) {}

    fn exploration_rate(&self) -> Option<f32> {
        None
    }

    fn record(&self) -> &Record;

    fn record_outcome(&mut self, outcome: Outcome);

    fn save(&self, path: &Path) -> Result<(), CheckpointError>;

    /// Replaces the in-memory state with the checkpoint at `path`; on error the
    /// player is left untouched.
    fn load(&mut self, path: &Path) -> Result<(), ModelLoadError>;

    /// Back to freshly-initialized tables, counters and hyperparameters.
    fn reset(&mut self);
}

impl<P: Player + ?Sized> Player for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn choose_action(
        &self,
        state: &GameState,
        valid_moves: &[Move],
        explore: bool,
        rng: &mut dyn RngCore,
    ) -> Option<Move> {
        (**self).choose_action(state, valid_moves, explore, rng)
    }
    fn learn_step(&mut self, transition: &Transition) {
        (**self).learn_step(transition)
    }
    fn learn_episode(&mut self, steps: &[Step]) {
        (**self).learn_episode(steps)
    }
    fn decay_exploration(&mut self, rate: f32) {
        (**self).decay_exploration(rate)
    }
    fn exploration_rate(&self) -> Option<f32> {
        (**self).exploration_rate()
    }
    fn record(&self) -> &Record {
        (**self).record()
    }
    fn record_outcome(&mut self, outcome: Outcome) {
        (**self).record_outcome(outcome)
    }
    fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        (**self).save(path)
    }
    fn load(&mut self, path: &Path) -> Result<(), ModelLoadError> {
        (**self).load(path)
    }
    fn reset(&mut self) {
        (**self).reset()
    }
}
