use crate::error::{GameError, InvalidMoveReason};
use itertools::Itertools;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Deref};

/// A cell on the board as `(row, column)`, both in `0..3`.
pub type Move = (usize, usize);

pub const BOARD_SIZE: usize = 3;

/// The two players. `Cross` (player A) always opens the game.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Marks {
    Cross,
    Nought,
}

impl Marks {
    pub fn other(self) -> Self {
        match self {
            Self::Cross => Self::Nought,
            Self::Nought => Self::Cross,
        }
    }
    pub fn value(self) -> i8 {
        match self {
            Self::Cross => 1,
            Self::Nought => -1,
        }
    }
    pub fn as_char(self) -> char {
        match self {
            Self::Cross => 'X',
            Self::Nought => 'O',
        }
    }
    fn from_value(value: i8) -> Option<Self> {
        match value {
            1 => Some(Self::Cross),
            -1 => Some(Self::Nought),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    InPlay,
    Drawn,
    Won(Marks),
}

/// 3x3 grid holding 0 for empty, +1 for `Cross` and -1 for `Nought`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: Array2<i8>,
}

impl Deref for Board {
    type Target = Array2<i8>;
    fn deref(&self) -> &Self::Target {
        &self.cells
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rendered = self
            .iter()
            .map(|&value| Marks::from_value(value).map_or('-', Marks::as_char))
            .collect::<String>();
        write!(f, "{}", rendered)
    }
}

impl Board {
    pub fn new() -> Self {
        Board {
            cells: Array2::zeros((BOARD_SIZE, BOARD_SIZE)),
        }
    }

    pub fn cell(&self, mv: Move) -> Option<Marks> {
        self.cells.get([mv.0, mv.1]).copied().and_then(Marks::from_value)
    }

    pub fn available_moves(&self) -> Vec<Move> {
        self.indexed_iter()
            .filter(|(_index, &value)| value == 0)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.iter().all(|&value| value != 0)
    }

    pub fn mark_counts(&self) -> (usize, usize) {
        self.iter().fold((0, 0), |(cross, nought), &value| match value {
            1 => (cross + 1, nought),
            -1 => (cross, nought + 1),
            _ => (cross, nought),
        })
    }

    /// Owner of a completed line, checking rows, then columns, then both
    /// diagonals.
    pub fn completed_line(&self) -> Option<Marks> {
        let anti_diagonal = self.slice(s![.., ..;-1]);
        self.rows()
            .into_iter()
            .chain(self.columns())
            .chain(std::iter::once(self.diag()))
            .chain(std::iter::once(anti_diagonal.diag()))
            .map(|line| line.sum())
            .find(|sum| sum.abs() == BOARD_SIZE as i8)
            .and_then(|sum| Marks::from_value(sum.signum()))
    }

    pub fn draw(&self) {
        println!("* * * * *");
        self.to_string()
            .chars()
            .tuples::<(_, _, _)>()
            .for_each(|a| println!("* {} {} {} *", a.0, a.1, a.2));
        println!("* * * * *");
    }

    fn place(&mut self, mv: Move, mark: Marks) {
        self.cells[[mv.0, mv.1]] = mark.value();
    }
}

/// Lookup key for the value tables.
///
/// Nine characters over `X`, `O` and `-`, read row by row, written from the
/// perspective of one player: that player's marks are always `X`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    pub fn new(board: &Board, perspective: Marks) -> Self {
        let key = board
            .iter()
            .map(|&value| match value * perspective.value() {
                1 => 'X',
                -1 => 'O',
                _ => '-',
            })
            .collect::<String>();
        StateKey(key)
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    board: Board,
    current: Marks,
    status: GameStatus,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        GameState {
            board: Board::new(),
            current: Marks::Cross,
            status: GameStatus::InPlay,
        }
    }
    pub fn board(&self) -> &Board {
        &self.board
    }
    /// Player to move, or the player who made the last move once terminal.
    pub fn current(&self) -> Marks {
        self.current
    }
    pub fn status(&self) -> GameStatus {
        self.status
    }
    pub fn is_terminal(&self) -> bool {
        self.status != GameStatus::InPlay
    }
    pub fn winner(&self) -> Option<Marks> {
        match self.status {
            GameStatus::Won(mark) => Some(mark),
            _ => None,
        }
    }
    pub fn state_key(&self) -> StateKey {
        StateKey::new(&self.board, self.current)
    }
    pub fn available_moves(&self) -> Vec<Move> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.board.available_moves()
    }

    /// Places the current player's mark and returns the mover's reward.
    pub fn play(&mut self, mv: Move) -> Result<f32, GameError> {
        let reason = if self.is_terminal() {
            Some(InvalidMoveReason::GameOver)
        } else if mv.0 >= BOARD_SIZE || mv.1 >= BOARD_SIZE {
            Some(InvalidMoveReason::OutOfBounds)
        } else if self.board[[mv.0, mv.1]] != 0 {
            Some(InvalidMoveReason::Occupied)
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(GameError::InvalidMove { mv, reason });
        }
        self.board.place(mv, self.current);
        match self.board.completed_line() {
            Some(mark) => {
                self.status = GameStatus::Won(mark);
                Ok(1.0)
            }
            None if self.board.is_full() => {
                self.status = GameStatus::Drawn;
                Ok(0.0)
            }
            None => {
                self.current = self.current.other();
                Ok(0.0)
            }
        }
    }
}

/// Stateless transition model of the game.
#[derive(Debug, Clone, Copy, Default)]
pub struct Environment;

impl Environment {
    pub fn new() -> Self {
        Environment
    }
    pub fn reset(&self) -> GameState {
        GameState::new()
    }
    pub fn valid_moves(&self, state: &GameState) -> Vec<Move> {
        state.available_moves()
    }
    /// Returns the successor state and the reward of the player who moved.
    pub fn apply_move(&self, state: &GameState, mv: Move) -> Result<(GameState, f32), GameError> {
        let mut next = state.clone();
        let reward = next.play(mv)?;
        Ok((next, reward))
    }
}
