use crate::error::{CheckpointError, ModelLoadError};
use crate::persistence::{read_json, write_json};
use crate::players::rate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One row of [`TrainingStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeRecord {
    /// 1-based number of the episode.
    pub episode: u64,
    pub agent1_wins: u64,
    pub agent2_wins: u64,
    pub draws: u64,
    pub agent1_reward: i32,
    pub agent2_reward: i32,
}

/// Per-episode history of a training run, stored one array per field.
///
/// Win and draw columns are cumulative; reward columns hold the result of
/// that single episode (+1, -1 or 0). No field has a default, so a stats
/// file missing any of the arrays is rejected on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingStats {
    episodes: Vec<u64>,
    agent1_wins: Vec<u64>,
    agent2_wins: Vec<u64>,
    draws: Vec<u64>,
    agent1_rewards: Vec<i32>,
    agent2_rewards: Vec<i32>,
}

impl TrainingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpisodeRecord) {
        self.episodes.push(record.episode);
        self.agent1_wins.push(record.agent1_wins);
        self.agent2_wins.push(record.agent2_wins);
        self.draws.push(record.draws);
        self.agent1_rewards.push(record.agent1_reward);
        self.agent2_rewards.push(record.agent2_reward);
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<EpisodeRecord> {
        Some(EpisodeRecord {
            episode: *self.episodes.get(index)?,
            agent1_wins: *self.agent1_wins.get(index)?,
            agent2_wins: *self.agent2_wins.get(index)?,
            draws: *self.draws.get(index)?,
            agent1_reward: *self.agent1_rewards.get(index)?,
            agent2_reward: *self.agent2_rewards.get(index)?,
        })
    }

    pub fn last(&self) -> Option<EpisodeRecord> {
        self.len().checked_sub(1).and_then(|index| self.get(index))
    }

    pub fn records(&self) -> impl Iterator<Item = EpisodeRecord> + '_ {
        (0..self.len()).filter_map(|index| self.get(index))
    }

    /// Checks that every column has the same length.
    pub fn validate(&self) -> Result<(), String> {
        let lengths = [
            ("agent1_wins", self.agent1_wins.len()),
            ("agent2_wins", self.agent2_wins.len()),
            ("draws", self.draws.len()),
            ("agent1_rewards", self.agent1_rewards.len()),
            ("agent2_rewards", self.agent2_rewards.len()),
        ];
        match lengths.iter().find(|(_, len)| *len != self.episodes.len()) {
            Some((name, len)) => Err(format!(
                "'{name}' has {len} entries but 'episodes' has {}",
                self.episodes.len()
            )),
            None => Ok(()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let stats: TrainingStats = read_json(path)?;
        stats.validate().map_err(|message| ModelLoadError::Schema {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(stats)
    }

    /// Totals and rates as of the last recorded episode.
    pub fn summary(&self) -> StatsSummary {
        let last = self.last();
        let agent1_wins = last.map_or(0, |r| r.agent1_wins);
        let agent2_wins = last.map_or(0, |r| r.agent2_wins);
        let draws = last.map_or(0, |r| r.draws);
        let games = agent1_wins + agent2_wins + draws;
        StatsSummary {
            episodes: self.len(),
            agent1_wins,
            agent2_wins,
            draws,
            agent1_win_rate: rate(agent1_wins, games),
            agent2_win_rate: rate(agent2_wins, games),
            draw_rate: rate(draws, games),
        }
    }

    /// Moving averages of the cumulative win-rate curves over `window`
    /// episodes. Only full windows are reported, so the result is empty when
    /// fewer than `window` episodes were recorded or `window` is 0.
    pub fn moving_win_rates(&self, window: usize) -> MovingWinRates {
        let mut moving = MovingWinRates::default();
        if window == 0 || window > self.len() {
            return moving;
        }
        let curve: Vec<(f64, f64)> = self
            .records()
            .map(|r| {
                let games = r.agent1_wins + r.agent2_wins + r.draws;
                (rate(r.agent1_wins, games), rate(r.agent2_wins, games))
            })
            .collect();
        for (end, slice) in curve.windows(window).enumerate() {
            let (sum1, sum2) = slice
                .iter()
                .fold((0.0, 0.0), |(s1, s2), (r1, r2)| (s1 + r1, s2 + r2));
            moving.episodes.push(self.episodes[end + window - 1]);
            moving.agent1.push(sum1 / window as f64);
            moving.agent2.push(sum2 / window as f64);
        }
        moving
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSummary {
    pub episodes: usize,
    pub agent1_wins: u64,
    pub agent2_wins: u64,
    pub draws: u64,
    pub agent1_win_rate: f64,
    pub agent2_win_rate: f64,
    pub draw_rate: f64,
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "episodes: {}", self.episodes)?;
        writeln!(
            f,
            "agent1 wins: {} ({:.1}%)",
            self.agent1_wins,
            self.agent1_win_rate * 100.0
        )?;
        writeln!(
            f,
            "agent2 wins: {} ({:.1}%)",
            self.agent2_wins,
            self.agent2_win_rate * 100.0
        )?;
        write!(f, "draws: {} ({:.1}%)", self.draws, self.draw_rate * 100.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovingWinRates {
    /// Episode number at the end of each window.
    pub episodes: Vec<u64>,
    pub agent1: Vec<f64>,
    pub agent2: Vec<f64>,
}
