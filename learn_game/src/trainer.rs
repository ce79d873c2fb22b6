//! Self-play training loop.
//!
//! `agent1` always plays `Cross` and opens every game, `agent2` plays
//! `Nought`. Each agent gets [`Player::learn_step`] right after its own moves
//! and [`Player::learn_episode`] once per finished game with its own steps.

use crate::board::{Environment, GameState, Marks, Move};
use crate::config::TrainerConfig;
use crate::error::{ConfigurationError, ModelLoadError, TrainingError};
use crate::persistence::CheckpointPaths;
use crate::players::{GameResult, Player, Step, Transition};
use crate::stats::{EpisodeRecord, TrainingStats};
use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeReport {
    pub result: GameResult,
    pub moves: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingRun {
    pub episodes: usize,
    pub cancelled: bool,
}

/// Tally of greedy games played by [`Trainer::evaluate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub games: usize,
    pub agent1_wins: usize,
    pub agent2_wins: usize,
    pub draws: usize,
}

impl MatchReport {
    fn add(&mut self, result: GameResult) {
        self.games += 1;
        match result {
            GameResult::CrossWins => self.agent1_wins += 1,
            GameResult::NoughtWins => self.agent2_wins += 1,
            GameResult::Draw => self.draws += 1,
        }
    }
}

/// Moves of one game and the state after each of them.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub moves: Vec<Move>,
    pub states: Vec<GameState>,
    pub result: GameResult,
}

pub struct Trainer<A, B> {
    env: Environment,
    config: TrainerConfig,
    agent1: A,
    agent2: B,
    stats: TrainingStats,
    rng: ChaCha8Rng,
}

impl<A: Player, B: Player> Trainer<A, B> {
    pub fn new(agent1: A, agent2: B, config: TrainerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Trainer {
            env: Environment::new(),
            config,
            agent1,
            agent2,
            stats: TrainingStats::new(),
            rng,
        })
    }

    pub fn agent1(&self) -> &A {
        &self.agent1
    }

    pub fn agent2(&self) -> &B {
        &self.agent2
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    fn name_of(&self, mark: Marks) -> &str {
        match mark {
            Marks::Cross => self.agent1.name(),
            Marks::Nought => self.agent2.name(),
        }
    }

    fn next_move(
        &mut self,
        state: &GameState,
        moves: &[Move],
        explore: bool,
    ) -> Result<Move, TrainingError> {
        let mover = state.current();
        let choice = match mover {
            Marks::Cross => self.agent1.choose_action(state, moves, explore, &mut self.rng),
            Marks::Nought => self.agent2.choose_action(state, moves, explore, &mut self.rng),
        };
        choice.ok_or_else(|| TrainingError::NoMoveChosen {
            agent: self.name_of(mover).to_owned(),
            legal: moves.len(),
        })
    }

    fn apply(&self, state: &GameState, mv: Move) -> Result<(GameState, f32), TrainingError> {
        self.env
            .apply_move(state, mv)
            .map_err(|source| TrainingError::IllegalMove {
                agent: self.name_of(state.current()).to_owned(),
                source,
            })
    }

    /// Plays one learning game and appends it to the statistics.
    ///
    /// A policy that picks an illegal move, or no move, aborts the game with
    /// an error before any counter or statistics row changes. Online updates
    /// that `learn_step` already applied earlier in that game are kept.
    pub fn train_episode(&mut self) -> Result<EpisodeReport, TrainingError> {
        let mut state = self.env.reset();
        let mut trajectory: Vec<Transition> = Vec::new();

        while !state.is_terminal() {
            let moves = self.env.valid_moves(&state);
            if moves.is_empty() {
                break;
            }
            let mv = self.next_move(&state, &moves, true)?;
            let (next_state, reward) = self.apply(&state, mv)?;
            let transition = Transition {
                player: state.current(),
                state,
                mv,
                reward,
                done: next_state.is_terminal(),
                next_state: next_state.clone(),
            };
            match transition.player {
                Marks::Cross => self.agent1.learn_step(&transition),
                Marks::Nought => self.agent2.learn_step(&transition),
            }
            trajectory.push(transition);
            state = next_state;
        }

        if !trajectory.is_empty() {
            let steps_of = |mark: Marks| -> Vec<Step> {
                trajectory
                    .iter()
                    .filter(|t| t.player == mark)
                    .map(Step::from)
                    .collect()
            };
            self.agent1.learn_episode(&steps_of(Marks::Cross));
            self.agent2.learn_episode(&steps_of(Marks::Nought));
        }

        // a loop that ran out of moves ended on a full board
        let result = GameResult::from_state(&state).unwrap_or(GameResult::Draw);
        let outcome1 = result.outcome_for(Marks::Cross);
        let outcome2 = result.outcome_for(Marks::Nought);
        self.agent1.record_outcome(outcome1);
        self.agent2.record_outcome(outcome2);
        self.stats.push(EpisodeRecord {
            episode: self.stats.len() as u64 + 1,
            agent1_wins: self.agent1.record().wins,
            agent2_wins: self.agent2.record().wins,
            draws: self.agent1.record().draws,
            agent1_reward: outcome1.reward(),
            agent2_reward: outcome2.reward(),
        });

        Ok(EpisodeReport {
            result,
            moves: trajectory.len(),
        })
    }

    /// Runs `num_episodes` episodes, stopping early when `cancel` is raised.
    ///
    /// The flag is only looked at between episodes. Episode indices continue
    /// from the statistics already held, so a resumed run decays and saves on
    /// the same schedule as an uninterrupted one.
    pub fn train(&mut self, cancel: Option<&AtomicBool>) -> Result<TrainingRun, TrainingError> {
        info!(
            "training {} episodes: {} (X) vs {} (O)",
            self.config.num_episodes,
            self.agent1.name(),
            self.agent2.name()
        );
        let mut run = TrainingRun::default();
        for _ in 0..self.config.num_episodes {
            if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                info!("training cancelled after {} episodes", run.episodes);
                run.cancelled = true;
                break;
            }
            let index = self.stats.len();
            let report = self.train_episode()?;
            run.episodes += 1;
            debug!(
                "episode {}: {:?} in {} moves",
                index + 1,
                report.result,
                report.moves
            );

            if index % self.config.decay_interval == 0 {
                self.agent1.decay_exploration(self.config.decay_rate);
                self.agent2.decay_exploration(self.config.decay_rate);
            }
            if self.config.log_interval > 0 && index % self.config.log_interval == 0 {
                self.log_progress();
            }
            if self.config.save_interval > 0 && index > 0 && index % self.config.save_interval == 0
            {
                let prefix = format!("{}_episode_{}", self.config.prefix, index);
                if let Err(e) = self.save_checkpoint(&prefix) {
                    error!("failed to save checkpoint '{}': {}", prefix, e);
                }
            }
        }
        Ok(run)
    }

    fn log_progress(&self) {
        let summary = self.stats.summary();
        let epsilon = |rate: Option<f32>| rate.map_or("-".to_owned(), |e| format!("{e:.3}"));
        info!(
            "episode {}: {} {:.1}%, {} {:.1}%, draws {:.1}%, epsilon {} / {}",
            summary.episodes,
            self.agent1.name(),
            summary.agent1_win_rate * 100.0,
            self.agent2.name(),
            summary.agent2_win_rate * 100.0,
            summary.draw_rate * 100.0,
            epsilon(self.agent1.exploration_rate()),
            epsilon(self.agent2.exploration_rate()),
        );
    }

    pub fn checkpoint_paths(&self, prefix: &str) -> CheckpointPaths {
        CheckpointPaths::new(&self.config.checkpoint_dir, prefix)
    }

    /// Writes both agents and the statistics under `prefix`.
    pub fn save_checkpoint(&self, prefix: &str) -> Result<CheckpointPaths, TrainingError> {
        let paths = self.checkpoint_paths(prefix);
        self.agent1.save(&paths.agent1)?;
        self.agent2.save(&paths.agent2)?;
        self.stats.save(&paths.stats)?;
        info!(
            "saved checkpoint '{}' to {}",
            prefix,
            self.config.checkpoint_dir.display()
        );
        Ok(paths)
    }

    /// Restores both agents and the statistics saved under `prefix`.
    ///
    /// On any failure both agents and the statistics are reset to a fresh
    /// state and the error is returned, so training can carry on from
    /// scratch.
    pub fn load_checkpoint(&mut self, prefix: &str) -> Result<(), ModelLoadError> {
        let paths = self.checkpoint_paths(prefix);
        let loaded = TrainingStats::load(&paths.stats).and_then(|stats| {
            self.agent1.load(&paths.agent1)?;
            self.agent2.load(&paths.agent2)?;
            Ok(stats)
        });
        match loaded {
            Ok(stats) => {
                info!(
                    "loaded checkpoint '{}' with {} recorded episodes",
                    prefix,
                    stats.len()
                );
                self.stats = stats;
                Ok(())
            }
            Err(e) => {
                warn!("could not load checkpoint '{}': {}; starting fresh", prefix, e);
                self.agent1.reset();
                self.agent2.reset();
                self.stats = TrainingStats::new();
                Err(e)
            }
        }
    }

    /// Plays one game without learning or touching any counter.
    pub fn play_game(&mut self, explore: bool) -> Result<GameRecord, TrainingError> {
        let mut state = self.env.reset();
        let mut moves = Vec::new();
        let mut states = Vec::new();
        loop {
            let legal = self.env.valid_moves(&state);
            if legal.is_empty() {
                break;
            }
            let mv = self.next_move(&state, &legal, explore)?;
            state = self.apply(&state, mv)?.0;
            moves.push(mv);
            states.push(state.clone());
        }
        let result = GameResult::from_state(&state).unwrap_or(GameResult::Draw);
        Ok(GameRecord {
            moves,
            states,
            result,
        })
    }

    /// Plays `games` greedy games between the two agents.
    pub fn evaluate(&mut self, games: usize) -> Result<MatchReport, TrainingError> {
        let mut report = MatchReport::default();
        for _ in 0..games {
            report.add(self.play_game(false)?.result);
        }
        info!(
            "evaluation over {} games: {} {}, {} {}, draws {}",
            report.games,
            self.agent1.name(),
            report.agent1_wins,
            self.agent2.name(),
            report.agent2_wins,
            report.draws
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonteCarloConfig, QLearningConfig};
    use crate::error::{CheckpointError, GameError, InvalidMoveReason};
    use crate::monte_carlo::MonteCarloPlayer;
    use crate::players::{Outcome, Record};
    use crate::q_learning::QLearningPlayer;
    use rand::RngCore;
    use std::path::Path;

    /// Always answers with the same fixed choice.
    struct Fixed {
        name: String,
        choice: Option<Move>,
        record: Record,
    }

    impl Fixed {
        fn new(name: &str, choice: Option<Move>) -> Self {
            Fixed {
                name: name.to_owned(),
                choice,
                record: Record::default(),
            }
        }
    }

    impl Player for Fixed {
        fn name(&self) -> &str {
            &self.name
        }
        fn choose_action(
            &self,
            _state: &GameState,
            _valid_moves: &[Move],
            _explore: bool,
            _rng: &mut dyn RngCore,
        ) -> Option<Move> {
            self.choice
        }
        fn record(&self) -> &Record {
            &self.record
        }
        fn record_outcome(&mut self, outcome: Outcome) {
            self.record.add(outcome);
        }
        fn save(&self, _path: &Path) -> Result<(), CheckpointError> {
            Ok(())
        }
        fn load(&mut self, _path: &Path) -> Result<(), ModelLoadError> {
            Ok(())
        }
        fn reset(&mut self) {
            self.record = Record::default();
        }
    }

    fn config(dir: &std::path::Path) -> TrainerConfig {
        TrainerConfig {
            num_episodes: 5,
            save_interval: 0,
            decay_interval: 100,
            decay_rate: 0.995,
            log_interval: 0,
            seed: Some(42),
            checkpoint_dir: dir.to_path_buf(),
            prefix: "models".to_owned(),
        }
    }

    fn trainer(config: TrainerConfig) -> Trainer<QLearningPlayer, MonteCarloPlayer> {
        Trainer::new(
            QLearningPlayer::new("QLearning_X", QLearningConfig::default()).unwrap(),
            MonteCarloPlayer::new("MonteCarlo_O", MonteCarloConfig::default()).unwrap(),
            config,
        )
        .unwrap()
    }

    #[test]
    fn occupied_cell_aborts_the_episode() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(
            QLearningPlayer::new("QLearning_X", QLearningConfig::default()).unwrap(),
            Fixed::new("Stubborn_O", Some((0, 0))),
            config(dir.path()),
        )
        .unwrap();
        // whatever X opens with, (0, 0) is taken on O's second move at the latest
        let err = trainer.train_episode().unwrap_err();
        match err {
            TrainingError::IllegalMove { agent, source } => {
                assert_eq!(agent, "Stubborn_O");
                assert_eq!(
                    source,
                    GameError::InvalidMove {
                        mv: (0, 0),
                        reason: InvalidMoveReason::Occupied,
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(trainer.stats().is_empty());
        assert_eq!(trainer.agent1().record().total(), 0);
        assert_eq!(trainer.agent2().record().total(), 0);
        // X's online updates from the aborted game stay in its table
        assert!(trainer.agent1().table().pair_count() >= 1);

        assert!(trainer.train(None).is_err());
        assert!(trainer.stats().is_empty());
    }

    #[test]
    fn missing_move_aborts_the_episode() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(
            Fixed::new("Silent_X", None),
            MonteCarloPlayer::new("MonteCarlo_O", MonteCarloConfig::default()).unwrap(),
            config(dir.path()),
        )
        .unwrap();
        let err = trainer.train_episode().unwrap_err();
        assert!(matches!(
            err,
            TrainingError::NoMoveChosen { ref agent, legal: 9 } if agent == "Silent_X"
        ));
        assert!(trainer.stats().is_empty());
        assert_eq!(trainer.agent2().record().total(), 0);
        assert_eq!(trainer.agent2().table().pair_count(), 0);
    }

    #[test]
    fn unwritable_checkpoint_dir_is_a_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();
        let trainer = trainer(config(&blocker));
        let err = trainer.save_checkpoint("models").unwrap_err();
        assert!(matches!(
            err,
            TrainingError::Checkpoint(CheckpointError::Io { .. })
        ));
    }

    #[test]
    fn discount_does_not_change_alternating_self_play() {
        // successor keys have the other mover's mark parity, so they are never stored
        let dir = tempfile::tempdir().unwrap();
        let run = |discount: f32| {
            let q = QLearningConfig {
                discount,
                ..Default::default()
            };
            let mut trainer = Trainer::new(
                QLearningPlayer::new("QLearning_X", q).unwrap(),
                MonteCarloPlayer::new("MonteCarlo_O", MonteCarloConfig::default()).unwrap(),
                TrainerConfig {
                    num_episodes: 300,
                    ..config(dir.path())
                },
            )
            .unwrap();
            trainer.train(None).unwrap();
            trainer.agent1().table().clone()
        };
        assert_eq!(run(0.0), run(1.0));
    }

    #[test]
    fn rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let bad = TrainerConfig {
            decay_interval: 0,
            ..config(dir.path())
        };
        assert!(Trainer::new(
            QLearningPlayer::new("QLearning_X", QLearningConfig::default()).unwrap(),
            MonteCarloPlayer::new("MonteCarlo_O", MonteCarloConfig::default()).unwrap(),
            bad,
        )
        .is_err());
    }

    #[test]
    fn episode_updates_counters_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(config(dir.path()));
        let report = trainer.train_episode().unwrap();
        assert!((5..=9).contains(&report.moves));

        let record = trainer.stats().last().unwrap();
        assert_eq!(record.episode, 1);
        let (a1, a2) = (trainer.agent1().record(), trainer.agent2().record());
        assert_eq!(a1.total(), 1);
        assert_eq!(a2.total(), 1);
        assert_eq!(a1.wins, a2.losses);
        assert_eq!(a1.draws, a2.draws);
        assert_eq!(record.agent1_reward, -record.agent2_reward);
        match report.result {
            GameResult::CrossWins => assert_eq!(record.agent1_wins, 1),
            GameResult::NoughtWins => assert_eq!(record.agent2_wins, 1),
            GameResult::Draw => assert_eq!(record.draws, 1),
        }
        // both agents learned something from the game
        assert!(trainer.agent1().table().pair_count() > 0);
        assert!(trainer.agent2().table().pair_count() > 0);
    }

    #[test]
    fn decay_follows_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(TrainerConfig {
            decay_interval: 2,
            decay_rate: 0.5,
            ..config(dir.path())
        });
        trainer.train(None).unwrap();
        // episodes 0, 2 and 4
        assert_eq!(trainer.agent1().exploration(), 0.1 * 0.125);
    }

    #[test]
    fn interval_checkpoints_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(TrainerConfig {
            save_interval: 2,
            ..config(dir.path())
        });
        let run = trainer.train(None).unwrap();
        assert_eq!(run, TrainingRun { episodes: 5, cancelled: false });
        for index in [2, 4] {
            let paths = trainer.checkpoint_paths(&format!("models_episode_{index}"));
            assert!(paths.agent1.exists());
            assert!(paths.agent2.exists());
            assert!(paths.stats.exists());
        }
        assert!(!trainer.checkpoint_paths("models_episode_0").stats.exists());
        let saved = TrainingStats::load(&trainer.checkpoint_paths("models_episode_4").stats);
        assert_eq!(saved.unwrap().len(), 5);
    }

    #[test]
    fn raised_cancel_flag_stops_before_next_episode() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(config(dir.path()));
        let cancel = AtomicBool::new(true);
        let run = trainer.train(Some(&cancel)).unwrap();
        assert_eq!(run, TrainingRun { episodes: 0, cancelled: true });
        assert!(trainer.stats().is_empty());
        assert_eq!(trainer.agent1().record().total(), 0);
    }

    #[test]
    fn numbering_continues_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(TrainerConfig {
            num_episodes: 3,
            ..config(dir.path())
        });
        trainer.train(None).unwrap();
        trainer.train(None).unwrap();
        let episodes: Vec<u64> = trainer.stats().records().map(|r| r.episode).collect();
        assert_eq!(episodes, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(trainer.stats().summary().episodes, 6);
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut trained = trainer(config(dir.path()));
        trained.train(None).unwrap();
        trained.save_checkpoint("models").unwrap();

        let mut restored = trainer(config(dir.path()));
        restored.load_checkpoint("models").unwrap();
        assert_eq!(restored.agent1(), trained.agent1());
        assert_eq!(restored.agent2(), trained.agent2());
        assert_eq!(restored.stats(), trained.stats());
    }

    #[test]
    fn failed_load_resets_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(config(dir.path()));
        trainer.train(None).unwrap();
        trainer.save_checkpoint("models").unwrap();
        std::fs::write(trainer.checkpoint_paths("models").agent2, b"garbage").unwrap();

        let err = trainer.load_checkpoint("models").unwrap_err();
        assert!(matches!(err, ModelLoadError::Corrupt { .. }));
        assert!(trainer.stats().is_empty());
        assert_eq!(trainer.agent1().record().total(), 0);
        assert_eq!(trainer.agent1().table().pair_count(), 0);
        assert_eq!(trainer.agent2().table().pair_count(), 0);

        assert!(trainer.load_checkpoint("absent").is_err());
    }

    #[test]
    fn evaluation_leaves_agents_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(TrainerConfig {
            num_episodes: 20,
            ..config(dir.path())
        });
        trainer.train(None).unwrap();
        let (agent1, agent2) = (trainer.agent1().clone(), trainer.agent2().clone());
        let stats = trainer.stats().clone();

        let report = trainer.evaluate(10).unwrap();
        assert_eq!(report.games, 10);
        assert_eq!(report.agent1_wins + report.agent2_wins + report.draws, 10);
        assert_eq!(trainer.agent1(), &agent1);
        assert_eq!(trainer.agent2(), &agent2);
        assert_eq!(trainer.stats(), &stats);
    }

    #[test]
    fn game_record_lists_every_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = trainer(config(dir.path()));
        let game = trainer.play_game(false).unwrap();
        assert_eq!(game.moves.len(), game.states.len());
        let last = game.states.last().unwrap();
        assert!(last.is_terminal());
        assert_eq!(GameResult::from_state(last), Some(game.result));
    }
}
