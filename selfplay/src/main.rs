use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use learn_game::persistence::CheckpointPaths;
use learn_game::{
    AppConfig, GameResult, MonteCarloPlayer, Player, QLearningPlayer, Trainer, TrainingRun,
    TrainingStats,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Self-play training of tic-tac-toe agents.
#[derive(Parser)]
#[command(name = "selfplay", about = "Train tic-tac-toe agents by self-play")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, global = true, default_value = "selfplay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train both agents and save the final checkpoint
    Train {
        #[command(flatten)]
        common: Common,

        /// Override number of training episodes
        #[arg(long)]
        episodes: Option<usize>,

        /// Override the seed of the move-selection RNG
        #[arg(long)]
        seed: Option<u64>,

        /// Override episodes between interval checkpoints (0 disables them)
        #[arg(long)]
        save_interval: Option<usize>,

        /// Continue from the checkpoint saved under the prefix
        #[arg(long)]
        resume: bool,
    },
    /// Play greedy games between two saved agents
    Evaluate {
        #[command(flatten)]
        common: Common,

        #[arg(long, default_value_t = 100)]
        games: usize,
    },
    /// Play one greedy game and print every position
    Demo {
        #[command(flatten)]
        common: Common,
    },
    /// Print the statistics saved with a checkpoint
    Stats {
        #[command(flatten)]
        common: Common,

        /// Window of the moving win-rate average
        #[arg(long, default_value_t = 100)]
        window: usize,
    },
}

#[derive(Args)]
struct Common {
    /// Checkpoint file prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Checkpoint directory
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Agent playing X
    #[arg(long, value_enum, default_value_t = AgentKind::Q)]
    agent1: AgentKind,

    /// Agent playing O
    #[arg(long, value_enum, default_value_t = AgentKind::Mc)]
    agent2: AgentKind,
}

#[derive(Clone, Copy, ValueEnum)]
enum AgentKind {
    Q,
    Mc,
}

fn build_agent(kind: AgentKind, mark: char, config: &AppConfig) -> Result<Box<dyn Player>> {
    let agent: Box<dyn Player> = match kind {
        AgentKind::Q => Box::new(QLearningPlayer::new(
            &format!("QLearning_{mark}"),
            config.q_learning,
        )?),
        AgentKind::Mc => Box::new(MonteCarloPlayer::new(
            &format!("MonteCarlo_{mark}"),
            config.monte_carlo,
        )?),
    };
    Ok(agent)
}

type SelfPlay = Trainer<Box<dyn Player>, Box<dyn Player>>;

fn build_trainer(config: &AppConfig, common: &Common) -> Result<SelfPlay> {
    let agent1 = build_agent(common.agent1, 'X', config)?;
    let agent2 = build_agent(common.agent2, 'O', config)?;
    Trainer::new(agent1, agent2, config.trainer.clone()).context("building trainer")
}

fn apply_common(config: &mut AppConfig, common: &Common) {
    if let Some(prefix) = &common.prefix {
        config.trainer.prefix = prefix.clone();
    }
    if let Some(dir) = &common.dir {
        config.trainer.checkpoint_dir = dir.clone();
    }
}

fn load_trained(config: &AppConfig, common: &Common) -> Result<SelfPlay> {
    let mut trainer = build_trainer(config, common)?;
    let prefix = &config.trainer.prefix;
    trainer
        .load_checkpoint(prefix)
        .with_context(|| format!("loading checkpoint '{prefix}'"))?;
    Ok(trainer)
}

/// Trains until done or `cancel` is raised, then saves the checkpoint either way.
fn run_training(trainer: &mut SelfPlay, prefix: &str, cancel: &AtomicBool) -> Result<TrainingRun> {
    let run = trainer.train(Some(cancel)).context("training aborted")?;
    if run.cancelled {
        log::info!("interrupted, saving checkpoint '{prefix}'");
    }
    trainer
        .save_checkpoint(prefix)
        .with_context(|| format!("saving checkpoint '{prefix}'"))?;
    Ok(run)
}

fn print_report(trainer: &SelfPlay) {
    let summary = trainer.stats().summary();
    println!("{}", "=".repeat(50));
    println!("{summary}");
    for agent in [trainer.agent1() as &dyn Player, trainer.agent2() as &dyn Player] {
        let record = agent.record();
        println!("{}:", agent.name());
        println!("  wins:   {} ({:.1}%)", record.wins, record.win_rate() * 100.0);
        println!("  losses: {} ({:.1}%)", record.losses, record.loss_rate() * 100.0);
        println!("  draws:  {} ({:.1}%)", record.draws, record.draw_rate() * 100.0);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Command::Train {
            common,
            episodes,
            seed,
            save_interval,
            resume,
        } => {
            apply_common(&mut config, &common);
            if let Some(episodes) = episodes {
                config.trainer.num_episodes = episodes;
            }
            if seed.is_some() {
                config.trainer.seed = seed;
            }
            if let Some(save_interval) = save_interval {
                config.trainer.save_interval = save_interval;
            }
            let mut trainer = build_trainer(&config, &common)?;
            let prefix = config.trainer.prefix.clone();
            if resume {
                // a missing or broken checkpoint leaves fresh agents behind
                if let Err(e) = trainer.load_checkpoint(&prefix) {
                    log::warn!("resume failed, training from scratch: {e}");
                }
            }
            let cancel = Arc::new(AtomicBool::new(false));
            let handler_flag = Arc::clone(&cancel);
            ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))
                .context("installing Ctrl-C handler")?;
            let run = run_training(&mut trainer, &prefix, &cancel)?;
            if run.cancelled {
                println!("trained {} episodes before interruption", run.episodes);
            } else {
                println!("trained {} episodes", run.episodes);
            }
            print_report(&trainer);
        }
        Command::Evaluate { common, games } => {
            apply_common(&mut config, &common);
            let mut trainer = load_trained(&config, &common)?;
            let report = trainer.evaluate(games).context("evaluation aborted")?;
            println!("games: {}", report.games);
            println!("{}: {} wins", trainer.agent1().name(), report.agent1_wins);
            println!("{}: {} wins", trainer.agent2().name(), report.agent2_wins);
            println!("draws: {}", report.draws);
        }
        Command::Demo { common } => {
            apply_common(&mut config, &common);
            let mut trainer = load_trained(&config, &common)?;
            let game = trainer.play_game(false).context("demo game aborted")?;
            for (mv, state) in game.moves.iter().zip(&game.states) {
                println!("move {mv:?}");
                state.board().draw();
            }
            match game.result {
                GameResult::CrossWins => println!("{} wins", trainer.agent1().name()),
                GameResult::NoughtWins => println!("{} wins", trainer.agent2().name()),
                GameResult::Draw => println!("draw"),
            }
        }
        Command::Stats { common, window } => {
            apply_common(&mut config, &common);
            let paths = CheckpointPaths::new(&config.trainer.checkpoint_dir, &config.trainer.prefix);
            let stats = TrainingStats::load(&paths.stats)
                .with_context(|| format!("loading stats from {}", paths.stats.display()))?;
            println!("{}", stats.summary());
            let moving = stats.moving_win_rates(window);
            if let (Some(episode), Some(rate1), Some(rate2)) =
                (moving.episodes.last(), moving.agent1.last(), moving.agent2.last())
            {
                println!(
                    "moving win rate over {window} episodes at episode {episode}: agent1 {:.1}%, agent2 {:.1}%",
                    rate1 * 100.0,
                    rate2 * 100.0
                );
            }
        }
    }
    Ok(())
}
