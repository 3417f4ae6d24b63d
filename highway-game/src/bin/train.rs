use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pg::agent::{Hyperparameters, PpoAgent};
use pg::env::{EnvironmentFactory, ObservationConfig};
use pg::learn::{RunConfig, TrainingOrchestrator};
use pg::util::log::init_logging;

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train a PPO agent on highway-v0")]
struct Args {
    /// Environment transitions to train for
    #[arg(long, default_value_t = 200_000)]
    timesteps: u64,
    /// Parallel environment instances
    #[arg(long, default_value_t = 8)]
    n_envs: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value = "runs/ppo_highway")]
    save_dir: PathBuf,
    #[arg(long, default_value_t = 100_000)]
    checkpoint_freq: u64,
    #[arg(long, default_value_t = 50_000)]
    eval_freq: u64,
    #[arg(long, default_value_t = 5)]
    eval_episodes: usize,
    #[arg(long, default_value_t = 3e-4)]
    learning_rate: f64,
    /// Rollout length per environment instance
    #[arg(long, default_value_t = 1024)]
    n_steps: usize,
    /// Minibatch size; must evenly divide n_steps x n_envs
    #[arg(long, default_value_t = 256)]
    batch_size: usize,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = RunConfig {
        total_timesteps: args.timesteps,
        n_envs: args.n_envs,
        seed: args.seed,
        save_dir: args.save_dir,
        checkpoint_freq: args.checkpoint_freq,
        eval_freq: args.eval_freq,
        eval_episodes: args.eval_episodes,
        hyperparameters: Hyperparameters {
            learning_rate: args.learning_rate,
            n_steps: args.n_steps,
            batch_size: args.batch_size,
            ..Hyperparameters::default()
        },
        observation: ObservationConfig::default(),
        ..RunConfig::default()
    };
    let factory = EnvironmentFactory::new(highway_game::registry(), highway_game::highway_env_config()?);
    let outcome = TrainingOrchestrator::new(factory, config)?.run::<PpoAgent>()?;

    match outcome.best_mean_reward {
        Some(best) => log::info!("best mean evaluation reward: {:.2}", best),
        None => log::info!("no evaluation took place"),
    }
    Ok(())
}
