use std::path::PathBuf;

use lazy_static::lazy_static;
use pg::agent::Hyperparameters;
use pg::learn::RunConfig;

pub const N_ENVS: usize = 2;
pub const TOTAL_TIMESTEPS: u64 = 200;

#[rustfmt::skip]
lazy_static! {
    pub static ref MISSING_MODEL_PATH: PathBuf = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("runs/does_not_exist/ppo_highway_final.json");
}

/// A run that finishes in seconds: two rollouts, checkpoint and evaluation after each
pub fn small_run_config(save_dir: PathBuf) -> RunConfig {
    RunConfig {
        total_timesteps: TOTAL_TIMESTEPS,
        n_envs: N_ENVS,
        seed: 3,
        save_dir,
        checkpoint_freq: 100,
        eval_freq: 100,
        eval_episodes: 1,
        hyperparameters: Hyperparameters {
            n_steps: 50,
            batch_size: 50,
            n_epochs: 2,
            ..Hyperparameters::default()
        },
        ..RunConfig::default()
    }
}
