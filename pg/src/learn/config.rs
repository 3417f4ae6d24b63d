use std::path::PathBuf;

use anyhow::Result;

use crate::agent::Hyperparameters;
use crate::env::ObservationConfig;
use crate::error::PgError;

pub struct RunConfig {
    /// Environment transitions to train for
    pub total_timesteps: u64,
    /// Parallel instances of the training batch
    pub n_envs: usize,
    /// Base seed of the training batch; the evaluation batch uses `seed + 1`.
    /// Also seeds the agent (overrides `hyperparameters.seed`).
    pub seed: u64,
    pub save_dir: PathBuf,
    pub checkpoint_freq: u64,
    pub checkpoint_prefix: String,
    pub eval_freq: u64,
    pub eval_episodes: usize,
    pub hyperparameters: Hyperparameters,
    pub observation: ObservationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_timesteps: 200_000,
            n_envs: 8,
            seed: 0,
            save_dir: PathBuf::from("runs/ppo_highway"),
            checkpoint_freq: 100_000,
            checkpoint_prefix: "ppo_highway".to_owned(),
            eval_freq: 50_000,
            eval_episodes: 5,
            hyperparameters: Hyperparameters::default(),
            observation: ObservationConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(PgError::Config(msg))? };

        if self.total_timesteps < 1 {
            return fail("total_timesteps must be at least 1".to_owned());
        }
        if self.n_envs < 1 {
            return fail(format!("n_envs must be at least 1, got {}", self.n_envs));
        }
        if self.seed.checked_add(self.n_envs as u64).is_none() {
            return fail(format!("seed {} too large for {} instances", self.seed, self.n_envs));
        }
        if self.checkpoint_freq < 1 || self.eval_freq < 1 {
            return fail(format!(
                "checkpoint_freq ({}) and eval_freq ({}) must be at least 1",
                self.checkpoint_freq, self.eval_freq
            ));
        }
        if self.eval_episodes < 1 {
            return fail("eval_episodes must be at least 1".to_owned());
        }
        if self.checkpoint_prefix.is_empty() || self.checkpoint_prefix.contains(std::path::is_separator) {
            return fail(format!("invalid checkpoint prefix '{}'", self.checkpoint_prefix));
        }
        self.hyperparameters.validate(self.n_envs)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.observation.channel_first_shape(), [4, 84, 84]);
    }

    #[rstest]
    #[case::no_steps(RunConfig { total_timesteps: 0, ..RunConfig::default() })]
    #[case::no_envs(RunConfig { n_envs: 0, ..RunConfig::default() })]
    #[case::no_checkpoint_freq(RunConfig { checkpoint_freq: 0, ..RunConfig::default() })]
    #[case::no_eval_episodes(RunConfig { eval_episodes: 0, ..RunConfig::default() })]
    #[case::seed_overflow(RunConfig { seed: u64::MAX, ..RunConfig::default() })]
    #[case::bad_prefix(RunConfig { checkpoint_prefix: "a/b".to_owned(), ..RunConfig::default() })]
    #[case::indivisible_minibatch(RunConfig {
        n_envs: 3,
        hyperparameters: Hyperparameters { n_steps: 100, batch_size: 64, ..Hyperparameters::default() },
        ..RunConfig::default()
    })]
    #[case::rollout_overflow(RunConfig {
        n_envs: 8,
        hyperparameters: Hyperparameters { n_steps: usize::MAX / 4, batch_size: 2, ..Hyperparameters::default() },
        ..RunConfig::default()
    })]
    fn test_invalid_config_rejected(#[case] config: RunConfig) {
        let err = config.validate().err().unwrap();
        assert!(matches!(err.downcast_ref::<PgError>(), Some(PgError::Config(_))));
    }
}
