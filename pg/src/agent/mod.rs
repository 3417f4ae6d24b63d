use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::env::{BatchStep, EnvironmentBatch, Observation};
use crate::error::PgError;
use crate::prelude::ModelActionType;

pub use optimizer::Adam;
pub use policy::LinearActorCritic;
pub use ppo::PpoAgent;
pub use rollout_buffer::RolloutBuffer;

mod features;
mod optimizer;
mod policy;
mod ppo;
mod rollout_buffer;

/// Hyperparameters of a policy-gradient agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Rollout length: steps collected per environment instance before each update
    pub n_steps: usize,
    /// Minibatch size used by the update
    pub batch_size: usize,
    /// Passes over a rollout per update
    pub n_epochs: usize,
    pub learning_rate: f64,
    /// Discount rate for future rewards
    pub gamma: f32,
    /// Bias/variance trade-off of the generalized advantage estimate
    pub gae_lambda: f32,
    /// Clipping range of the probability ratio
    pub clip_range: f32,
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub max_grad_norm: f32,
    pub seed: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_steps: 1024,
            batch_size: 256,
            n_epochs: 10,
            learning_rate: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            ent_coef: 0.0,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            seed: 0,
        }
    }
}

impl Hyperparameters {
    /// Rejects settings an update could not work with, for a batch of `n_envs` instances
    pub fn validate(
        &self,
        n_envs: usize,
    ) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(PgError::Config(msg))? };

        if n_envs < 1 {
            return fail(format!("n_envs must be at least 1, got {}", n_envs));
        }
        if self.n_steps < 1 {
            return fail("rollout length (n_steps) must be at least 1".to_owned());
        }
        if self.batch_size <= 1 {
            return fail(format!("minibatch size must be greater than 1, got {}", self.batch_size));
        }
        let Some(rollout_size) = self.n_steps.checked_mul(n_envs) else {
            return fail(format!("rollout length x n_envs = {} x {} overflows", self.n_steps, n_envs));
        };
        if rollout_size % self.batch_size != 0 {
            return fail(format!(
                "minibatch size {} does not evenly divide rollout length x n_envs = {} x {} = {}",
                self.batch_size, self.n_steps, n_envs, rollout_size
            ));
        }
        if self.n_epochs < 1 {
            return fail("n_epochs must be at least 1".to_owned());
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return fail(format!("learning rate must be positive, got {}", self.learning_rate));
        }
        if !(0.0..=1.0).contains(&self.gamma) || !(0.0..=1.0).contains(&self.gae_lambda) {
            return fail(format!("gamma ({}) and gae_lambda ({}) must lie in [0, 1]", self.gamma, self.gae_lambda));
        }
        if !(self.clip_range > 0.0) || !(self.max_grad_norm > 0.0) {
            return fail(format!("clip_range ({}) and max_grad_norm ({}) must be positive", self.clip_range, self.max_grad_norm));
        }
        if !(self.ent_coef >= 0.0) || !(self.vf_coef >= 0.0) {
            return fail(format!("ent_coef ({}) and vf_coef ({}) must not be negative", self.ent_coef, self.vf_coef));
        }
        Ok(())
    }
}

/// What an agent gets to see of its environment batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Channel-first observation shape
    pub observation_shape: [usize; 3],
    pub action_space: ModelActionType,
    /// Number of instances of the training batch
    pub n_envs: usize,
}

impl AgentSpec {
    pub fn of(batch: &EnvironmentBatch) -> Self {
        Self {
            observation_shape: batch.observation_shape(),
            action_space: batch.action_space(),
            n_envs: batch.len(),
        }
    }
}

/// Losses and diagnostics of one policy update
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStats {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub approx_kl: f32,
    pub clip_fraction: f32,
    pub learning_rate: f64,
    pub n_updates: usize,
}

/// Outcome of one rollout-collection step
#[derive(Clone, Debug)]
pub struct CollectedStep {
    pub step: BatchStep,
    /// Set when the rollout was complete and the policy got updated
    pub update: Option<UpdateStats>,
}

/// Policy-optimization agent, trained against an [EnvironmentBatch]
pub trait Agent: Sized {
    /// Fresh agent with initial parameters
    fn build(
        hyperparameters: Hyperparameters,
        spec: AgentSpec,
    ) -> Result<Self>;

    /// Restores an agent persisted with [Self::save]
    fn load(path: &Path) -> Result<Self>;

    /// Persists parameters, optimizer state, hyperparameters and step counter
    fn save(
        &self,
        path: &Path,
    ) -> Result<()>;

    fn hyperparameters(&self) -> &Hyperparameters;

    fn spec(&self) -> &AgentSpec;

    /// Environment transitions consumed so far (grows by the batch size per step)
    fn num_timesteps(&self) -> u64;

    /// One action per observation; `deterministic` picks the most probable action instead of sampling
    fn predict(
        &mut self,
        observations: &[Observation],
        deterministic: bool,
    ) -> Result<Vec<ModelActionType>>;

    /// Acts on `observations`, steps `env` once and records the transition.
    /// Updates the policy whenever a full rollout is collected.
    fn collect_step(
        &mut self,
        env: &mut EnvironmentBatch,
        observations: &[Observation],
    ) -> Result<CollectedStep>;
}
