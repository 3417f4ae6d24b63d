use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use num_format::ToFormattedString;

use crate::agent::Agent;
use crate::env::{EnvironmentFactory, ObservationConfig};
use crate::error::PgError;
use crate::prelude::RenderMode;
use crate::util::format::number_format;

pub const DEFAULT_MODEL_PATH: &str = "runs/ppo_highway/ppo_highway_final.json";

pub struct PlayConfig {
    pub model_path: PathBuf,
    /// Seed of the rendering instance; random if unset
    pub seed: Option<u64>,
    pub observation: ObservationConfig,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            seed: None,
            observation: ObservationConfig::default(),
        }
    }
}

/// Lets a trained agent drive one rendered environment instance
pub struct InferenceRunner {
    factory: EnvironmentFactory,
    config: PlayConfig,
}

impl InferenceRunner {
    pub fn new(
        factory: EnvironmentFactory,
        config: PlayConfig,
    ) -> Self {
        Self { factory, config }
    }

    pub fn model_path(&self) -> &Path { &self.config.model_path }

    /// Plays with deterministic actions until `cancel` is set (forever without one).
    ///
    /// Returns the number of steps taken.
    pub fn play<A: Agent>(
        &self,
        cancel: Option<&AtomicBool>,
    ) -> Result<u64> {
        let model_path = &self.config.model_path;
        if !model_path.is_file() {
            return Err(PgError::NotFound(model_path.clone()))?;
        }
        let mut agent = A::load(model_path)?;

        let seed = self.config.seed.unwrap_or_else(rand::random);
        let mut batch = self.factory.build(1, seed, RenderMode::Human, &self.config.observation)?;
        if agent.spec().observation_shape != batch.observation_shape() || agent.spec().action_space != batch.action_space() {
            return Err(PgError::config(format!(
                "model {} expects observations {:?} and {} actions, environment provides {:?} and {}",
                model_path.display(),
                agent.spec().observation_shape,
                agent.spec().action_space,
                batch.observation_shape(),
                batch.action_space()
            )))?;
        }
        log::info!("playing '{}' (seed {}) with {}", self.factory.env_config().id(), seed, model_path.display());

        let cancelled = || cancel.map_or(false, |c| c.load(Ordering::Relaxed));
        let mut observations = batch.reset()?;
        let mut steps = 0_u64;
        while !cancelled() {
            let actions = agent.predict(&observations, true)?;
            let step = batch.step(&actions)?;
            steps += 1;
            for episode in step.episodes.iter().flatten() {
                log::info!(
                    "episode finished after {} steps with reward {:.2} (total steps: {})",
                    episode.length,
                    episode.reward,
                    steps.to_formatted_string(&number_format())
                );
            }
            observations = step.observations;
        }
        batch.close();
        Ok(steps)
    }
}
