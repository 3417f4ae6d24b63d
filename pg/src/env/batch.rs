use anyhow::Result;

use crate::env::config::ObservationConfig;
use crate::env::observation::{Observation, ObservationPipeline};
use crate::error::PgError;
use crate::prelude::{Environment, ModelActionType, RenderMode};

/// Summary of a finished episode of one instance
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpisodeInfo {
    pub reward: f32,
    pub length: usize,
}

/// Index-aligned results of one lockstep step of all instances
#[derive(Clone, Debug)]
pub struct BatchStep {
    /// Observation to act on next. For a finished episode this is already the first observation of the next one.
    pub observations: Vec<Observation>,
    pub rewards: Vec<f32>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
    /// Last observation of a finished episode
    pub terminal_observations: Vec<Option<Observation>>,
    /// Set for each instance whose episode finished in this step
    pub episodes: Vec<Option<EpisodeInfo>>,
}

impl BatchStep {
    pub fn done(
        &self,
        idx: usize,
    ) -> bool {
        self.terminated[idx] || self.truncated[idx]
    }

    pub fn dones(&self) -> Vec<bool> {
        (0..self.rewards.len()).map(|i| self.done(i)).collect()
    }
}

struct Instance {
    env: Box<dyn Environment>,
    pipeline: ObservationPipeline,
    seed: u64,
    seeded: bool,
    episode_reward: f32,
    episode_length: usize,
}

impl Instance {
    fn reset(&mut self) -> Result<Observation> {
        let seed = if self.seeded { None } else { Some(self.seed) };
        let frame = self.env.reset(seed)?;
        self.seeded = true;
        self.episode_reward = 0.0;
        self.episode_length = 0;
        self.pipeline.reset();
        Ok(self.pipeline.observe(&frame))
    }
}

/// N environment instances advanced in lockstep.
///
/// All instances share one [ObservationConfig]; instance `i` is seeded with `base_seed + i` at its first reset.
pub struct EnvironmentBatch {
    instances: Vec<Instance>,
    observation_config: ObservationConfig,
    render_mode: RenderMode,
    action_space: ModelActionType,
    closed: bool,
}

impl EnvironmentBatch {
    pub(crate) fn new(
        envs: Vec<Box<dyn Environment>>,
        base_seed: u64,
        render_mode: RenderMode,
        observation_config: &ObservationConfig,
    ) -> Result<Self> {
        let Some(first) = envs.first() else {
            return Err(PgError::config("an environment batch needs at least one instance"))?;
        };
        let action_space = first.action_space();
        if envs.iter().any(|e| e.action_space() != action_space) {
            return Err(PgError::config("all instances of a batch must share one action space"))?;
        }
        let instances = envs.into_iter()
            .enumerate()
            .map(|(i, env)| Instance {
                env,
                pipeline: ObservationPipeline::new(observation_config),
                seed: base_seed + i as u64,
                seeded: false,
                episode_reward: 0.0,
                episode_length: 0,
            })
            .collect();
        Ok(Self {
            instances,
            observation_config: observation_config.clone(),
            render_mode,
            action_space,
            closed: false,
        })
    }

    pub fn len(&self) -> usize { self.instances.len() }

    pub fn is_empty(&self) -> bool { self.instances.is_empty() }

    /// Seed of each instance (index-aligned)
    pub fn seeds(&self) -> Vec<u64> {
        self.instances.iter().map(|i| i.seed).collect()
    }

    pub fn action_space(&self) -> ModelActionType { self.action_space }

    pub fn observation_config(&self) -> &ObservationConfig { &self.observation_config }

    pub fn observation_shape(&self) -> [usize; 3] { self.observation_config.channel_first_shape() }

    pub fn is_closed(&self) -> bool { self.closed }

    /// Starts a new episode on every instance
    pub fn reset(&mut self) -> Result<Vec<Observation>> {
        self.ensure_open()?;
        let render = self.render_mode == RenderMode::Human;
        self.instances.iter_mut()
            .map(|instance| {
                let observation = instance.reset()?;
                if render {
                    instance.env.render()?;
                }
                Ok(observation)
            })
            .collect()
    }

    /// Advances every instance by exactly one decision step.
    ///
    /// Instances whose episode ended are reset before returning.
    pub fn step(
        &mut self,
        actions: &[ModelActionType],
    ) -> Result<BatchStep> {
        self.ensure_open()?;
        if actions.len() != self.instances.len() {
            return Err(PgError::config(format!(
                "expected {} actions (one per instance), got {}",
                self.instances.len(),
                actions.len()
            )))?;
        }
        if let Some(a) = actions.iter().find(|&&a| a >= self.action_space) {
            return Err(PgError::environment(format!("action {} out of range 0..{}", a, self.action_space)))?;
        }

        let render = self.render_mode == RenderMode::Human;
        let n = self.instances.len();
        let mut result = BatchStep {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            terminated: Vec::with_capacity(n),
            truncated: Vec::with_capacity(n),
            terminal_observations: Vec::with_capacity(n),
            episodes: Vec::with_capacity(n),
        };

        for (instance, &action) in self.instances.iter_mut().zip(actions) {
            let outcome = instance.env.step(action)?;
            if render {
                instance.env.render()?;
            }
            instance.episode_reward += outcome.reward;
            instance.episode_length += 1;
            let observation = instance.pipeline.observe(&outcome.frame);

            let done = outcome.terminated || outcome.truncated;
            let (observation, terminal_observation, episode) = if done {
                let episode = EpisodeInfo {
                    reward: instance.episode_reward,
                    length: instance.episode_length,
                };
                let next = instance.reset()?;
                if render {
                    instance.env.render()?;
                }
                (next, Some(observation), Some(episode))
            } else {
                (observation, None, None)
            };

            result.observations.push(observation);
            result.rewards.push(outcome.reward);
            result.terminated.push(outcome.terminated);
            result.truncated.push(outcome.truncated);
            result.terminal_observations.push(terminal_observation);
            result.episodes.push(episode);
        }
        Ok(result)
    }

    /// Releases all instances; further steps fail
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for instance in self.instances.iter_mut() {
            instance.env.close();
        }
        self.closed = true;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(PgError::environment("environment batch already closed"))?;
        }
        Ok(())
    }
}

impl Drop for EnvironmentBatch {
    fn drop(&mut self) {
        self.close()
    }
}
