use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Result;
use nalgebra::DVector;
use num_format::ToFormattedString;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::agent::features::{FeatureExtractor, POOL_SIZE};
use crate::agent::optimizer::Adam;
use crate::agent::policy::{entropy, LinearActorCritic};
use crate::agent::rollout_buffer::RolloutBuffer;
use crate::agent::{Agent, AgentSpec, CollectedStep, Hyperparameters, UpdateStats};
use crate::env::{EnvironmentBatch, Observation};
use crate::error::PgError;
use crate::prelude::ModelActionType;
use crate::util::format::number_format;
use crate::util::stats;

/// Format version of persisted agents
pub const SNAPSHOT_VERSION: u32 = 1;

/// Lower bound for probabilities going into a logarithm
const MIN_PROB: f32 = 1e-8;

#[derive(Serialize, Deserialize)]
struct AgentSnapshot {
    version: u32,
    algorithm: String,
    hyperparameters: Hyperparameters,
    spec: AgentSpec,
    extractor: FeatureExtractor,
    num_timesteps: u64,
    n_updates: usize,
    policy: LinearActorCritic,
    optimizer: Adam,
}

/// Proximal policy optimization with a clipped surrogate objective
/// on top of a [LinearActorCritic] over pooled observation features.
pub struct PpoAgent {
    hyperparameters: Hyperparameters,
    spec: AgentSpec,
    extractor: FeatureExtractor,
    policy: LinearActorCritic,
    optimizer: Adam,
    rollout: RolloutBuffer,
    rng: StdRng,
    num_timesteps: u64,
    n_updates: usize,
}

impl PpoAgent {
    const ALGORITHM: &'static str = "ppo";

    /// Number of gradient steps applied so far
    pub fn n_updates(&self) -> usize { self.n_updates }

    pub fn policy(&self) -> &LinearActorCritic { &self.policy }

    fn features(
        &self,
        observations: &[Observation],
    ) -> Result<Vec<DVector<f32>>> {
        observations.iter().map(|o| self.extractor.extract(o)).collect()
    }

    fn select_action(
        &mut self,
        probs: &DVector<f32>,
        deterministic: bool,
    ) -> Result<usize> {
        if deterministic {
            return Ok(probs.imax());
        }
        let distribution = WeightedIndex::<f32>::new(probs.iter())
            .map_err(|e| PgError::environment(format!("invalid action distribution {:?}: {}", probs.as_slice(), e)))?;
        Ok(distribution.sample(&mut self.rng))
    }

    fn check_model(
        spec: &AgentSpec,
        extractor: &FeatureExtractor,
        policy: &LinearActorCritic,
    ) -> Result<()> {
        if policy.num_features() != extractor.feature_len() || policy.num_actions() != spec.action_space as usize {
            return Err(PgError::config(format!(
                "policy dimensions {}x{} do not fit {} features and {} actions",
                policy.num_actions(),
                policy.num_features(),
                extractor.feature_len(),
                spec.action_space
            )))?;
        }
        Ok(())
    }

    /// Epochs of shuffled minibatch gradient steps over the completed rollout
    fn train(&mut self) -> UpdateStats {
        let hp = self.hyperparameters.clone();
        let clip_range = hp.clip_range;
        let mut indices: Vec<usize> = (0..self.rollout.len()).collect();

        let mut policy_losses = vec![];
        let mut value_losses = vec![];
        let mut entropies = vec![];
        let mut approx_kls = vec![];
        let mut clipped = 0_usize;
        let mut samples = 0_usize;

        for _ in 0..hp.n_epochs {
            indices.shuffle(&mut self.rng);
            for minibatch in indices.chunks(hp.batch_size) {
                let advantages: Vec<f32> = minibatch.iter().map(|&i| self.rollout.advantages()[i]).collect();
                let advantage_mean = stats::mean(&advantages);
                let advantage_std = stats::std_dev(&advantages);

                let mut grads = self.policy.zeros_like();
                for (k, &idx) in minibatch.iter().enumerate() {
                    let transition = self.rollout.get(idx);
                    let advantage = (advantages[k] - advantage_mean) / (advantage_std + 1e-8);

                    let probs = self.policy.action_probs(transition.features);
                    let action = transition.action as usize;
                    let log_prob = probs[action].max(MIN_PROB).ln();
                    let log_ratio = log_prob - transition.log_prob;
                    let ratio = log_ratio.exp();
                    let clipped_ratio = ratio.clamp(1.0 - clip_range, 1.0 + clip_range);
                    policy_losses.push(-(ratio * advantage).min(clipped_ratio * advantage));
                    approx_kls.push((ratio - 1.0) - log_ratio);
                    if (ratio - 1.0).abs() > clip_range {
                        clipped += 1;
                    }
                    let h = entropy(&probs);
                    entropies.push(h);

                    // surrogate term contributes only while its unclipped branch is the minimum
                    let surrogate_active = !((advantage > 0.0 && ratio > 1.0 + clip_range)
                        || (advantage < 0.0 && ratio < 1.0 - clip_range));
                    let mut d_logits = DVector::zeros(probs.len());
                    for j in 0..probs.len() {
                        let p = probs[j];
                        let indicator = if j == action { 1.0 } else { 0.0 };
                        if surrogate_active {
                            d_logits[j] -= advantage * ratio * (indicator - p);
                        }
                        d_logits[j] += hp.ent_coef * p * (p.max(MIN_PROB).ln() + h);
                    }
                    grads.add_actor_gradient(&d_logits, transition.features);

                    let value = self.policy.value(transition.features);
                    value_losses.push((transition.ret - value).powi(2));
                    grads.add_critic_gradient(2.0 * hp.vf_coef * (value - transition.ret), transition.features);
                }
                samples += minibatch.len();

                grads.scale(1.0 / minibatch.len() as f32);
                grads.clip_norm(hp.max_grad_norm);
                let grad_slices = grads.parameters();
                self.optimizer.step(&mut self.policy.parameters_mut(), &grad_slices, hp.learning_rate as f32);
                self.n_updates += 1;
            }
        }

        let stats = UpdateStats {
            policy_loss: stats::mean(&policy_losses),
            value_loss: stats::mean(&value_losses),
            entropy: stats::mean(&entropies),
            approx_kl: stats::mean(&approx_kls),
            clip_fraction: clipped as f32 / samples.max(1) as f32,
            learning_rate: hp.learning_rate,
            n_updates: self.n_updates,
        };
        log::debug!(
            "update at {} steps: policy_loss={:.4}, value_loss={:.4}, entropy={:.4}, approx_kl={:.5}, clip_fraction={:.3}",
            self.num_timesteps.to_formatted_string(&number_format()),
            stats.policy_loss,
            stats.value_loss,
            stats.entropy,
            stats.approx_kl,
            stats.clip_fraction
        );
        stats
    }
}

impl Agent for PpoAgent {
    fn build(
        hyperparameters: Hyperparameters,
        spec: AgentSpec,
    ) -> Result<Self> {
        hyperparameters.validate(spec.n_envs)?;
        if spec.action_space < 1 {
            return Err(PgError::config("action space must not be empty"))?;
        }
        let mut rng = StdRng::seed_from_u64(hyperparameters.seed);
        let extractor = FeatureExtractor::new(spec.observation_shape, POOL_SIZE);
        let policy = LinearActorCritic::new(extractor.feature_len(), spec.action_space as usize, &mut rng);
        let optimizer = Adam::new(&policy.parameters().map(|p| p.len()));
        let rollout = RolloutBuffer::new(hyperparameters.n_steps, spec.n_envs);
        Ok(Self {
            hyperparameters,
            spec,
            extractor,
            policy,
            optimizer,
            rollout,
            rng,
            num_timesteps: 0,
            n_updates: 0,
        })
    }

    fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PgError::NotFound(path.to_path_buf()))?;
        }
        let file = File::open(path).map_err(PgError::from)?;
        let snapshot: AgentSnapshot = serde_json::from_reader(BufReader::new(file)).map_err(PgError::from)?;
        if snapshot.version != SNAPSHOT_VERSION || snapshot.algorithm != Self::ALGORITHM {
            return Err(PgError::config(format!(
                "{}: unsupported model format '{}' v{}",
                path.display(),
                snapshot.algorithm,
                snapshot.version
            )))?;
        }
        Self::check_model(&snapshot.spec, &snapshot.extractor, &snapshot.policy)?;
        let rng = StdRng::seed_from_u64(snapshot.hyperparameters.seed.wrapping_add(snapshot.num_timesteps));
        let rollout = RolloutBuffer::new(snapshot.hyperparameters.n_steps, snapshot.spec.n_envs);
        log::debug!(
            "loaded model from {} ({} steps trained)",
            path.display(),
            snapshot.num_timesteps.to_formatted_string(&number_format())
        );
        Ok(Self {
            hyperparameters: snapshot.hyperparameters,
            spec: snapshot.spec,
            extractor: snapshot.extractor,
            policy: snapshot.policy,
            optimizer: snapshot.optimizer,
            rollout,
            rng,
            num_timesteps: snapshot.num_timesteps,
            n_updates: snapshot.n_updates,
        })
    }

    fn save(
        &self,
        path: &Path,
    ) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(PgError::from)?;
        }
        let snapshot = AgentSnapshot {
            version: SNAPSHOT_VERSION,
            algorithm: Self::ALGORITHM.to_owned(),
            hyperparameters: self.hyperparameters.clone(),
            spec: self.spec.clone(),
            extractor: self.extractor.clone(),
            num_timesteps: self.num_timesteps,
            n_updates: self.n_updates,
            policy: self.policy.clone(),
            optimizer: self.optimizer.clone(),
        };
        let mut writer = BufWriter::new(File::create(path).map_err(PgError::from)?);
        serde_json::to_writer(&mut writer, &snapshot).map_err(PgError::from)?;
        writer.flush().map_err(PgError::from)?;
        Ok(())
    }

    fn hyperparameters(&self) -> &Hyperparameters { &self.hyperparameters }

    fn spec(&self) -> &AgentSpec { &self.spec }

    fn num_timesteps(&self) -> u64 { self.num_timesteps }

    fn predict(
        &mut self,
        observations: &[Observation],
        deterministic: bool,
    ) -> Result<Vec<ModelActionType>> {
        let features = self.features(observations)?;
        features.iter()
            .map(|f| {
                let probs = self.policy.action_probs(f);
                Ok(self.select_action(&probs, deterministic)? as ModelActionType)
            })
            .collect()
    }

    fn collect_step(
        &mut self,
        env: &mut EnvironmentBatch,
        observations: &[Observation],
    ) -> Result<CollectedStep> {
        let n = self.rollout.n_envs();
        if env.len() != n || observations.len() != n {
            return Err(PgError::config(format!(
                "agent was built for {} instances, got a batch of {} with {} observations",
                n,
                env.len(),
                observations.len()
            )))?;
        }

        let features = self.features(observations)?;
        let mut actions = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        let mut log_probs = Vec::with_capacity(n);
        for f in features.iter() {
            let probs = self.policy.action_probs(f);
            let action = self.select_action(&probs, false)?;
            log_probs.push(probs[action].max(MIN_PROB).ln());
            values.push(self.policy.value(f));
            actions.push(action as ModelActionType);
        }

        let step = env.step(&actions)?;
        self.num_timesteps += n as u64;

        // time-limit cut-offs keep the value of the state they were cut off in
        let mut rewards = step.rewards.clone();
        for i in 0..n {
            if step.truncated[i] && !step.terminated[i] {
                if let Some(terminal) = &step.terminal_observations[i] {
                    rewards[i] += self.hyperparameters.gamma * self.policy.value(&self.extractor.extract(terminal)?);
                }
            }
        }
        self.rollout.add_step(features, &actions, &rewards, &step.dones(), &values, &log_probs);

        let update = if self.rollout.is_full() {
            let last_values = self.features(&step.observations)?
                .iter()
                .map(|f| self.policy.value(f))
                .collect::<Vec<_>>();
            self.rollout.compute_returns_and_advantages(
                &last_values,
                self.hyperparameters.gamma,
                self.hyperparameters.gae_lambda,
            );
            let stats = self.train();
            self.rollout.clear();
            Some(stats)
        } else {
            None
        };

        Ok(CollectedStep { step, update })
    }
}
