use nalgebra::DVector;

use crate::prelude::ModelActionType;

/// One stored transition
pub struct Transition<'a> {
    pub features: &'a DVector<f32>,
    pub action: ModelActionType,
    pub log_prob: f32,
    pub advantage: f32,
    pub ret: f32,
}

/// On-policy experience of one rollout: `n_steps` lockstep steps of `n_envs` instances.
///
/// Entries are stored step-major, entry `step * n_envs + env`.
pub struct RolloutBuffer {
    n_steps: usize,
    n_envs: usize,
    feature_history: Vec<DVector<f32>>,
    action_history: Vec<ModelActionType>,
    reward_history: Vec<f32>,
    done_history: Vec<bool>,
    value_history: Vec<f32>,
    log_prob_history: Vec<f32>,
    advantages: Vec<f32>,
    returns: Vec<f32>,
}

impl RolloutBuffer {
    pub fn new(
        n_steps: usize,
        n_envs: usize,
    ) -> Self {
        assert!(n_steps > 0 && n_envs > 0);
        let capacity = n_steps * n_envs;
        Self {
            n_steps,
            n_envs,
            feature_history: Vec::with_capacity(capacity),
            action_history: Vec::with_capacity(capacity),
            reward_history: Vec::with_capacity(capacity),
            done_history: Vec::with_capacity(capacity),
            value_history: Vec::with_capacity(capacity),
            log_prob_history: Vec::with_capacity(capacity),
            advantages: vec![],
            returns: vec![],
        }
    }

    pub fn n_envs(&self) -> usize { self.n_envs }

    /// Number of stored transitions
    pub fn len(&self) -> usize { self.action_history.len() }

    pub fn is_empty(&self) -> bool { self.action_history.is_empty() }

    /// Number of stored lockstep steps
    pub fn steps(&self) -> usize { self.len() / self.n_envs }

    pub fn is_full(&self) -> bool { self.steps() >= self.n_steps }

    /// Adds one lockstep step. `rewards` already include bootstrapped values of truncated episodes.
    pub fn add_step(
        &mut self,
        features: Vec<DVector<f32>>,
        actions: &[ModelActionType],
        rewards: &[f32],
        dones: &[bool],
        values: &[f32],
        log_probs: &[f32],
    ) {
        assert!(!self.is_full(), "rollout buffer is full");
        let n = self.n_envs;
        assert!(
            features.len() == n
                && actions.len() == n
                && rewards.len() == n
                && dones.len() == n
                && values.len() == n
                && log_probs.len() == n
        );
        self.feature_history.extend(features);
        self.action_history.extend_from_slice(actions);
        self.reward_history.extend_from_slice(rewards);
        self.done_history.extend_from_slice(dones);
        self.value_history.extend_from_slice(values);
        self.log_prob_history.extend_from_slice(log_probs);
    }

    /// Generalized advantage estimation over the complete rollout.
    ///
    /// `last_values` are the value estimates of the observations following the last stored step.
    pub fn compute_returns_and_advantages(
        &mut self,
        last_values: &[f32],
        gamma: f32,
        gae_lambda: f32,
    ) {
        assert_eq!(last_values.len(), self.n_envs);
        let n = self.n_envs;
        let len = self.len();
        self.advantages = vec![0.0; len];
        self.returns = vec![0.0; len];

        for env in 0..n {
            let mut last_gae = 0.0;
            for step in (0..self.steps()).rev() {
                let idx = step * n + env;
                let next_value = if step + 1 == self.steps() {
                    last_values[env]
                } else {
                    self.value_history[idx + n]
                };
                let non_terminal = if self.done_history[idx] { 0.0 } else { 1.0 };
                let delta = self.reward_history[idx] + gamma * next_value * non_terminal - self.value_history[idx];
                last_gae = delta + gamma * gae_lambda * non_terminal * last_gae;
                self.advantages[idx] = last_gae;
                self.returns[idx] = last_gae + self.value_history[idx];
            }
        }
    }

    /// Requires [Self::compute_returns_and_advantages] to be called first
    pub fn get(
        &self,
        idx: usize,
    ) -> Transition<'_> {
        Transition {
            features: &self.feature_history[idx],
            action: self.action_history[idx],
            log_prob: self.log_prob_history[idx],
            advantage: self.advantages[idx],
            ret: self.returns[idx],
        }
    }

    pub fn advantages(&self) -> &[f32] { &self.advantages }

    pub fn returns(&self) -> &[f32] { &self.returns }

    pub fn clear(&mut self) {
        self.feature_history.clear();
        self.action_history.clear();
        self.reward_history.clear();
        self.done_history.clear();
        self.value_history.clear();
        self.log_prob_history.clear();
        self.advantages.clear();
        self.returns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(
        buffer: &mut RolloutBuffer,
        rewards: &[f32],
        dones: &[bool],
        values: &[f32],
    ) {
        let n = rewards.len();
        buffer.add_step(vec![DVector::zeros(1); n], &vec![0; n], rewards, dones, values, &vec![0.0; n]);
    }

    #[test]
    fn test_fills_up_by_lockstep_steps() {
        let mut buffer = RolloutBuffer::new(2, 3);
        add(&mut buffer, &[0.0; 3], &[false; 3], &[0.0; 3]);
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_full());
        add(&mut buffer, &[0.0; 3], &[false; 3], &[0.0; 3]);
        assert!(buffer.is_full());
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_discounted_returns_without_value_estimates() {
        // lambda = 1 and zero values: advantages are the plain discounted returns
        let mut buffer = RolloutBuffer::new(3, 1);
        add(&mut buffer, &[1.0], &[false], &[0.0]);
        add(&mut buffer, &[1.0], &[false], &[0.0]);
        add(&mut buffer, &[1.0], &[false], &[0.0]);
        buffer.compute_returns_and_advantages(&[10.0], 0.5, 1.0);
        assert_eq!(buffer.returns(), &[1.0 + 0.5 + 0.25 + 1.25, 1.0 + 0.5 + 2.5, 1.0 + 5.0]);
        assert_eq!(buffer.advantages(), buffer.returns());
    }

    #[test]
    fn test_episode_end_cuts_bootstrapping() {
        let mut buffer = RolloutBuffer::new(2, 2);
        add(&mut buffer, &[1.0, 1.0], &[true, false], &[0.5, 0.5]);
        add(&mut buffer, &[1.0, 1.0], &[false, false], &[0.5, 0.5]);
        buffer.compute_returns_and_advantages(&[0.0, 0.0], 1.0, 1.0);
        // instance 0 ends its episode after the first step
        assert_eq!(buffer.returns()[0], 1.0);
        assert_eq!(buffer.returns()[1], 2.0);
        assert_eq!(buffer.get(0).advantage, 0.5);
    }
}
