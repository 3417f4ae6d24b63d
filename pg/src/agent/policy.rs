use nalgebra::{DMatrix, DVector};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Initial actor weights are drawn from `[-ACTOR_INIT_SCALE, ACTOR_INIT_SCALE]`
const ACTOR_INIT_SCALE: f32 = 0.01;

/// Linear actor-critic over a feature vector: softmax policy head and state-value head.
///
/// The same type carries gradients (see [Self::zeros_like]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearActorCritic {
    actor_weights: DMatrix<f32>,
    actor_bias: DVector<f32>,
    critic_weights: DVector<f32>,
    critic_bias: DVector<f32>,
}

impl LinearActorCritic {
    pub fn new<R: Rng>(
        num_features: usize,
        num_actions: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            actor_weights: DMatrix::from_fn(num_actions, num_features, |_, _| {
                rng.gen_range(-ACTOR_INIT_SCALE..=ACTOR_INIT_SCALE)
            }),
            actor_bias: DVector::zeros(num_actions),
            critic_weights: DVector::zeros(num_features),
            critic_bias: DVector::zeros(1),
        }
    }

    /// All-zero parameters of the same dimensions
    pub fn zeros_like(&self) -> Self {
        Self {
            actor_weights: DMatrix::zeros(self.num_actions(), self.num_features()),
            actor_bias: DVector::zeros(self.num_actions()),
            critic_weights: DVector::zeros(self.num_features()),
            critic_bias: DVector::zeros(1),
        }
    }

    pub fn num_actions(&self) -> usize { self.actor_weights.nrows() }

    pub fn num_features(&self) -> usize { self.actor_weights.ncols() }

    pub fn logits(
        &self,
        features: &DVector<f32>,
    ) -> DVector<f32> {
        &self.actor_weights * features + &self.actor_bias
    }

    /// Softmax over the action logits
    pub fn action_probs(
        &self,
        features: &DVector<f32>,
    ) -> DVector<f32> {
        softmax(&self.logits(features))
    }

    pub fn value(
        &self,
        features: &DVector<f32>,
    ) -> f32 {
        self.critic_weights.dot(features) + self.critic_bias[0]
    }

    /// Accumulates `d_logits * features^T` into the actor part
    pub fn add_actor_gradient(
        &mut self,
        d_logits: &DVector<f32>,
        features: &DVector<f32>,
    ) {
        self.actor_weights.ger(1.0, d_logits, features, 1.0);
        self.actor_bias += d_logits;
    }

    /// Accumulates `d_value * features` into the critic part
    pub fn add_critic_gradient(
        &mut self,
        d_value: f32,
        features: &DVector<f32>,
    ) {
        self.critic_weights.axpy(d_value, features, 1.0);
        self.critic_bias[0] += d_value;
    }

    pub fn scale(
        &mut self,
        factor: f32,
    ) {
        self.actor_weights *= factor;
        self.actor_bias *= factor;
        self.critic_weights *= factor;
        self.critic_bias *= factor;
    }

    /// Euclidean norm over all parameters
    pub fn norm(&self) -> f32 {
        self.parameters()
            .iter()
            .flat_map(|p| p.iter())
            .map(|v| v * v)
            .sum::<f32>()
            .sqrt()
    }

    /// Rescales to at most `max_norm`; returns the norm before clipping
    pub fn clip_norm(
        &mut self,
        max_norm: f32,
    ) -> f32 {
        let norm = self.norm();
        if norm > max_norm {
            self.scale(max_norm / (norm + 1e-6));
        }
        norm
    }

    pub fn parameters(&self) -> [&[f32]; 4] {
        [
            self.actor_weights.as_slice(),
            self.actor_bias.as_slice(),
            self.critic_weights.as_slice(),
            self.critic_bias.as_slice(),
        ]
    }

    pub fn parameters_mut(&mut self) -> [&mut [f32]; 4] {
        [
            self.actor_weights.as_mut_slice(),
            self.actor_bias.as_mut_slice(),
            self.critic_weights.as_mut_slice(),
            self.critic_bias.as_mut_slice(),
        ]
    }
}

pub fn softmax(logits: &DVector<f32>) -> DVector<f32> {
    let max = logits.max();
    let exp = logits.map(|l| (l - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Entropy of a categorical distribution
pub fn entropy(probs: &DVector<f32>) -> f32 {
    -probs.iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.ln())
        .sum::<f32>()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_softmax_is_a_distribution() {
        let probs = softmax(&DVector::from_vec(vec![1000.0, 0.0, -3.0]));
        assert!((probs.sum() - 1.0).abs() < 1e-6);
        assert!(probs[0] > 0.99);
    }

    #[test]
    fn test_uniform_entropy() {
        let probs = DVector::from_element(4, 0.25);
        assert!((entropy(&probs) - 4.0_f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_fresh_policy_is_near_uniform() {
        let mut rng = StdRng::seed_from_u64(3);
        let policy = LinearActorCritic::new(16, 5, &mut rng);
        let features = DVector::from_element(16, 0.5);
        let probs = policy.action_probs(&features);
        assert!(probs.iter().all(|&p| (p - 0.2).abs() < 0.02));
        assert_eq!(policy.value(&features), 0.0);
    }

    #[test]
    fn test_gradient_accumulation_and_clipping() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut grads = LinearActorCritic::new(2, 2, &mut rng).zeros_like();
        let features = DVector::from_vec(vec![1.0, 2.0]);
        grads.add_actor_gradient(&DVector::from_vec(vec![1.0, -1.0]), &features);
        grads.add_critic_gradient(2.0, &features);
        assert_eq!(grads.parameters()[0], &[1.0, -1.0, 2.0, -2.0]);
        assert_eq!(grads.parameters()[2], &[2.0, 4.0]);

        let norm = grads.clip_norm(1.0);
        assert!(norm > 1.0);
        assert!((grads.norm() - 1.0).abs() < 1e-4);
    }
}
