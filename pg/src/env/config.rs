use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::{json, Value};

use crate::error::PgError;

/// Observation type name handed to environment providers
pub const GRAYSCALE_OBSERVATION: &str = "GrayscaleObservation";

/// How frames are shaped into observations.
///
/// Validated on construction, immutable afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationConfig {
    /// Per-channel (R, G, B) weights of the grayscale conversion
    weights: [f32; 3],
    /// Target resolution (width, height)
    observation_shape: (u32, u32),
    /// Number of most recent frames stacked along the channel axis
    stack_size: usize,
}

impl ObservationConfig {
    pub fn new(
        weights: [f32; 3],
        observation_shape: (u32, u32),
        stack_size: usize,
    ) -> Result<Self> {
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(PgError::config(format!("grayscale weights must be finite and non-negative, got {:?}", weights)))?;
        }
        if weights.iter().sum::<f32>() <= 0.0 {
            return Err(PgError::config("grayscale weights must not all be zero"))?;
        }
        if observation_shape.0 == 0 || observation_shape.1 == 0 {
            return Err(PgError::config(format!("observation shape must be non-empty, got {:?}", observation_shape)))?;
        }
        if stack_size == 0 {
            return Err(PgError::config("stack size must be at least 1"))?;
        }
        Ok(Self {
            weights,
            observation_shape,
            stack_size,
        })
    }

    pub fn weights(&self) -> [f32; 3] { self.weights }

    pub fn width(&self) -> u32 { self.observation_shape.0 }

    pub fn height(&self) -> u32 { self.observation_shape.1 }

    pub fn stack_size(&self) -> usize { self.stack_size }

    /// Channel-first shape of an observation: `[stack_size, height, width]`
    pub fn channel_first_shape(&self) -> [usize; 3] {
        [self.stack_size, self.height() as usize, self.width() as usize]
    }
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            weights: [0.2989, 0.5870, 0.1140],
            observation_shape: (84, 84),
            stack_size: 4,
        }
    }
}

/// Which environment to simulate and how its episodes are timed
#[derive(Clone, Debug, PartialEq)]
pub struct EnvConfig {
    id: String,
    /// Episode duration in seconds of simulated time
    duration: u32,
    /// Decisions per simulated second
    policy_frequency: u32,
}

impl EnvConfig {
    pub fn new(
        id: &str,
        duration: u32,
        policy_frequency: u32,
    ) -> Result<Self> {
        if id.trim().is_empty() {
            return Err(PgError::config("environment id must not be empty"))?;
        }
        if duration == 0 {
            return Err(PgError::config("episode duration must be positive"))?;
        }
        if policy_frequency == 0 {
            return Err(PgError::config("policy frequency must be positive"))?;
        }
        if duration.checked_mul(policy_frequency).is_none() {
            return Err(PgError::config(format!(
                "episode of {} s at {} decisions per second has too many steps",
                duration, policy_frequency
            )))?;
        }
        Ok(Self {
            id: id.to_owned(),
            duration,
            policy_frequency,
        })
    }

    pub fn id(&self) -> &str { &self.id }

    pub fn duration(&self) -> u32 { self.duration }

    pub fn policy_frequency(&self) -> u32 { self.policy_frequency }

    /// Number of decisions after which an episode is truncated
    pub fn max_episode_steps(&self) -> usize {
        self.duration as usize * self.policy_frequency as usize
    }

    /// The flat configuration mapping as understood by environment providers
    pub fn to_mapping(
        &self,
        observation: &ObservationConfig,
    ) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("observation.type".to_owned(), json!(GRAYSCALE_OBSERVATION)),
            ("observation.weights".to_owned(), json!(observation.weights)),
            ("observation.observation_shape".to_owned(), json!([observation.width(), observation.height()])),
            ("observation.stack_size".to_owned(), json!(observation.stack_size)),
            ("duration".to_owned(), json!(self.duration)),
            ("policy_frequency".to_owned(), json!(self.policy_frequency)),
        ])
    }
}
