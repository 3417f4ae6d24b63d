use anyhow::Result;

use crate::env::batch::EnvironmentBatch;
use crate::env::config::{EnvConfig, ObservationConfig};
use crate::env::registry::EnvRegistry;
use crate::error::PgError;
use crate::prelude::RenderMode;

/// Builds batches of independently seeded environment instances
pub struct EnvironmentFactory {
    registry: EnvRegistry,
    env_config: EnvConfig,
}

impl EnvironmentFactory {
    pub fn new(
        registry: EnvRegistry,
        env_config: EnvConfig,
    ) -> Self {
        Self {
            registry,
            env_config,
        }
    }

    pub fn env_config(&self) -> &EnvConfig { &self.env_config }

    /// Fails with a configuration error if no provider is registered for the configured environment
    pub fn ensure_registered(&self) -> Result<()> {
        if !self.registry.contains(self.env_config.id()) {
            return Err(PgError::config(format!(
                "unknown environment '{}' (registered: [{}])",
                self.env_config.id(),
                self.registry.ids().join(", ")
            )))?;
        }
        Ok(())
    }

    /// Builds `n_instances` instances; instance `i` gets seed `base_seed + i`
    pub fn build(
        &self,
        n_instances: usize,
        base_seed: u64,
        render_mode: RenderMode,
        observation_config: &ObservationConfig,
    ) -> Result<EnvironmentBatch> {
        if n_instances < 1 {
            return Err(PgError::config(format!("n_instances must be at least 1, got {}", n_instances)))?;
        }
        if base_seed.checked_add(n_instances as u64 - 1).is_none() {
            return Err(PgError::config(format!("base seed {} too large for {} instances", base_seed, n_instances)))?;
        }
        self.ensure_registered()?;

        log::debug!(
            "building {} x '{}' (seed {}, render {:?}) with {}",
            n_instances,
            self.env_config.id(),
            base_seed,
            render_mode,
            serde_json::to_string(&self.env_config.to_mapping(observation_config))?
        );

        let envs = (0..n_instances)
            .map(|_| self.registry.make(&self.env_config, render_mode))
            .collect::<Result<Vec<_>>>()?;
        EnvironmentBatch::new(envs, base_seed, render_mode, observation_config)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::test::drive_test_environment::{test_factory, TEST_ENV_ID};

    use super::*;

    fn observation_config() -> ObservationConfig {
        ObservationConfig::new([0.2989, 0.5870, 0.1140], (6, 4), 2).unwrap()
    }

    #[test]
    fn test_seeds_are_offset_from_base_seed() -> Result<()> {
        let batch = test_factory(TEST_ENV_ID).build(4, 17, RenderMode::None, &observation_config())?;
        assert_eq!(batch.seeds(), vec![17, 18, 19, 20]);
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.observation_shape(), [2, 4, 6]);
        Ok(())
    }

    #[test]
    fn test_zero_instances_rejected() {
        let err = test_factory(TEST_ENV_ID).build(0, 0, RenderMode::None, &observation_config()).err().unwrap();
        assert!(matches!(err.downcast_ref::<PgError>(), Some(PgError::Config(_))));
    }

    #[test]
    fn test_seed_overflow_rejected() {
        let err = test_factory(TEST_ENV_ID).build(2, u64::MAX, RenderMode::None, &observation_config()).err().unwrap();
        assert!(matches!(err.downcast_ref::<PgError>(), Some(PgError::Config(_))));
    }

    #[test]
    fn test_unknown_environment_rejected() {
        let err = test_factory("racetrack-v0").build(1, 0, RenderMode::None, &observation_config()).err().unwrap();
        assert!(matches!(err.downcast_ref::<PgError>(), Some(PgError::Config(_))));
        assert!(err.to_string().contains("racetrack-v0"));
    }

    #[rstest]
    #[case(1, 0)]
    #[case(3, 42)]
    fn test_identical_builds_are_deterministic(
        #[case] n_instances: usize,
        #[case] base_seed: u64,
    ) -> Result<()> {
        let factory = test_factory(TEST_ENV_ID);
        let run = || -> Result<Vec<(Vec<Vec<u8>>, Vec<f32>, Vec<bool>)>> {
            let mut batch = factory.build(n_instances, base_seed, RenderMode::None, &observation_config())?;
            let mut trajectory = vec![];
            let observations = batch.reset()?;
            trajectory.push((observations.iter().map(|o| o.data().to_vec()).collect(), vec![], vec![]));
            for t in 0..40_usize {
                let actions: Vec<u8> = (0..n_instances).map(|i| ((t + i) % 3) as u8).collect();
                let step = batch.step(&actions)?;
                trajectory.push((
                    step.observations.iter().map(|o| o.data().to_vec()).collect(),
                    step.rewards.clone(),
                    step.dones(),
                ));
            }
            Ok(trajectory)
        };
        assert_eq!(run()?, run()?);
        Ok(())
    }

    #[test]
    fn test_lockstep_and_auto_reset() -> Result<()> {
        let mut batch = test_factory(TEST_ENV_ID).build(2, 0, RenderMode::None, &observation_config())?;
        batch.reset()?;
        let max_steps = test_factory(TEST_ENV_ID).env_config().max_episode_steps();
        let mut finished = 0;
        for _ in 0..max_steps {
            let step = batch.step(&[1, 1])?;
            assert_eq!(step.observations.len(), 2);
            assert_eq!(step.rewards.len(), 2);
            for i in 0..2 {
                assert_eq!(step.done(i), step.episodes[i].is_some());
                assert_eq!(step.done(i), step.terminal_observations[i].is_some());
                if let Some(episode) = step.episodes[i] {
                    assert_eq!(episode.length, max_steps);
                    finished += 1;
                }
            }
        }
        // staying in the middle lane never crashes, so both hit the time limit together
        assert_eq!(finished, 2);
        Ok(())
    }

    #[test]
    fn test_wrong_action_count_rejected() -> Result<()> {
        let mut batch = test_factory(TEST_ENV_ID).build(2, 0, RenderMode::None, &observation_config())?;
        batch.reset()?;
        assert!(batch.step(&[1]).is_err());
        Ok(())
    }

    #[test]
    fn test_closed_batch_refuses_steps() -> Result<()> {
        let mut batch = test_factory(TEST_ENV_ID).build(1, 0, RenderMode::None, &observation_config())?;
        batch.reset()?;
        batch.close();
        assert!(batch.is_closed());
        assert!(batch.step(&[0]).is_err());
        Ok(())
    }
}
