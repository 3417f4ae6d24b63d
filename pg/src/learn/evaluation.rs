use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use num_format::ToFormattedString;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::env::EnvironmentBatch;
use crate::error::PgError;
use crate::learn::scheduler::{Interval, Scheduler, StepContext};
use crate::util::format::number_format;
use crate::util::stats;

/// Result of one evaluation run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub step: u64,
    pub mean_reward: f32,
    /// Population standard deviation of the episode rewards
    pub std_reward: f32,
    pub episode_rewards: Vec<f32>,
    pub episode_lengths: Vec<usize>,
    pub episodes: usize,
}

impl EvaluationRecord {
    pub fn new(
        step: u64,
        episode_rewards: Vec<f32>,
        episode_lengths: Vec<usize>,
    ) -> Self {
        Self {
            step,
            mean_reward: stats::mean(&episode_rewards),
            std_reward: stats::std_dev(&episode_rewards),
            episodes: episode_rewards.len(),
            episode_rewards,
            episode_lengths,
        }
    }
}

/// Runs exactly `episodes` complete episodes on `batch` and returns their rewards and lengths.
///
/// Instance `i` of an `n` instance batch contributes `(episodes + i) / n` episodes.
pub fn evaluate<A: Agent>(
    agent: &mut A,
    batch: &mut EnvironmentBatch,
    episodes: usize,
    deterministic: bool,
) -> Result<(Vec<f32>, Vec<usize>)> {
    if episodes < 1 {
        return Err(PgError::config("evaluation needs at least one episode"))?;
    }
    let n = batch.len();
    let targets: Vec<usize> = (0..n).map(|i| (episodes + i) / n).collect();
    let mut counts = vec![0_usize; n];
    let mut rewards = Vec::with_capacity(episodes);
    let mut lengths = Vec::with_capacity(episodes);

    let mut observations = batch.reset()?;
    while counts.iter().zip(&targets).any(|(c, t)| c < t) {
        let actions = agent.predict(&observations, deterministic)?;
        let step = batch.step(&actions)?;
        for (i, episode) in step.episodes.iter().enumerate() {
            if let Some(episode) = episode {
                if counts[i] < targets[i] {
                    rewards.push(episode.reward);
                    lengths.push(episode.length);
                    counts[i] += 1;
                }
            }
        }
        observations = step.observations;
    }
    Ok((rewards, lengths))
}

/// Snapshot of the best evaluated agent of a run.
///
/// Starts empty (best mean reward −∞) with every run, even if the file already exists.
pub struct BestModelSlot {
    path: PathBuf,
    best_mean_reward: f32,
}

impl BestModelSlot {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            best_mean_reward: f32::NEG_INFINITY,
        }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// `None` before the first offer
    pub fn best_mean_reward(&self) -> Option<f32> {
        self.best_mean_reward.is_finite().then_some(self.best_mean_reward)
    }

    /// Stores `agent` if `mean_reward` strictly exceeds the best so far; returns whether it did
    pub fn offer<A: Agent>(
        &mut self,
        mean_reward: f32,
        agent: &A,
    ) -> Result<bool> {
        if !(mean_reward > self.best_mean_reward) {
            return Ok(false);
        }
        agent.save(&self.path)?;
        self.best_mean_reward = mean_reward;
        Ok(true)
    }
}

/// Evaluates the agent every `interval` steps, logs an [EvaluationRecord] and keeps the [BestModelSlot]
pub struct EvaluationScheduler {
    interval: Interval,
    episodes: usize,
    deterministic: bool,
    log_path: PathBuf,
    best_model: BestModelSlot,
    records: Vec<EvaluationRecord>,
}

impl EvaluationScheduler {
    pub fn new(
        interval: Interval,
        episodes: usize,
        deterministic: bool,
        log_path: &Path,
        best_model_path: &Path,
    ) -> Self {
        Self {
            interval,
            episodes,
            deterministic,
            log_path: log_path.to_path_buf(),
            best_model: BestModelSlot::new(best_model_path),
            records: vec![],
        }
    }

    pub fn records(&self) -> &[EvaluationRecord] { &self.records }

    pub fn best_model(&self) -> &BestModelSlot { &self.best_model }

    pub fn into_records(self) -> Vec<EvaluationRecord> { self.records }

    fn append_to_log(
        &self,
        record: &EvaluationRecord,
    ) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(PgError::from)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, record).map_err(PgError::from)?;
        writer.write_all(b"\n").map_err(PgError::from)?;
        writer.flush().map_err(PgError::from)?;
        Ok(())
    }
}

impl<A: Agent> Scheduler<A> for EvaluationScheduler {
    fn name(&self) -> &str { "evaluation" }

    fn maybe_fire(
        &mut self,
        ctx: &mut StepContext<'_, A>,
    ) -> Result<bool> {
        if !self.interval.is_due(ctx.previous_step, ctx.step) {
            return Ok(false);
        }
        let (rewards, lengths) = evaluate(&mut *ctx.agent, &mut *ctx.eval_batch, self.episodes, self.deterministic)?;
        let record = EvaluationRecord::new(ctx.step, rewards, lengths.clone());
        let lengths_f32: Vec<f32> = lengths.iter().map(|&l| l as f32).collect();

        log::info!(
            "Eval num_timesteps={}, episode_reward={:.2} +/- {:.2}",
            ctx.step.to_formatted_string(&number_format()),
            record.mean_reward,
            record.std_reward
        );
        log::info!(
            "Episode length: {:.2} +/- {:.2}",
            stats::mean(&lengths_f32),
            stats::std_dev(&lengths_f32)
        );
        self.append_to_log(&record)?;

        if self.best_model.offer(record.mean_reward, &*ctx.agent)? {
            log::info!("New best mean reward!");
        }
        self.records.push(record);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;

    use crate::agent::{AgentSpec, Hyperparameters, PpoAgent};
    use crate::env::ObservationConfig;
    use crate::prelude::RenderMode;
    use crate::test::drive_test_environment::{test_factory, TEST_ENV_ID};

    use super::*;

    fn observation_config() -> ObservationConfig {
        ObservationConfig::new([0.2989, 0.5870, 0.1140], (12, 8), 2).unwrap()
    }

    fn agent(batch: &EnvironmentBatch) -> Result<PpoAgent> {
        seeded_agent(batch, 0)
    }

    fn seeded_agent(
        batch: &EnvironmentBatch,
        seed: u64,
    ) -> Result<PpoAgent> {
        let hp = Hyperparameters {
            n_steps: 8,
            batch_size: 4,
            seed,
            ..Hyperparameters::default()
        };
        PpoAgent::build(hp, AgentSpec { n_envs: 1, ..AgentSpec::of(batch) })
    }

    #[rstest]
    #[case(1, 5)]
    #[case(2, 5)]
    #[case(3, 7)]
    fn test_runs_exactly_the_requested_episodes(
        #[case] n_instances: usize,
        #[case] episodes: usize,
    ) -> Result<()> {
        let mut batch = test_factory(TEST_ENV_ID).build(n_instances, 1, RenderMode::None, &observation_config())?;
        let mut agent = agent(&batch)?;
        let (rewards, lengths) = evaluate(&mut agent, &mut batch, episodes, true)?;
        assert_eq!(rewards.len(), episodes);
        assert_eq!(lengths.len(), episodes);
        assert!(lengths.iter().all(|&l| (1..=10).contains(&l)));
        Ok(())
    }

    #[test]
    fn test_record_statistics() {
        let record = EvaluationRecord::new(50_000, vec![1.0, 3.0], vec![10, 10]);
        assert_eq!(record.mean_reward, 2.0);
        assert_eq!(record.std_reward, 1.0);
        assert_eq!(record.episodes, 2);
    }

    #[test]
    fn test_best_model_replaced_only_on_strict_improvement() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let batch = test_factory(TEST_ENV_ID).build(1, 0, RenderMode::None, &observation_config())?;
        let first = seeded_agent(&batch, 1)?;
        let second = seeded_agent(&batch, 2)?;
        assert_ne!(first.policy(), second.policy());
        let mut slot = BestModelSlot::new(&dir.path().join("best_model.json"));
        assert_eq!(slot.best_mean_reward(), None);

        assert!(slot.offer(1.0, &first)?);
        for mean in [1.0, 0.5, -3.0] {
            assert!(!slot.offer(mean, &second)?, "offer {}", mean);
        }
        assert_eq!(PpoAgent::load(slot.path())?.policy(), first.policy());

        assert!(slot.offer(2.5, &second)?);
        assert!(!slot.offer(2.5, &first)?);
        assert_eq!(slot.best_mean_reward(), Some(2.5));
        assert_eq!(PpoAgent::load(slot.path())?.policy(), second.policy());
        Ok(())
    }

    #[test]
    fn test_first_offer_always_taken() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let batch = test_factory(TEST_ENV_ID).build(1, 0, RenderMode::None, &observation_config())?;
        let agent = agent(&batch)?;
        let mut slot = BestModelSlot::new(&dir.path().join("best_model.json"));
        assert!(slot.offer(-100.0, &agent)?);
        Ok(())
    }

    #[test]
    fn test_scheduler_appends_records() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("evaluations.jsonl");
        let mut eval_batch = test_factory(TEST_ENV_ID).build(1, 1, RenderMode::None, &observation_config())?;
        let mut agent = agent(&eval_batch)?;
        let mut scheduler = EvaluationScheduler::new(Interval::new(5)?, 3, true, &log_path, &dir.path().join("best.json"));

        for step in 1..=12_u64 {
            let mut ctx = StepContext {
                previous_step: step - 1,
                step,
                agent: &mut agent,
                eval_batch: &mut eval_batch,
            };
            scheduler.maybe_fire(&mut ctx)?;
        }
        assert_eq!(scheduler.records().iter().map(|r| r.step).collect::<Vec<_>>(), vec![5, 10]);
        assert!(scheduler.records().iter().all(|r| r.episodes == 3));
        assert!(scheduler.best_model().best_mean_reward().is_some());

        let logged = fs::read_to_string(&log_path)?
            .lines()
            .map(serde_json::from_str::<EvaluationRecord>)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(logged, scheduler.records());
        Ok(())
    }
}
