use std::path::PathBuf;

use anyhow::Result;
use num_format::ToFormattedString;

use crate::agent::{Agent, AgentSpec, Hyperparameters};
use crate::env::EnvironmentFactory;
use crate::learn::checkpoint::{Checkpoint, CheckpointScheduler};
use crate::learn::config::RunConfig;
use crate::learn::evaluation::{EvaluationRecord, EvaluationScheduler};
use crate::learn::layout::SaveDirLayout;
use crate::learn::metrics::{EpisodeStats, ProgressWriter, UpdateRecord};
use crate::learn::scheduler::{Interval, Scheduler, StepContext};
use crate::prelude::RenderMode;
use crate::util::format::number_format;

/// Episodes covered by the rolling training statistics
const EPISODE_STATS_WINDOW: usize = 100;

/// What a finished training run leaves behind
pub struct TrainingOutcome<A> {
    pub agent: A,
    pub final_model_path: PathBuf,
    pub checkpoints: Vec<Checkpoint>,
    pub evaluations: Vec<EvaluationRecord>,
    pub best_mean_reward: Option<f32>,
}

/// Drives a complete training run: one training batch, one evaluation batch,
/// checkpoint and evaluation schedulers, the final snapshot.
pub struct TrainingOrchestrator {
    factory: EnvironmentFactory,
    config: RunConfig,
}

impl TrainingOrchestrator {
    /// Fails on an invalid configuration or unknown environment, before anything is built
    pub fn new(
        factory: EnvironmentFactory,
        config: RunConfig,
    ) -> Result<Self> {
        config.validate()?;
        factory.ensure_registered()?;
        Ok(Self { factory, config })
    }

    pub fn config(&self) -> &RunConfig { &self.config }

    pub fn run<A: Agent>(&self) -> Result<TrainingOutcome<A>> {
        let config = &self.config;
        let layout = SaveDirLayout::new(&config.save_dir);
        layout.create()?;

        let mut train_batch = self.factory.build(config.n_envs, config.seed, RenderMode::None, &config.observation)?;
        let mut eval_batch = self.factory.build(1, config.seed + 1, RenderMode::None, &config.observation)?;

        let hyperparameters = Hyperparameters {
            seed: config.seed,
            ..config.hyperparameters.clone()
        };
        let mut agent = A::build(hyperparameters, AgentSpec::of(&train_batch))?;

        let mut checkpoints = CheckpointScheduler::new(
            Interval::new(config.checkpoint_freq)?,
            &layout.checkpoints_dir(),
            &config.checkpoint_prefix,
        );
        let mut evaluations = EvaluationScheduler::new(
            Interval::new(config.eval_freq)?,
            config.eval_episodes,
            true,
            &layout.evaluation_log_path(),
            &layout.best_model_path(),
        );
        let mut progress = ProgressWriter::create(&layout.progress_path())?;
        let mut episode_stats = EpisodeStats::new(EPISODE_STATS_WINDOW);

        log::info!(
            "training '{}' for {} steps on {} instances (seed {}), saving to {}",
            self.factory.env_config().id(),
            config.total_timesteps.to_formatted_string(&number_format()),
            config.n_envs,
            config.seed,
            config.save_dir.display()
        );

        let mut observations = train_batch.reset()?;
        while agent.num_timesteps() < config.total_timesteps {
            let previous_step = agent.num_timesteps();
            let collected = agent.collect_step(&mut train_batch, &observations)?;
            for episode in collected.step.episodes.iter().flatten() {
                episode_stats.add(episode);
            }
            if let Some(stats) = collected.update {
                let record = UpdateRecord::new(agent.num_timesteps(), stats, &episode_stats);
                progress.write(&record)?;
                log_update(&record);
            }
            observations = collected.step.observations;

            let step = agent.num_timesteps();
            let mut ctx = StepContext {
                previous_step,
                step,
                agent: &mut agent,
                eval_batch: &mut eval_batch,
            };
            let schedulers: [&mut dyn Scheduler<A>; 2] = [&mut checkpoints, &mut evaluations];
            for scheduler in schedulers {
                if scheduler.maybe_fire(&mut ctx)? {
                    log::debug!("{} done at step {}", scheduler.name(), step);
                }
            }
        }

        let final_model_path = layout.final_model_path();
        agent.save(&final_model_path)?;
        log::info!("Saved final model to {}", final_model_path.display());

        train_batch.close();
        eval_batch.close();

        Ok(TrainingOutcome {
            agent,
            final_model_path,
            best_mean_reward: evaluations.best_model().best_mean_reward(),
            checkpoints: checkpoints.into_saved(),
            evaluations: evaluations.into_records(),
        })
    }
}

fn log_update(record: &UpdateRecord) {
    let number_format = number_format();
    let fmt_mean = |v: Option<f32>| v.map_or("-".to_owned(), |v| format!("{:.2}", v));
    log::info!(
        "\n\
    steps: {}, updates: {}, episodes: {}, rollout: {{ep_rew_mean: {}, ep_len_mean: {}}}\n\
    train: {{policy_loss: {:.4}, value_loss: {:.4}, entropy: {:.4}, approx_kl: {:.5}, clip_fraction: {:.3}, learning_rate: {}}}",
        record.step.to_formatted_string(&number_format),
        record.stats.n_updates.to_formatted_string(&number_format),
        record.episodes.to_formatted_string(&number_format),
        fmt_mean(record.ep_rew_mean),
        fmt_mean(record.ep_len_mean),
        record.stats.policy_loss,
        record.stats.value_loss,
        record.stats.entropy,
        record.stats.approx_kl,
        record.stats.clip_fraction,
        record.stats.learning_rate
    );
}
