use std::path::{Path, PathBuf};

use anyhow::Result;
use num_format::ToFormattedString;

use crate::agent::Agent;
use crate::error::PgError;
use crate::learn::scheduler::{Interval, Scheduler, StepContext};
use crate::util::format::number_format;

/// A persisted agent snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub step: u64,
    pub path: PathBuf,
}

/// Persists the full agent state every `interval` steps to `<dir>/<prefix>_<step>.json`.
///
/// File names carry the transition count at which the checkpoint was taken, which is
/// not an interval multiple when `n_envs` does not divide the interval.
/// Mid-episode environment state is not part of a checkpoint.
pub struct CheckpointScheduler {
    interval: Interval,
    dir: PathBuf,
    prefix: String,
    saved: Vec<Checkpoint>,
}

impl CheckpointScheduler {
    pub fn new(
        interval: Interval,
        dir: &Path,
        prefix: &str,
    ) -> Self {
        Self {
            interval,
            dir: dir.to_path_buf(),
            prefix: prefix.to_owned(),
            saved: vec![],
        }
    }

    pub fn path_for(
        &self,
        step: u64,
    ) -> PathBuf {
        self.dir.join(format!("{}_{}.json", self.prefix, step))
    }

    /// Checkpoints written so far, in step order
    pub fn saved(&self) -> &[Checkpoint] { &self.saved }

    pub fn into_saved(self) -> Vec<Checkpoint> { self.saved }
}

impl<A: Agent> Scheduler<A> for CheckpointScheduler {
    fn name(&self) -> &str { "checkpoint" }

    fn maybe_fire(
        &mut self,
        ctx: &mut StepContext<'_, A>,
    ) -> Result<bool> {
        if !self.interval.is_due(ctx.previous_step, ctx.step) {
            return Ok(false);
        }
        if let Some(last) = self.saved.last() {
            if last.step >= ctx.step {
                return Err(PgError::config(format!(
                    "checkpoint step {} does not advance past {}",
                    ctx.step, last.step
                )))?;
            }
        }
        let path = self.path_for(ctx.step);
        ctx.agent.save(&path)?;
        log::info!(
            "Saving model checkpoint to {} (step {})",
            path.display(),
            ctx.step.to_formatted_string(&number_format())
        );
        self.saved.push(Checkpoint { step: ctx.step, path });
        Ok(true)
    }
}
