use anyhow::Result;

use crate::agent::Agent;
use crate::env::EnvironmentBatch;
use crate::error::PgError;

/// Step interval of a periodic job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval(u64);

impl Interval {
    pub fn new(every: u64) -> Result<Self> {
        if every < 1 {
            return Err(PgError::config("interval must be at least 1 step"))?;
        }
        Ok(Self(every))
    }

    pub fn every(&self) -> u64 { self.0 }

    /// Whether a multiple of the interval lies in `(previous, step]`
    pub fn is_due(
        &self,
        previous: u64,
        step: u64,
    ) -> bool {
        step / self.0 > previous / self.0
    }
}

/// State handed to schedulers after each batched training step
pub struct StepContext<'a, A: Agent> {
    /// Step counter before the batched step
    pub previous_step: u64,
    pub step: u64,
    pub agent: &'a mut A,
    pub eval_batch: &'a mut EnvironmentBatch,
}

/// A job invoked synchronously between batched training steps
pub trait Scheduler<A: Agent> {
    fn name(&self) -> &str;

    /// Runs the job if it is due; returns whether it ran
    fn maybe_fire(
        &mut self,
        ctx: &mut StepContext<'_, A>,
    ) -> Result<bool>;
}
