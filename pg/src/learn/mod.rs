pub use checkpoint::{Checkpoint, CheckpointScheduler};
pub use config::RunConfig;
pub use evaluation::{evaluate, BestModelSlot, EvaluationRecord, EvaluationScheduler};
pub use layout::SaveDirLayout;
pub use metrics::{EpisodeStats, ProgressWriter, UpdateRecord};
pub use orchestrator::{TrainingOrchestrator, TrainingOutcome};
pub use scheduler::{Interval, Scheduler, StepContext};

mod checkpoint;
mod config;
mod evaluation;
mod layout;
mod metrics;
mod orchestrator;
mod scheduler;
