use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pg::agent::PpoAgent;
use pg::env::{EnvironmentFactory, ObservationConfig};
use pg::play::{InferenceRunner, PlayConfig, DEFAULT_MODEL_PATH};
use pg::util::log::init_logging;

#[derive(Parser, Debug)]
#[command(name = "play", about = "Let a trained PPO agent drive on highway-v0 (runs until interrupted)")]
struct Args {
    /// Trained model, as written by `train`
    #[arg(long, default_value = DEFAULT_MODEL_PATH)]
    model: PathBuf,
    /// Seed of the environment; random if omitted
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let factory = EnvironmentFactory::new(highway_game::registry(), highway_game::highway_env_config()?);
    let runner = InferenceRunner::new(
        factory,
        PlayConfig {
            model_path: args.model,
            seed: args.seed,
            observation: ObservationConfig::default(),
        },
    );
    runner.play::<PpoAgent>(None)?;
    Ok(())
}
