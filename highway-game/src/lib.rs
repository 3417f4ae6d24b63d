use anyhow::Result;
use pg::env::{EnvConfig, EnvRegistry};

use crate::environment::HighwayEnvironment;

pub mod console_drawer;
pub mod drawer;
pub mod environment;
pub mod mechanics;

pub const HIGHWAY_ENV_ID: &str = "highway-v0";

/// Episode length in simulated seconds
pub const DEFAULT_DURATION: u32 = 40;
/// Decisions per simulated second
pub const DEFAULT_POLICY_FREQUENCY: u32 = 5;

/// `highway-v0` with 40 second episodes and 5 decisions per second
pub fn highway_env_config() -> Result<EnvConfig> {
    EnvConfig::new(HIGHWAY_ENV_ID, DEFAULT_DURATION, DEFAULT_POLICY_FREQUENCY)
}

/// Registers the highway environment provider as [HIGHWAY_ENV_ID]
pub fn register(registry: &mut EnvRegistry) {
    registry.register(HIGHWAY_ENV_ID, |config, render_mode| {
        Ok(Box::new(HighwayEnvironment::new(config, render_mode)?))
    });
}

/// A registry knowing all environments of this crate
pub fn registry() -> EnvRegistry {
    let mut registry = EnvRegistry::new();
    register(&mut registry);
    registry
}

#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    let _ = env_logger::builder()
        .format_timestamp_secs()
        .filter_level(log::LevelFilter::Debug)
        .parse_default_env()
        .is_test(true)
        .try_init();
}
