use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use image::Rgb;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::env::{EnvConfig, EnvRegistry, EnvironmentFactory};
use crate::error::PgError;
use crate::prelude::{Action, Environment, ModelActionType, RenderMode, RgbFrame, StepOutcome};

pub const TEST_ENV_ID: &str = "drive-test-v0";

const LANES: usize = 3;
const FRAME_SIZE_X: u32 = 12;
const FRAME_SIZE_Y: u32 = 8;

/// A quite simple test environment: a car on a 3-lane road.
///
/// - starts on the middle lane
/// - each episode picks a random target lane; every step spent on it earns 1.0
/// - steering off the road terminates the episode
/// - a random obstacle pixel moves along the road (so frames depend on the seed)
pub struct DriveTestEnvironment {
    rng: StdRng,
    max_steps: usize,
    lane: usize,
    target_lane: usize,
    obstacle: (u32, u32),
    steps: usize,
    renders: Option<Arc<AtomicUsize>>,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum DriveTestAction {
    Left,
    Idle,
    Right,
}

impl Display for DriveTestAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Action for DriveTestAction {
    const ACTION_SPACE: ModelActionType = 3;

    fn numeric(&self) -> ModelActionType {
        match self {
            DriveTestAction::Left => 0,
            DriveTestAction::Idle => 1,
            DriveTestAction::Right => 2,
        }
    }

    fn try_from_numeric(value: ModelActionType) -> Result<Self> {
        match value {
            0 => Ok(DriveTestAction::Left),
            1 => Ok(DriveTestAction::Idle),
            2 => Ok(DriveTestAction::Right),
            _ => Err(PgError::environment(format!("value {} out of range", value)))?,
        }
    }
}

impl DriveTestEnvironment {
    pub fn new(config: &EnvConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(0),
            max_steps: config.max_episode_steps(),
            lane: 1,
            target_lane: 1,
            obstacle: (0, 0),
            steps: 0,
            renders: None,
        }
    }

    fn draw(&self) -> RgbFrame {
        let lane_width = FRAME_SIZE_X / LANES as u32;
        RgbFrame::from_fn(FRAME_SIZE_X, FRAME_SIZE_Y, |x, y| {
            let lane = (x / lane_width) as usize;
            if (x, y) == self.obstacle {
                Rgb([0, 0, 255])
            } else if lane == self.lane && y >= FRAME_SIZE_Y - 2 {
                Rgb([255, 0, 0])
            } else if lane == self.target_lane && y == 0 {
                Rgb([0, 255, 0])
            } else {
                Rgb([80, 80, 80])
            }
        })
    }

    fn move_obstacle(&mut self) {
        self.obstacle = (self.rng.gen_range(0..FRAME_SIZE_X), self.rng.gen_range(0..FRAME_SIZE_Y));
    }
}

impl Environment for DriveTestEnvironment {
    fn action_space(&self) -> ModelActionType { DriveTestAction::ACTION_SPACE }

    fn reset(
        &mut self,
        seed: Option<u64>,
    ) -> Result<RgbFrame> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.lane = 1;
        self.target_lane = self.rng.gen_range(0..LANES);
        self.steps = 0;
        self.move_obstacle();
        Ok(self.draw())
    }

    fn step(
        &mut self,
        action: ModelActionType,
    ) -> Result<StepOutcome> {
        self.steps += 1;
        let terminated = match DriveTestAction::try_from_numeric(action)? {
            DriveTestAction::Left if self.lane == 0 => true,
            DriveTestAction::Left => {
                self.lane -= 1;
                false
            }
            DriveTestAction::Right if self.lane == LANES - 1 => true,
            DriveTestAction::Right => {
                self.lane += 1;
                false
            }
            DriveTestAction::Idle => false,
        };
        self.move_obstacle();
        let reward = match terminated {
            true => 0.0,
            false if self.lane == self.target_lane => 1.0,
            false => 0.0,
        };
        Ok(StepOutcome {
            frame: self.draw(),
            reward,
            terminated,
            truncated: !terminated && self.steps >= self.max_steps,
        })
    }

    fn render(&mut self) -> Result<()> {
        if let Some(renders) = &self.renders {
            renders.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

pub fn test_env_config(id: &str) -> EnvConfig {
    // 10 decisions per episode
    EnvConfig::new(id, 2, 5).unwrap()
}

pub fn test_registry() -> EnvRegistry {
    let mut registry = EnvRegistry::new();
    registry.register(TEST_ENV_ID, |config, _| Ok(Box::new(DriveTestEnvironment::new(config))));
    registry
}

/// Factory for `id`; only [TEST_ENV_ID] is registered
pub fn test_factory(id: &str) -> EnvironmentFactory {
    EnvironmentFactory::new(test_registry(), test_env_config(id))
}

/// Counts renders and sets `cancel` once `cancel_after_steps` steps were taken by any instance
pub fn cancelling_factory(
    cancel: Arc<AtomicBool>,
    cancel_after_steps: usize,
    renders: Arc<AtomicUsize>,
) -> EnvironmentFactory {
    struct Cancelling {
        inner: DriveTestEnvironment,
        cancel: Arc<AtomicBool>,
        steps: usize,
        cancel_after_steps: usize,
    }

    impl Environment for Cancelling {
        fn action_space(&self) -> ModelActionType { self.inner.action_space() }

        fn reset(&mut self, seed: Option<u64>) -> Result<RgbFrame> { self.inner.reset(seed) }

        fn step(&mut self, action: ModelActionType) -> Result<StepOutcome> {
            self.steps += 1;
            if self.steps >= self.cancel_after_steps {
                self.cancel.store(true, Ordering::Relaxed);
            }
            self.inner.step(action)
        }

        fn render(&mut self) -> Result<()> { self.inner.render() }
    }

    let mut registry = EnvRegistry::new();
    registry.register(TEST_ENV_ID, move |config, render_mode| {
        let mut inner = DriveTestEnvironment::new(config);
        if render_mode == RenderMode::Human {
            inner.renders = Some(Arc::clone(&renders));
        }
        Ok(Box::new(Cancelling {
            inner,
            cancel: Arc::clone(&cancel),
            steps: 0,
            cancel_after_steps,
        }))
    });
    EnvironmentFactory::new(registry, test_env_config(TEST_ENV_ID))
}
