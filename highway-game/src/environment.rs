use std::fmt::{Display, Formatter};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use pg::env::EnvConfig;
use pg::error::PgError;
use pg::prelude::{Action, Environment, ModelActionType, RenderMode, RgbFrame, StepOutcome};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::console_drawer::ConsoleDrawer;
use crate::drawer::FrameDrawer;
use crate::mechanics::{HighwayMechanics, MetaAction, SIMULATION_FREQUENCY};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum HighwayAction {
    LaneLeft,
    Idle,
    LaneRight,
    Faster,
    Slower,
}

impl Action for HighwayAction {
    const ACTION_SPACE: ModelActionType = 5;

    fn numeric(&self) -> ModelActionType {
        match self {
            HighwayAction::LaneLeft => 0,
            HighwayAction::Idle => 1,
            HighwayAction::LaneRight => 2,
            HighwayAction::Faster => 3,
            HighwayAction::Slower => 4,
        }
    }

    fn try_from_numeric(value: ModelActionType) -> Result<Self> {
        match value {
            0 => Ok(HighwayAction::LaneLeft),
            1 => Ok(HighwayAction::Idle),
            2 => Ok(HighwayAction::LaneRight),
            3 => Ok(HighwayAction::Faster),
            4 => Ok(HighwayAction::Slower),
            _ => Err(PgError::environment(format!("value {} out of range", value)))?,
        }
    }
}

impl Display for HighwayAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Highway driving: change lanes and speed to drive fast, preferably on the right, without crashing.
///
/// Episodes end on a collision (terminated) or after `duration` simulated seconds (truncated).
pub struct HighwayEnvironment {
    policy_frequency: u32,
    max_steps: usize,
    render_mode: RenderMode,
    rng: StdRng,
    mechanics: HighwayMechanics,
    drawer: FrameDrawer,
    steps: usize,
    last_reward: f32,
}

impl HighwayEnvironment {
    pub fn new(
        config: &EnvConfig,
        render_mode: RenderMode,
    ) -> Result<Self> {
        if config.policy_frequency() > SIMULATION_FREQUENCY {
            return Err(PgError::config(format!(
                "policy frequency {} Hz exceeds the simulation frequency of {} Hz",
                config.policy_frequency(),
                SIMULATION_FREQUENCY
            )))?;
        }
        let mut rng = StdRng::seed_from_u64(0);
        let mechanics = HighwayMechanics::new(&mut rng);
        Ok(Self {
            policy_frequency: config.policy_frequency(),
            max_steps: config.max_episode_steps(),
            render_mode,
            rng,
            mechanics,
            drawer: FrameDrawer::default(),
            steps: 0,
            last_reward: 0.0,
        })
    }

    fn map_model_action_to_meta_action(action: HighwayAction) -> MetaAction {
        match action {
            HighwayAction::LaneLeft => MetaAction::LaneLeft,
            HighwayAction::Idle => MetaAction::Idle,
            HighwayAction::LaneRight => MetaAction::LaneRight,
            HighwayAction::Faster => MetaAction::Faster,
            HighwayAction::Slower => MetaAction::Slower,
        }
    }
}

impl Environment for HighwayEnvironment {
    fn action_space(&self) -> ModelActionType { HighwayAction::ACTION_SPACE }

    fn reset(
        &mut self,
        seed: Option<u64>,
    ) -> Result<RgbFrame> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.mechanics = HighwayMechanics::new(&mut self.rng);
        self.steps = 0;
        self.last_reward = 0.0;
        Ok(self.drawer.draw(&self.mechanics))
    }

    fn step(
        &mut self,
        action: ModelActionType,
    ) -> Result<StepOutcome> {
        let action = HighwayAction::try_from_numeric(action)?;
        self.mechanics.decision_step(Self::map_model_action_to_meta_action(action), self.policy_frequency);
        self.steps += 1;

        let reward = self.mechanics.reward();
        self.last_reward = reward;
        let terminated = self.mechanics.crashed();
        Ok(StepOutcome {
            frame: self.drawer.draw(&self.mechanics),
            reward,
            terminated,
            truncated: !terminated && self.steps >= self.max_steps,
        })
    }

    fn render(&mut self) -> Result<()> {
        if self.render_mode != RenderMode::Human {
            return Ok(());
        }
        ConsoleDrawer::render(&self.mechanics, self.steps, self.last_reward)?;
        thread::sleep(Duration::from_secs_f32(1.0 / self.policy_frequency as f32));
        Ok(())
    }
}
