use std::fmt::Display;
use std::hash::Hash;

use anyhow::Result;
use image::{ImageBuffer, Luma, Rgb};

/// Data type we use to encode an `Action` to feed the model.
pub type ModelActionType = u8;

/// Frame as drawn by an environment
pub type RgbFrame = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Gray-scaled frame
pub type GrayFrame = ImageBuffer<Luma<u8>, Vec<u8>>;

pub trait Action: Display + Sized + Clone + Copy + Hash + PartialEq + Eq {
    /// Number of possible actions
    const ACTION_SPACE: ModelActionType;
    /// Identifying the Action as a unique value in range (0..Self::ACTION_SPACE)
    fn numeric(&self) -> ModelActionType;
    fn try_from_numeric(value: ModelActionType) -> Result<Self>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderMode {
    #[default]
    None,
    /// Draw every step to a display surface
    Human,
}

/// Result of a single decision step of one environment instance
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub frame: RgbFrame,
    pub reward: f32,
    /// Episode ended inside the task (e.g. crash)
    pub terminated: bool,
    /// Episode cut off from outside the task (e.g. time limit)
    pub truncated: bool,
}

/// Simulated environment instance - the world of a learning agent.
///
/// An instance is advanced one decision at a time. Observation shaping
/// (grayscale, resize, frame stacking) is not its business; it just draws frames.
pub trait Environment {
    /// Number of discrete actions accepted by [Self::step]
    fn action_space(&self) -> ModelActionType;

    /// Starts a new episode and returns its first frame.
    ///
    /// With `Some(seed)` the instance re-seeds its random source first,
    /// otherwise it continues with its current random stream.
    fn reset(
        &mut self,
        seed: Option<u64>,
    ) -> Result<RgbFrame>;

    /// Applies `action` for one decision step
    fn step(
        &mut self,
        action: ModelActionType,
    ) -> Result<StepOutcome>;

    /// Draws the current state to the display surface (human render mode)
    fn render(&mut self) -> Result<()>;

    /// Releases resources held by the instance
    fn close(&mut self) {}
}
