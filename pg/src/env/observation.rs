use image::imageops::{self, FilterType};
use image::Luma;

use crate::env::config::ObservationConfig;
use crate::env::frame_ring_buffer::FrameRingBuffer;
use crate::prelude::{GrayFrame, RgbFrame};

/// Stacked gray frames in channel-first layout `[channels, height, width]`.
///
/// Channel 0 holds the oldest frame, the last channel the most recent one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    shape: [usize; 3],
    data: Vec<u8>,
}

impl Observation {
    pub fn new(
        shape: [usize; 3],
        data: Vec<u8>,
    ) -> Self {
        assert_eq!(shape.iter().product::<usize>(), data.len(), "data does not match shape {:?}", shape);
        Self { shape, data }
    }

    pub fn shape(&self) -> [usize; 3] { self.shape }

    pub fn channels(&self) -> usize { self.shape[0] }

    pub fn height(&self) -> usize { self.shape[1] }

    pub fn width(&self) -> usize { self.shape[2] }

    pub fn data(&self) -> &[u8] { &self.data }

    pub fn pixel(
        &self,
        channel: usize,
        y: usize,
        x: usize,
    ) -> u8 {
        self.data[(channel * self.height() + y) * self.width() + x]
    }

    /// One stacked frame (row-major)
    pub fn channel(
        &self,
        channel: usize,
    ) -> &[u8] {
        let len = self.height() * self.width();
        &self.data[channel * len..(channel + 1) * len]
    }
}

/// Converts the channel-last frame stack into the channel-first layout the policy expects
#[derive(Clone, Copy, Debug, Default)]
pub struct ChannelFirstAdapter;

impl ChannelFirstAdapter {
    /// `channel_last` is an interleaved `[height][width][channels]` block
    pub fn adapt(
        &self,
        channel_last: &[u8],
        height: usize,
        width: usize,
        channels: usize,
    ) -> Observation {
        debug_assert_eq!(channel_last.len(), height * width * channels);
        let mut data = vec![0_u8; channel_last.len()];
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    data[(c * height + y) * width + x] = channel_last[(y * width + x) * channels + c];
                }
            }
        }
        Observation::new([channels, height, width], data)
    }
}

/// Grayscale conversion, resize and frame stacking for one environment instance
#[derive(Clone, Debug)]
pub struct ObservationPipeline {
    config: ObservationConfig,
    frames: FrameRingBuffer,
    adapter: ChannelFirstAdapter,
}

impl ObservationPipeline {
    pub fn new(config: &ObservationConfig) -> Self {
        Self {
            config: config.clone(),
            frames: FrameRingBuffer::new(config.stack_size(), config.width(), config.height()),
            adapter: ChannelFirstAdapter,
        }
    }

    /// Forgets all frames of the previous episode
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Shapes `frame` and pushes it onto the stack; returns the resulting observation
    pub fn observe(
        &mut self,
        frame: &RgbFrame,
    ) -> Observation {
        let gray = grayscale(frame, self.config.weights());
        let gray = if gray.dimensions() == (self.config.width(), self.config.height()) {
            gray
        } else {
            imageops::resize(&gray, self.config.width(), self.config.height(), FilterType::Triangle)
        };
        self.frames.add(gray);
        self.current()
    }

    pub fn current(&self) -> Observation {
        self.adapter.adapt(
            &self.frames.to_channel_last(),
            self.config.height() as usize,
            self.config.width() as usize,
            self.config.stack_size(),
        )
    }
}

/// Weighted sum of the RGB channels
pub fn grayscale(
    frame: &RgbFrame,
    weights: [f32; 3],
) -> GrayFrame {
    GrayFrame::from_fn(frame.width(), frame.height(), |x, y| {
        let [r, g, b] = frame.get_pixel(x, y).0;
        let value = weights[0] * r as f32 + weights[1] * g as f32 + weights[2] * b as f32;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn test_grayscale_weights() {
        let frame = RgbFrame::from_pixel(1, 1, Rgb([100, 200, 50]));
        let gray = grayscale(&frame, [0.2989, 0.5870, 0.1140]);
        // 29.89 + 117.4 + 5.7
        assert_eq!(gray.get_pixel(0, 0).0, [153]);

        let red_only = grayscale(&frame, [1.0, 0.0, 0.0]);
        assert_eq!(red_only.get_pixel(0, 0).0, [100]);
    }

    #[test]
    fn test_adapter_transposes_to_channel_first() {
        // 1x2 image, 2 channels: pixel (0,0) = [1, 2], pixel (0,1) = [3, 4]
        let observation = ChannelFirstAdapter.adapt(&[1, 2, 3, 4], 1, 2, 2);
        assert_eq!(observation.shape(), [2, 1, 2]);
        assert_eq!(observation.channel(0), &[1, 3]);
        assert_eq!(observation.channel(1), &[2, 4]);
        assert_eq!(observation.pixel(1, 0, 1), 4);
    }

    #[test]
    fn test_pipeline_resizes_and_stacks() {
        let config = ObservationConfig::new([1.0, 0.0, 0.0], (4, 2), 3).unwrap();
        let mut pipeline = ObservationPipeline::new(&config);

        let first = pipeline.observe(&RgbFrame::from_pixel(16, 8, Rgb([10, 0, 0])));
        assert_eq!(first.shape(), [3, 2, 4]);
        assert!(first.channel(0).iter().all(|&p| p == 0));
        assert!(first.channel(1).iter().all(|&p| p == 0));
        assert!(first.channel(2).iter().all(|&p| p == 10));

        let second = pipeline.observe(&RgbFrame::from_pixel(16, 8, Rgb([20, 0, 0])));
        assert!(second.channel(1).iter().all(|&p| p == 10));
        assert!(second.channel(2).iter().all(|&p| p == 20));

        pipeline.reset();
        assert!(pipeline.current().data().iter().all(|&p| p == 0));
    }
}
