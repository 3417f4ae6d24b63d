use crate::prelude::GrayFrame;

/// The `stack_size` most recent gray frames of one environment instance
#[derive(Clone, Debug)]
pub struct FrameRingBuffer {
    frame_size_x: u32,
    frame_size_y: u32,
    buffer: Vec<GrayFrame>,
    next_slot: usize,
}

impl FrameRingBuffer {
    /// Creates a buffer filled with black frames
    pub fn new(
        stack_size: usize,
        frame_size_x: u32,
        frame_size_y: u32,
    ) -> Self {
        assert!(stack_size > 0);
        Self {
            frame_size_x,
            frame_size_y,
            buffer: (0..stack_size).map(|_| GrayFrame::new(frame_size_x, frame_size_y)).collect(),
            next_slot: 0,
        }
    }

    pub fn stack_size(&self) -> usize { self.buffer.len() }

    pub fn add(
        &mut self,
        element: GrayFrame,
    ) {
        debug_assert_eq!(element.dimensions(), (self.frame_size_x, self.frame_size_y));
        self.buffer[self.next_slot] = element;
        self.next_slot = (self.next_slot + 1) % self.buffer.len();
    }

    /// Back to black frames only
    pub fn clear(&mut self) {
        for frame in self.buffer.iter_mut() {
            frame.fill(0);
        }
        self.next_slot = 0;
    }

    /// Frames from the oldest to the most recent one
    pub fn iter_chronological(&self) -> impl Iterator<Item = &GrayFrame> {
        let len = self.buffer.len();
        (0..len).map(move |i| &self.buffer[(self.next_slot + i) % len])
    }

    /// Interleaved `[y][x][frame]` pixel block, frames ordered from oldest to most recent
    pub fn to_channel_last(&self) -> Vec<u8> {
        let stack_size = self.buffer.len();
        let mut data = vec![0_u8; self.frame_size_x as usize * self.frame_size_y as usize * stack_size];
        for (hist, frame) in self.iter_chronological().enumerate() {
            for (i, pixel) in frame.as_raw().iter().enumerate() {
                data[i * stack_size + hist] = *pixel;
            }
        }
        data
    }
}
