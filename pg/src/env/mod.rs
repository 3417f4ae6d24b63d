pub use batch::{BatchStep, EnvironmentBatch, EpisodeInfo};
pub use config::{EnvConfig, ObservationConfig, GRAYSCALE_OBSERVATION};
pub use factory::EnvironmentFactory;
pub use frame_ring_buffer::FrameRingBuffer;
pub use observation::{ChannelFirstAdapter, Observation, ObservationPipeline};
pub use registry::{EnvConstructor, EnvRegistry};

mod batch;
mod config;
mod factory;
mod frame_ring_buffer;
mod observation;
mod registry;
