pub mod config;
pub mod consumer;
pub mod error;
pub mod frame_buffer;
pub mod frame_queue;
pub mod provider;
pub mod session;

pub use config::SessionConfig;
pub use consumer::{ConsumerExit, ConsumerReport, ConsumerSettings, PacedConsumer, PacingMode};
pub use error::{ConfigError, ProviderError};
pub use frame_buffer::FrameBuffer;
pub use frame_queue::BoundedFrameQueue;
pub use provider::{FrameProvider, ProducerStats, ProviderSettings, VideoProvider, VideoSource};
pub use session::{Session, SessionReport};
