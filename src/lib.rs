//! Bounded frame queue and real-time pacing pipeline.
//!
//! A background producer decodes pictures into a fixed-capacity queue that
//! evicts its oldest frame when full; a paced consumer hands each frame to
//! a sink once the session clock reaches its timestamp.

pub mod core;
pub mod decoder;
pub mod shared;
pub mod sink;
pub mod sync;
pub mod utils;
