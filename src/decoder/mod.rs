pub mod convert;
pub mod frame_data;
pub mod synthetic;
#[cfg(feature = "opencv")]
pub mod video;

use anyhow::Result;

use crate::shared::constants::{FALLBACK_FPS, MICROS_PER_SECOND};

pub use convert::{Convert, RgbConverter};
pub use frame_data::{FrameData, PixelFormat};
pub use synthetic::{SyntheticDecoder, SyntheticSpec};
#[cfg(feature = "opencv")]
pub use video::VideoDecoder;

/// Geometry and timing of the video stream a decoder exposes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate, 0 when the container does not say
    pub fps: f64,
    /// Seconds per pts tick, as `num / den`
    pub time_base: (i64, i64),
    pub video_stream: usize,
}

impl StreamInfo {
    /// Convert a pts in time-base ticks to microseconds.
    pub fn pts_to_us(&self, pts: i64) -> i64 {
        let (num, den) = self.time_base;
        if den == 0 {
            return 0;
        }
        let us = pts as i128 * num as i128 * MICROS_PER_SECOND as i128 / den as i128;
        us.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Timestamp for the `frame_count`-th decoded frame when the stream
    /// carries no pts, spaced by the nominal frame rate.
    pub fn synthetic_us(&self, frame_count: u64) -> i64 {
        let fps = if self.fps > 0.0 { self.fps } else { FALLBACK_FPS };
        (frame_count as f64 * MICROS_PER_SECOND as f64 / fps) as i64
    }
}

/// One coded unit (packet) read from the source.
#[derive(Debug, Clone)]
pub struct CodedUnit {
    pub stream_index: usize,
    pub data: Vec<u8>,
}

/// Outcome of pulling the next coded unit.
#[derive(Debug)]
pub enum ReadStatus {
    Unit(CodedUnit),
    /// Transient failure, the read may be tried again
    Retry,
    EndOfStream,
}

/// Outcome of pulling a decoded picture.
pub enum DecodeStatus {
    Frame(FrameData),
    /// The decoder needs more input before it can output anything
    Pending,
}

/// Decode collaborator driven by the producer thread.
///
/// The calls mirror a packet/frame decoder: read a coded unit, send it,
/// then receive pictures until the decoder reports `Pending`.
pub trait Decode: Send {
    fn stream_info(&self) -> StreamInfo;

    fn read_unit(&mut self) -> ReadStatus;

    fn send_unit(&mut self, unit: &CodedUnit) -> Result<()>;

    /// Signal end of input so buffered pictures can be drained.
    fn flush(&mut self) -> Result<()>;

    fn receive_frame(&mut self) -> Result<DecodeStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(fps: f64, time_base: (i64, i64)) -> StreamInfo {
        StreamInfo { width: 4, height: 2, fps, time_base, video_stream: 0 }
    }

    #[test]
    fn test_pts_to_us() {
        let stream = info(30.0, (1, 90_000));
        assert_eq!(stream.pts_to_us(90_000), 1_000_000);
        assert_eq!(stream.pts_to_us(3_000), 33_333);
        assert_eq!(info(25.0, (1, 0)).pts_to_us(10), 0);
    }

    #[test]
    fn test_synthetic_timestamp_uses_fallback_fps() {
        assert_eq!(info(50.0, (1, 50)).synthetic_us(5), 100_000);
        assert_eq!(info(0.0, (1, 1)).synthetic_us(25), 1_000_000);
    }
}
