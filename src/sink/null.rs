use anyhow::Result;

use super::FrameSink;
use crate::utils::logger;

/// Discards frames, keeping counts. Handy for measuring pacing alone.
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
    bytes: u64,
    last_timestamp: Option<i64>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for NullSink {
    fn write_frame(&mut self, payload: &[u8], timestamp_us: i64) -> Result<()> {
        self.frames += 1;
        self.bytes += payload.len() as u64;
        self.last_timestamp = Some(timestamp_us);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        logger::info(&format!(
            "null sink: {} frames, {} bytes, last timestamp {:?}",
            self.frames, self.bytes, self.last_timestamp
        ));
        Ok(())
    }
}
