pub mod dump;
pub mod null;
#[cfg(feature = "opencv")]
pub mod writer;

use anyhow::Result;
use std::path::Path;

use crate::core::error::ConfigError;
use crate::shared::constants::{DUMP_EXTENSION, NULL_OUTPUT};

pub use dump::{read_dump, DumpSink, DumpSummary};
pub use null::NullSink;
#[cfg(feature = "opencv")]
pub use writer::VideoWriterSink;

/// Encode/transmit collaborator fed by the paced consumer.
///
/// Frames arrive one at a time on the consumer's thread with strictly
/// increasing timestamps (microseconds).
pub trait FrameSink {
    fn write_frame(&mut self, payload: &[u8], timestamp_us: i64) -> Result<()>;

    /// Flush and close. Called once when the consumer loop ends.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Kind of sink an output identifier selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Null,
    Dump(String),
    #[cfg(feature = "opencv")]
    Container(String),
}

impl OutputTarget {
    /// `null`, a `.fpd` frame dump, or (with OpenCV) any container path.
    pub fn parse(output: &str) -> Result<Self, ConfigError> {
        let output = output.trim();
        if output.is_empty() || output.eq_ignore_ascii_case(NULL_OUTPUT) {
            return Ok(OutputTarget::Null);
        }
        let is_dump = Path::new(output)
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case(DUMP_EXTENSION));
        if is_dump {
            return Ok(OutputTarget::Dump(output.to_string()));
        }
        Self::container(output)
    }

    #[cfg(feature = "opencv")]
    fn container(output: &str) -> Result<Self, ConfigError> {
        Ok(OutputTarget::Container(output.to_string()))
    }

    #[cfg(not(feature = "opencv"))]
    fn container(output: &str) -> Result<Self, ConfigError> {
        Err(ConfigError::FeatureDisabled(output.to_string()))
    }

    /// Build the sink for pictures of the given geometry.
    #[cfg_attr(not(feature = "opencv"), allow(unused_variables))]
    pub fn open(&self, width: u32, height: u32, fps: f64) -> Result<Box<dyn FrameSink>> {
        match self {
            OutputTarget::Null => Ok(Box::new(NullSink::new())),
            OutputTarget::Dump(path) => Ok(Box::new(DumpSink::create(Path::new(path), width, height)?)),
            #[cfg(feature = "opencv")]
            OutputTarget::Container(path) => {
                Ok(Box::new(VideoWriterSink::create(path, width, height, fps)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!(OutputTarget::parse("null").unwrap(), OutputTarget::Null);
        assert_eq!(OutputTarget::parse("").unwrap(), OutputTarget::Null);
        assert_eq!(
            OutputTarget::parse("out/run.FPD").unwrap(),
            OutputTarget::Dump("out/run.FPD".to_string())
        );
        #[cfg(not(feature = "opencv"))]
        assert!(matches!(
            OutputTarget::parse("out/run.mp4"),
            Err(ConfigError::FeatureDisabled(_))
        ));
    }
}
