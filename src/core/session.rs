use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::core::config::SessionConfig;
use crate::core::consumer::{ConsumerReport, PacedConsumer};
use crate::core::provider::{FrameProvider, ProducerStats, VideoProvider, VideoSource};
use crate::decoder::StreamInfo;
use crate::sink::OutputTarget;
use crate::utils::logger;

/// Summary of one finished session.
#[derive(Debug, Clone, Copy)]
pub struct SessionReport {
    pub stream: StreamInfo,
    pub output_size: (u32, u32),
    pub output_fps: f64,
    pub producer: Option<ProducerStats>,
    pub consumer: ConsumerReport,
    pub evicted: u64,
}

/// One source → queue → paced consumer → sink run.
///
/// Owns every part for the duration of `run` and tears them down in order:
/// the producer is joined before the decoder and the sink are released.
pub struct Session {
    config: SessionConfig,
    cancel: Arc<AtomicBool>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that ends the run early when set, e.g. from a Ctrl-C handler.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run(&mut self) -> Result<SessionReport> {
        let source = VideoSource::parse(&self.config.source)?;
        let described = source.describe();
        let mut provider = VideoProvider::new(source, self.config.provider_settings())?;

        let stream = provider
            .init()
            .with_context(|| format!("Failed to initialize source {}", described))?;
        let output_size = provider
            .output_size()
            .ok_or_else(|| anyhow!("source {} reported no picture size", described))?;
        let output_fps = provider.fps();

        let target = OutputTarget::parse(&self.config.output)?;
        let mut sink = target
            .open(output_size.0, output_size.1, output_fps)
            .with_context(|| format!("Failed to open output {}", self.config.output))?;

        logger::info(&format!(
            "session: {} -> {} {}x{} @ {:.2}fps, pacing {:?}",
            described, self.config.output, output_size.0, output_size.1, output_fps, self.config.pacing
        ));

        provider.start()?;
        let consumed = PacedConsumer::new(self.config.consumer_settings())
            .with_cancel(self.cancel_flag())
            .run(&provider, &mut *sink);
        let evicted = provider.queue().evicted();
        provider.stop();
        drop(sink);

        let consumer = consumed?;
        let report = SessionReport {
            stream,
            output_size,
            output_fps,
            producer: provider.last_run(),
            consumer,
            evicted,
        };
        logger::info(&format!("session finished: {:?}", report));
        Ok(report)
    }
}

/// Load a config file when given, else start from defaults.
pub fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => Ok(SessionConfig::load(path)?),
        None => Ok(SessionConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consumer::{ConsumerExit, PacingMode};
    use crate::core::provider::ProducerEnd;
    use crate::sink::read_dump;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    fn dump_path(name: &str) -> String {
        let dir = std::env::temp_dir().join("framepace_session_tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name).to_string_lossy().to_string()
    }

    #[test]
    fn test_unpaced_session_writes_every_frame() {
        let output = dump_path("unpaced.fpd");
        let config = SessionConfig {
            source: "synthetic:8x4@25/12".to_string(),
            output: output.clone(),
            pacing: PacingMode::Unpaced,
            ..Default::default()
        };
        let report = Session::new(config).unwrap().run().unwrap();

        assert_eq!(report.consumer.exit, ConsumerExit::SourceEnded);
        assert_eq!(report.consumer.delivered, 12);
        assert_eq!(report.producer.unwrap().end, ProducerEnd::EndOfStream);

        let dump = read_dump(Path::new(&output)).unwrap();
        assert_eq!((dump.width, dump.height), (8, 4));
        let timestamps = dump.timestamps();
        assert_eq!(timestamps.len(), 12);
        assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
        assert!(dump.frames.iter().all(|f| f.byte_size() == 8 * 4 * 3));
    }

    #[test]
    fn test_realtime_session_takes_stream_duration() {
        let config = SessionConfig {
            source: "synthetic:4x4@50/10".to_string(),
            ..Default::default()
        };
        let started = Instant::now();
        let report = Session::new(config).unwrap().run().unwrap();

        // Last frame is due at 180ms
        assert!(started.elapsed() >= Duration::from_millis(180));
        assert_eq!(report.consumer.delivered, 10);
        assert_eq!(report.consumer.last_timestamp, Some(180_000));
    }

    #[test]
    fn test_scaled_output_with_frame_interval() {
        let output = dump_path("scaled.fpd");
        let config = SessionConfig {
            source: "synthetic:16x8@20/8".to_string(),
            output: output.clone(),
            pacing: PacingMode::Unpaced,
            frame_interval: 2,
            output_width: Some(8),
            output_height: Some(4),
            ..Default::default()
        };
        let report = Session::new(config).unwrap().run().unwrap();
        assert_eq!(report.output_size, (8, 4));
        assert_eq!(report.output_fps, 10.0);
        assert_eq!(report.consumer.delivered, 4);

        let dump = read_dump(Path::new(&output)).unwrap();
        assert!(dump.frames.iter().all(|f| f.byte_size() == 8 * 4 * 3));
    }

    #[test]
    fn test_time_limit_and_cancel() {
        let config = SessionConfig {
            source: "synthetic:4x4@100".to_string(),
            pacing: PacingMode::Unpaced,
            time_limit_us: Some(200_000),
            ..Default::default()
        };
        let report = Session::new(config.clone()).unwrap().run().unwrap();
        assert_eq!(report.consumer.exit, ConsumerExit::TimeLimit);
        assert_eq!(report.consumer.last_timestamp, Some(190_000));

        let mut session = Session::new(SessionConfig { time_limit_us: None, ..config }).unwrap();
        session.cancel_flag().store(true, Ordering::SeqCst);
        let report = session.run().unwrap();
        assert_eq!(report.consumer.exit, ConsumerExit::Cancelled);
        assert_eq!(report.consumer.delivered, 0);
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let config = SessionConfig {
            source: "synthetic:4x4@10".to_string(),
            capacity: 0,
            ..Default::default()
        };
        assert!(Session::new(config).is_err());
        assert!(Session::new(SessionConfig::default()).is_err());
    }
}
