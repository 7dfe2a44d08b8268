use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::core::frame_buffer::FrameBuffer;
use crate::core::provider::FrameProvider;
use crate::shared::constants::DEFAULT_IDLE_WAIT_MS;
use crate::sink::FrameSink;
use crate::sync::{SessionClock, TimestampSequencer};
use crate::utils::logger;

/// Whether frames wait for their presentation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingMode {
    /// Release a frame once the session clock reaches its timestamp
    #[default]
    RealTime,
    /// Release frames as soon as they are queued, e.g. when writing a file
    Unpaced,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumerSettings {
    pub pacing: PacingMode,
    /// Stop before the first frame whose timestamp reaches this value
    pub time_limit_us: Option<i64>,
    /// Longest single wait for a push or a due time. Zero busy-polls.
    pub idle_wait: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            pacing: PacingMode::RealTime,
            time_limit_us: None,
            idle_wait: Duration::from_millis(DEFAULT_IDLE_WAIT_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerExit {
    /// Producer finished and every queued frame was handled
    #[default]
    SourceEnded,
    TimeLimit,
    Cancelled,
}

/// Outcome of one consumer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumerReport {
    pub delivered: u64,
    pub write_failures: u64,
    /// Timestamps moved forward to stay strictly increasing
    pub bumped: u64,
    pub exit: ConsumerExit,
    pub last_timestamp: Option<i64>,
}

/// Drive loop that hands queued frames to a sink at their presentation time.
///
/// Runs on the caller's thread. Timestamps reaching the sink are strictly
/// increasing.
pub struct PacedConsumer {
    settings: ConsumerSettings,
    cancel: Option<Arc<AtomicBool>>,
}

impl PacedConsumer {
    pub fn new(settings: ConsumerSettings) -> Self {
        Self {
            settings,
            cancel: None,
        }
    }

    /// Exit the loop once `flag` becomes true.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }

    fn idle(&self, limit: Duration) {
        let wait = limit.min(self.settings.idle_wait);
        if wait.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(wait);
        }
    }

    /// Consume until the provider is done and drained, the time limit is
    /// reached or the cancel flag is raised. The sink is finished either way.
    pub fn run<P>(&mut self, provider: &P, sink: &mut dyn FrameSink) -> anyhow::Result<ConsumerReport>
    where
        P: FrameProvider + ?Sized,
    {
        let queue = provider.queue();
        let mut sequencer = TimestampSequencer::new();
        let mut report = ConsumerReport::default();
        let clock = SessionClock::start();
        logger::debug(&format!("consumer started: {:?}", self.settings));

        let paced = self.settings.pacing == PacingMode::RealTime;
        let exit = loop {
            // 1. Stop requests and a finished, drained source end the loop
            if self.cancelled() {
                break ConsumerExit::Cancelled;
            }
            if !provider.is_running() && queue.is_empty() {
                break ConsumerExit::SourceEnded;
            }

            // 2. Look at the head without taking it
            let head = provider.peek();
            if head.is_empty() {
                queue.wait_for_push(self.settings.idle_wait);
                continue;
            }

            // 3. Not due yet: wait a little, never past the due time
            if paced {
                let remaining = clock.until(head.timestamp());
                if !remaining.is_zero() {
                    self.idle(remaining);
                    continue;
                }
            }

            // 4. Take the head, re-checking it is due in case an eviction
            //    replaced it since the peek
            let due = |f: &FrameBuffer| !paced || f.timestamp() <= clock.elapsed_us();
            let Some(frame) = queue.pop_if(due) else {
                continue;
            };

            // 5. Sequence, apply the time limit and hand over
            let timestamp = sequencer.next(frame.timestamp());
            if let Some(limit) = self.settings.time_limit_us {
                if timestamp >= limit {
                    logger::info(&format!("time limit reached at {}us", timestamp));
                    break ConsumerExit::TimeLimit;
                }
            }

            match sink.write_frame(frame.data(), timestamp) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.write_failures += 1;
                    logger::warn(&format!("sink rejected frame at {}us: {:#}", timestamp, e));
                }
            }
            report.last_timestamp = Some(timestamp);
        };

        report.exit = exit;
        report.bumped = sequencer.bumped();
        logger::info(&format!(
            "consumer finished after {:.3}s: {:?}",
            clock.elapsed().as_secs_f64(),
            report
        ));
        sink.finish()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ProviderError;
    use crate::core::frame_queue::BoundedFrameQueue;
    use crate::decoder::StreamInfo;
    use std::time::Instant;

    /// Provider fed by hand from the test thread.
    struct ManualProvider {
        queue: BoundedFrameQueue,
        running: AtomicBool,
        /// Reported by `peek` in place of the real head, like a head that
        /// was evicted right after being looked at
        stale_head: Option<FrameBuffer>,
    }

    impl ManualProvider {
        fn with_frames(timestamps: &[i64], running: bool) -> Self {
            let queue = BoundedFrameQueue::new(100).unwrap();
            for &ts in timestamps {
                queue.push(FrameBuffer::bind(vec![ts as u8; 6], ts));
            }
            Self {
                queue,
                running: AtomicBool::new(running),
                stale_head: None,
            }
        }
    }

    impl FrameProvider for ManualProvider {
        fn init(&mut self) -> Result<StreamInfo, ProviderError> {
            Err(ProviderError::NotInitialized)
        }

        fn start(&mut self) -> Result<(), ProviderError> {
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn queue(&self) -> &BoundedFrameQueue {
            &self.queue
        }

        fn stream_info(&self) -> Option<StreamInfo> {
            None
        }

        fn last_error(&self) -> Option<String> {
            None
        }

        fn peek(&self) -> FrameBuffer {
            match &self.stale_head {
                Some(frame) => frame.clone(),
                None => self.queue.peek(),
            }
        }
    }

    /// Sink recording what it got and when.
    struct RecordingSink {
        started: Instant,
        frames: Vec<(i64, Duration)>,
        fail_on: Option<i64>,
        finished: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                started: Instant::now(),
                frames: Vec::new(),
                fail_on: None,
                finished: false,
            }
        }

        fn timestamps(&self) -> Vec<i64> {
            self.frames.iter().map(|(ts, _)| *ts).collect()
        }
    }

    impl FrameSink for RecordingSink {
        fn write_frame(&mut self, _payload: &[u8], timestamp_us: i64) -> anyhow::Result<()> {
            if self.fail_on == Some(timestamp_us) {
                anyhow::bail!("rejected");
            }
            self.frames.push((timestamp_us, self.started.elapsed()));
            Ok(())
        }

        fn finish(&mut self) -> anyhow::Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn unpaced() -> ConsumerSettings {
        ConsumerSettings {
            pacing: PacingMode::Unpaced,
            ..Default::default()
        }
    }

    #[test]
    fn test_realtime_waits_for_presentation_time() {
        let provider = ManualProvider::with_frames(&[0, 100_000, 200_000], false);
        let mut sink = RecordingSink::new();
        let report = PacedConsumer::new(ConsumerSettings::default())
            .run(&provider, &mut sink)
            .unwrap();

        assert_eq!(report.delivered, 3);
        assert_eq!(report.exit, ConsumerExit::SourceEnded);
        assert!(sink.finished);
        for (ts, at) in &sink.frames {
            assert!(at.as_micros() as i64 >= *ts, "frame {} released early at {:?}", ts, at);
        }
    }

    #[test]
    fn test_frame_not_released_before_due() {
        let provider = ManualProvider::with_frames(&[500_000], true);
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::SeqCst);
        });

        let mut sink = RecordingSink::new();
        let report = PacedConsumer::new(ConsumerSettings::default())
            .with_cancel(cancel)
            .run(&provider, &mut sink)
            .unwrap();
        trigger.join().unwrap();

        assert_eq!(report.exit, ConsumerExit::Cancelled);
        assert_eq!(report.delivered, 0);
        assert_eq!(provider.queue().len(), 1);
    }

    #[test]
    fn test_frame_released_promptly_once_due() {
        let provider = ManualProvider::with_frames(&[500_000], false);
        let mut sink = RecordingSink::new();
        let report = PacedConsumer::new(ConsumerSettings::default())
            .run(&provider, &mut sink)
            .unwrap();

        assert_eq!(report.delivered, 1);
        let (_, at) = sink.frames[0];
        assert!(at >= Duration::from_millis(500), "released early at {:?}", at);
        assert!(at < Duration::from_millis(550), "released late at {:?}", at);
    }

    #[test]
    fn test_replaced_head_is_not_released_early() {
        let mut provider = ManualProvider::with_frames(&[10_000_000], true);
        provider.stale_head = Some(FrameBuffer::bind(vec![1, 2, 3], 0));
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        });

        let mut sink = RecordingSink::new();
        let report = PacedConsumer::new(ConsumerSettings::default())
            .with_cancel(cancel)
            .run(&provider, &mut sink)
            .unwrap();
        trigger.join().unwrap();

        assert_eq!(report.delivered, 0);
        assert_eq!(provider.queue().len(), 1);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let provider = ManualProvider::with_frames(&[0, 0, 5_000, 4_000, 10_000], false);
        let mut sink = RecordingSink::new();
        let report = PacedConsumer::new(unpaced()).run(&provider, &mut sink).unwrap();

        assert_eq!(sink.timestamps(), vec![0, 1_000, 5_000, 6_000, 10_000]);
        assert_eq!(report.bumped, 2);
        assert_eq!(report.last_timestamp, Some(10_000));
    }

    #[test]
    fn test_time_limit_stops_without_delivering() {
        let provider = ManualProvider::with_frames(&[0, 40_000, 80_000, 120_000], false);
        let settings = ConsumerSettings {
            time_limit_us: Some(80_000),
            ..unpaced()
        };
        let mut sink = RecordingSink::new();
        let report = PacedConsumer::new(settings).run(&provider, &mut sink).unwrap();

        assert_eq!(report.exit, ConsumerExit::TimeLimit);
        assert_eq!(sink.timestamps(), vec![0, 40_000]);
        assert_eq!(provider.queue().len(), 1);
    }

    #[test]
    fn test_unpaced_ignores_clock() {
        let provider = ManualProvider::with_frames(&[10_000_000, 20_000_000], false);
        let mut sink = RecordingSink::new();
        let started = Instant::now();
        let report = PacedConsumer::new(unpaced()).run(&provider, &mut sink).unwrap();

        assert_eq!(report.delivered, 2);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sink_errors_are_counted_and_skipped() {
        let provider = ManualProvider::with_frames(&[0, 1_000, 2_000], false);
        let mut sink = RecordingSink::new();
        sink.fail_on = Some(1_000);
        let report = PacedConsumer::new(unpaced()).run(&provider, &mut sink).unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.write_failures, 1);
        assert_eq!(sink.timestamps(), vec![0, 2_000]);
    }

    #[test]
    fn test_waits_for_late_frames_while_running() {
        let provider = Arc::new(ManualProvider::with_frames(&[], true));
        let feeder = Arc::clone(&provider);
        let handle = thread::spawn(move || {
            for ts in [0, 1_000, 2_000] {
                thread::sleep(Duration::from_millis(20));
                feeder.queue().push(FrameBuffer::bind(vec![1, 2, 3], ts));
            }
            feeder.running.store(false, Ordering::SeqCst);
        });

        let mut sink = RecordingSink::new();
        let report = PacedConsumer::new(ConsumerSettings::default())
            .run(provider.as_ref(), &mut sink)
            .unwrap();
        handle.join().unwrap();

        assert_eq!(report.exit, ConsumerExit::SourceEnded);
        assert_eq!(sink.timestamps(), vec![0, 1_000, 2_000]);
    }

    #[test]
    fn test_pacing_mode_serde_names() {
        assert_eq!(serde_json::to_string(&PacingMode::RealTime).unwrap(), "\"realtime\"");
        let mode: PacingMode = serde_json::from_str("\"unpaced\"").unwrap();
        assert_eq!(mode, PacingMode::Unpaced);
    }
}
