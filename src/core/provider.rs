use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::core::error::{ConfigError, ProviderError};
use crate::core::frame_buffer::FrameBuffer;
use crate::core::frame_queue::BoundedFrameQueue;
use crate::decoder::{
    Convert, Decode, DecodeStatus, ReadStatus, RgbConverter, StreamInfo, SyntheticDecoder,
    SyntheticSpec,
};
use crate::shared::constants::{
    CAMERA_SCHEME, DEFAULT_FRAME_INTERVAL, DEFAULT_MAX_READ_RETRIES, DEFAULT_QUEUE_CAPACITY,
    PRODUCER_BACKOFF_MS, SYNTHETIC_SCHEME,
};
use crate::utils::logger;

/// A background frame producer paired with the queue it feeds.
///
/// Lifecycle is `init` (open the source, may fail) → `start` (spawn the
/// producer) → `stop` (join and drain). The consumer only needs `peek`,
/// `pop`, the queue's wait and `is_running`.
pub trait FrameProvider {
    fn init(&mut self) -> Result<StreamInfo, ProviderError>;

    fn start(&mut self) -> Result<(), ProviderError>;

    /// Idempotent. Blocks until the producer thread has exited.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    fn queue(&self) -> &BoundedFrameQueue;

    fn stream_info(&self) -> Option<StreamInfo>;

    /// Message of the most recent failure, for the driving code to report.
    fn last_error(&self) -> Option<String>;

    fn pop(&self) -> FrameBuffer {
        self.queue().pop()
    }

    fn peek(&self) -> FrameBuffer {
        self.queue().peek()
    }
}

/// Where a `VideoProvider` gets its pictures from.
pub enum VideoSource {
    Synthetic(SyntheticSpec),
    #[cfg(feature = "opencv")]
    File(String),
    #[cfg(feature = "opencv")]
    Camera(i32),
    /// A decoder built by the caller; consumed by the first `init`
    Decoder(Option<Box<dyn Decode>>),
}

impl VideoSource {
    /// `synthetic:WxH@FPS[/N]`, `camera:INDEX`, otherwise a file path or URL.
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(ConfigError::Invalid {
                field: "source",
                reason: "empty source".to_string(),
            });
        }
        if uri.starts_with(SYNTHETIC_SCHEME) {
            return SyntheticSpec::parse(uri).map(VideoSource::Synthetic);
        }
        if let Some(index) = uri.strip_prefix(CAMERA_SCHEME) {
            let index: i32 = index
                .trim()
                .parse()
                .map_err(|_| ConfigError::UnknownSource(uri.to_string()))?;
            return Self::camera(index, uri);
        }
        Self::file(uri)
    }

    #[cfg(feature = "opencv")]
    fn camera(index: i32, _uri: &str) -> Result<Self, ConfigError> {
        Ok(VideoSource::Camera(index))
    }

    #[cfg(not(feature = "opencv"))]
    fn camera(_index: i32, uri: &str) -> Result<Self, ConfigError> {
        Err(ConfigError::FeatureDisabled(uri.to_string()))
    }

    #[cfg(feature = "opencv")]
    fn file(uri: &str) -> Result<Self, ConfigError> {
        Ok(VideoSource::File(uri.to_string()))
    }

    #[cfg(not(feature = "opencv"))]
    fn file(uri: &str) -> Result<Self, ConfigError> {
        Err(ConfigError::FeatureDisabled(uri.to_string()))
    }

    pub fn describe(&self) -> String {
        match self {
            VideoSource::Synthetic(spec) => format!(
                "synthetic {}x{}@{}",
                spec.width, spec.height, spec.fps
            ),
            #[cfg(feature = "opencv")]
            VideoSource::File(uri) => uri.clone(),
            #[cfg(feature = "opencv")]
            VideoSource::Camera(index) => format!("camera {}", index),
            VideoSource::Decoder(_) => "custom decoder".to_string(),
        }
    }

    fn open(&mut self) -> Result<Box<dyn Decode>, ProviderError> {
        match self {
            VideoSource::Synthetic(spec) => Ok(Box::new(SyntheticDecoder::new(spec.clone()))),
            #[cfg(feature = "opencv")]
            VideoSource::File(uri) => Ok(Box::new(crate::decoder::VideoDecoder::open(uri)?)),
            #[cfg(feature = "opencv")]
            VideoSource::Camera(index) => {
                Ok(Box::new(crate::decoder::VideoDecoder::open_camera(*index)?))
            }
            VideoSource::Decoder(decoder) => decoder
                .take()
                .ok_or_else(|| ProviderError::Decoder("custom decoder already consumed".to_string())),
        }
    }
}

/// Knobs of a `VideoProvider`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderSettings {
    pub capacity: usize,
    pub frame_interval: u32,
    pub max_read_retries: u32,
    /// Scale pictures to this size; source size when `None`
    pub output_size: Option<(u32, u32)>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            max_read_retries: DEFAULT_MAX_READ_RETRIES,
            output_size: None,
        }
    }
}

/// Why the producer loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProducerEnd {
    #[default]
    Stopped,
    EndOfStream,
    RetriesExhausted,
}

/// Counters of one producer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub decoded: u64,
    pub enqueued: u64,
    pub skipped: u64,
    pub conversion_failures: u64,
    pub read_retries: u64,
    pub end: ProducerEnd,
}

struct Shared {
    queue: BoundedFrameQueue,
    running: AtomicBool,
    frame_interval: AtomicU32,
}

impl Shared {
    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Provider that decodes on a background thread and converts every kept
/// picture to RGB24 before queueing it.
pub struct VideoProvider {
    source: VideoSource,
    shared: Arc<Shared>,
    decoder: Option<Box<dyn Decode>>,
    converter: Option<Box<dyn Convert>>,
    worker: Option<JoinHandle<(ProducerStats, Box<dyn Convert>)>>,
    info: Option<StreamInfo>,
    geometry: Option<(u32, u32)>,
    settings: ProviderSettings,
    last_error: Option<String>,
    last_run: Option<ProducerStats>,
}

impl VideoProvider {
    pub fn new(source: VideoSource, settings: ProviderSettings) -> Result<Self, ProviderError> {
        if settings.frame_interval == 0 {
            return Err(ProviderError::InvalidFrameInterval(0));
        }
        let queue = BoundedFrameQueue::new(settings.capacity)?;
        // Nothing may be queued before start()
        queue.close();

        Ok(Self {
            source,
            shared: Arc::new(Shared {
                queue,
                running: AtomicBool::new(false),
                frame_interval: AtomicU32::new(settings.frame_interval),
            }),
            decoder: None,
            converter: None,
            worker: None,
            info: None,
            geometry: None,
            settings,
            last_error: None,
            last_run: None,
        })
    }

    /// Replace the RGB converter. A running producer keeps its current one
    /// until the next `start`.
    pub fn set_converter(&mut self, converter: Box<dyn Convert>) {
        self.converter = Some(converter);
        if !self.is_running() {
            self.refresh_geometry();
        }
    }

    pub fn frame_interval(&self) -> u32 {
        self.shared.frame_interval.load(Ordering::SeqCst)
    }

    /// Keep one of every `interval` decoded pictures. Takes effect immediately.
    pub fn set_frame_interval(&mut self, interval: u32) -> Result<(), ProviderError> {
        if interval == 0 {
            return Err(self.fail(ProviderError::InvalidFrameInterval(interval)));
        }
        self.settings.frame_interval = interval;
        self.shared.frame_interval.store(interval, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), ProviderError> {
        if let Err(e) = self.shared.queue.set_capacity(capacity) {
            return Err(self.fail(e));
        }
        self.settings.capacity = capacity;
        Ok(())
    }

    /// Rate at which frames reach the queue: nominal fps over the frame interval.
    pub fn fps(&self) -> f64 {
        match self.info {
            Some(info) => info.fps / f64::from(self.frame_interval()),
            None => 0.0,
        }
    }

    /// Geometry of queued pictures, as the converter produces them.
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.geometry
    }

    fn refresh_geometry(&mut self) {
        if let (Some(info), Some(converter)) = (self.info, self.converter.as_ref()) {
            self.geometry = Some(converter.output_geometry(info.width, info.height));
        }
    }

    /// Counters of the last producer run that has been joined.
    pub fn last_run(&self) -> Option<ProducerStats> {
        self.last_run
    }

    fn fail(&mut self, error: ProviderError) -> ProviderError {
        logger::error(&error.to_string());
        self.last_error = Some(error.to_string());
        error
    }

    fn reap(&mut self) {
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok((stats, converter)) => {
                    logger::info(&format!("producer joined: {:?}", stats));
                    self.last_run = Some(stats);
                    // A converter installed during the run takes precedence
                    if self.converter.is_none() {
                        self.converter = Some(converter);
                    }
                }
                Err(_) => logger::error("producer thread panicked"),
            }
        }
    }
}

impl FrameProvider for VideoProvider {
    fn init(&mut self) -> Result<StreamInfo, ProviderError> {
        if self.is_running() {
            return Err(self.fail(ProviderError::AlreadyRunning));
        }
        let decoder = match self.source.open() {
            Ok(decoder) => decoder,
            Err(e) => return Err(self.fail(e)),
        };
        let info = decoder.stream_info();
        if info.width == 0 || info.height == 0 {
            return Err(self.fail(ProviderError::NoVideoStream(self.source.describe())));
        }

        logger::info(&format!(
            "provider initialized: {} {}x{} @ {:.2}fps, interval {}",
            self.source.describe(),
            info.width,
            info.height,
            info.fps,
            self.frame_interval()
        ));
        self.decoder = Some(decoder);
        self.info = Some(info);
        if self.converter.is_none() {
            self.converter = Some(Box::new(RgbConverter::new(self.settings.output_size)));
        }
        self.refresh_geometry();
        self.last_error = None;
        Ok(info)
    }

    fn start(&mut self) -> Result<(), ProviderError> {
        if self.is_running() {
            return Err(self.fail(ProviderError::AlreadyRunning));
        }
        // A previous run may have ended on its own
        self.reap();

        let Some(decoder) = self.decoder.take() else {
            return Err(self.fail(ProviderError::NotInitialized));
        };
        self.refresh_geometry();
        let converter = self
            .converter
            .take()
            .unwrap_or_else(|| Box::new(RgbConverter::new(self.settings.output_size)));
        let max_read_retries = self.settings.max_read_retries;

        self.shared.queue.clear();
        self.shared.queue.open();
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("framepace-producer".to_string())
            .spawn(move || produce(decoder, converter, &shared, max_read_retries));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.queue.close();
                Err(self.fail(ProviderError::Decoder(format!(
                    "failed to spawn producer thread: {}",
                    e
                ))))
            }
        }
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.queue.close();
        self.reap();
        self.shared.queue.clear();
        // Release the source even if it was never started
        self.decoder = None;
    }

    fn is_running(&self) -> bool {
        self.shared.running()
    }

    fn queue(&self) -> &BoundedFrameQueue {
        &self.shared.queue
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        self.info
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

impl Drop for VideoProvider {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Producer thread body. Runs until end of stream, retry exhaustion or stop.
fn produce(
    mut decoder: Box<dyn Decode>,
    mut converter: Box<dyn Convert>,
    shared: &Shared,
    max_read_retries: u32,
) -> (ProducerStats, Box<dyn Convert>) {
    logger::debug("producer thread started");
    let info = decoder.stream_info();
    let mut stats = ProducerStats::default();
    let mut retries = 0u32;

    let end = loop {
        if !shared.running() {
            break ProducerEnd::Stopped;
        }
        // 1. Read a coded unit, spending the retry budget on transient failures
        let unit = match decoder.read_unit() {
            ReadStatus::Unit(unit) => {
                retries = 0;
                unit
            }
            ReadStatus::Retry => {
                retries += 1;
                stats.read_retries += 1;
                if retries > max_read_retries {
                    logger::warn(&format!("giving up after {} failed reads", retries));
                    break ProducerEnd::RetriesExhausted;
                }
                continue;
            }
            ReadStatus::EndOfStream => {
                // Flush so the decoder hands over what it still holds
                if let Err(e) = decoder.flush() {
                    logger::debug(&format!("decoder flush failed: {}", e));
                }
                drain_decoder(&mut *decoder, &mut *converter, shared, &info, &mut stats);
                break ProducerEnd::EndOfStream;
            }
        };

        // 2. Only the video stream goes to the decoder
        if unit.stream_index != info.video_stream {
            continue;
        }
        if let Err(e) = decoder.send_unit(&unit) {
            logger::debug(&format!("decoder rejected unit: {}", e));
            continue;
        }
        // 3. Queue every picture that is ready now
        drain_decoder(&mut *decoder, &mut *converter, shared, &info, &mut stats);
    };

    // 4. Release the decoder before reporting the run as finished
    drop(decoder);
    stats.end = end;
    shared.running.store(false, Ordering::SeqCst);
    logger::debug(&format!(
        "producer thread exiting: {:?}, decoded {} enqueued {}",
        stats.end, stats.decoded, stats.enqueued
    ));
    (stats, converter)
}

/// Pull every picture the decoder has ready and queue the kept ones.
fn drain_decoder(
    decoder: &mut dyn Decode,
    converter: &mut dyn Convert,
    shared: &Shared,
    info: &StreamInfo,
    stats: &mut ProducerStats,
) {
    while shared.running() {
        let frame = match decoder.receive_frame() {
            Ok(DecodeStatus::Frame(frame)) => frame,
            Ok(DecodeStatus::Pending) => break,
            Err(e) => {
                logger::debug(&format!("receive_frame failed: {}", e));
                break;
            }
        };

        // Frame skip: keep every `interval`-th decoded picture
        stats.decoded += 1;
        let interval = u64::from(shared.frame_interval.load(Ordering::SeqCst).max(1));
        if stats.decoded % interval != 0 {
            stats.skipped += 1;
            continue;
        }

        let pts = frame.pts;
        let Some(rgb) = converter.convert(frame) else {
            stats.conversion_failures += 1;
            continue;
        };
        let timestamp = match pts {
            Some(pts) => info.pts_to_us(pts),
            None => info.synthetic_us(stats.decoded),
        };

        wait_for_room(shared);
        shared.queue.push(FrameBuffer::bind(rgb, timestamp));
        stats.enqueued += 1;
    }
}

/// Queue length above which the producer backs off: two thirds of capacity.
fn backoff_threshold(capacity: usize) -> usize {
    capacity * 2 / 3
}

/// Back off while the queue is above two thirds of its capacity, which
/// keeps evictions rare without ever blocking for good.
fn wait_for_room(shared: &Shared) {
    let threshold = backoff_threshold(shared.queue.capacity());
    while shared.running() && shared.queue.len() > threshold {
        thread::sleep(Duration::from_millis(PRODUCER_BACKOFF_MS));
    }
}
