pub const APP_NAME: &str = "framepace";

pub const ERROR_LOG_FILE: &str = "framepace-error.log";
pub const DEBUG_LOG_FILE: &str = "framepace-debug.log";

/// Timestamp value carried by frames that have none.
pub const UNSET_TIMESTAMP: i64 = -1;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_FRAME_INTERVAL: u32 = 1;
pub const DEFAULT_MAX_READ_RETRIES: u32 = 100;
pub const DEFAULT_IDLE_WAIT_MS: u64 = 1;

/// Used for synthetic timestamps when the source reports no frame rate.
pub const FALLBACK_FPS: f64 = 25.0;

/// Producer back-off while the queue sits above two thirds of capacity.
pub const PRODUCER_BACKOFF_MS: u64 = 1;

/// Added to a timestamp that does not advance past the previous one.
pub const TIMESTAMP_BUMP_US: i64 = 1_000;

pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// RGB24 exchange format between producer and consumer.
pub const EXCHANGE_PIXEL_SIZE: usize = 3;

pub const SYNTHETIC_SCHEME: &str = "synthetic:";
pub const CAMERA_SCHEME: &str = "camera:";
pub const NULL_OUTPUT: &str = "null";
pub const DUMP_EXTENSION: &str = "fpd";
pub const DUMP_MAGIC: &[u8; 4] = b"FPD1";
