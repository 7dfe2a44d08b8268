use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::consumer::{ConsumerSettings, PacingMode};
use crate::core::error::ConfigError;
use crate::core::provider::{ProviderSettings, VideoSource};
use crate::shared::constants::{
    DEFAULT_FRAME_INTERVAL, DEFAULT_IDLE_WAIT_MS, DEFAULT_MAX_READ_RETRIES, DEFAULT_QUEUE_CAPACITY,
    NULL_OUTPUT,
};
use crate::sink::OutputTarget;

/// Everything one session needs, as read from a JSON file and CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub source: String,
    pub output: String,
    pub capacity: usize,
    pub frame_interval: u32,
    pub time_limit_us: Option<i64>,
    pub pacing: PacingMode,
    pub max_read_retries: u32,
    pub output_width: Option<u32>,
    pub output_height: Option<u32>,
    pub idle_wait_ms: u64,
    pub log_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            output: NULL_OUTPUT.to_string(),
            capacity: DEFAULT_QUEUE_CAPACITY,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            time_limit_us: None,
            pacing: PacingMode::RealTime,
            max_read_retries: DEFAULT_MAX_READ_RETRIES,
            output_width: None,
            output_height: None,
            idle_wait_ms: DEFAULT_IDLE_WAIT_MS,
            log_dir: None,
        }
    }
}

impl SessionConfig {
    /// Read a config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Check values and that source and output name something usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(invalid("capacity", "must be at least 1"));
        }
        if self.frame_interval == 0 {
            return Err(invalid("frame_interval", "must be at least 1"));
        }
        if let Some(limit) = self.time_limit_us {
            if limit <= 0 {
                return Err(invalid("time_limit_us", "must be positive"));
            }
        }
        match (self.output_width, self.output_height) {
            (Some(0), _) | (_, Some(0)) => {
                return Err(invalid("output_width/output_height", "must be positive"))
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(invalid("output_width/output_height", "set both or neither"))
            }
            _ => {}
        }
        VideoSource::parse(&self.source)?;
        OutputTarget::parse(&self.output)?;
        Ok(())
    }

    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.output_width.zip(self.output_height)
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            capacity: self.capacity,
            frame_interval: self.frame_interval,
            max_read_retries: self.max_read_retries,
            output_size: self.output_size(),
        }
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            pacing: self.pacing,
            time_limit_us: self.time_limit_us,
            idle_wait: Duration::from_millis(self.idle_wait_ms),
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
