use std::time::{Duration, Instant};

/// Monotonic session clock.
///
/// The start instant is captured once, right before the pacing loop, and
/// every frame timestamp is compared against the time elapsed since then.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    /// Start a clock at time zero
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Clock whose zero is an earlier instant
    pub fn started_at(start: Instant) -> Self {
        Self { start }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed session time in microseconds, the unit of frame timestamps.
    pub fn elapsed_us(&self) -> i64 {
        i64::try_from(self.elapsed().as_micros()).unwrap_or(i64::MAX)
    }

    /// Time left until `timestamp_us` is due, zero if it already is.
    pub fn until(&self, timestamp_us: i64) -> Duration {
        let remaining = timestamp_us.saturating_sub(self.elapsed_us());
        if remaining <= 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(remaining as u64)
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_grows() {
        let clock = SessionClock::start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.elapsed_us() >= 5_000);
    }

    #[test]
    fn test_until_is_zero_for_past_timestamps() {
        let start = Instant::now() - Duration::from_millis(50);
        let clock = SessionClock::started_at(start);
        assert_eq!(clock.until(10_000), Duration::ZERO);
        assert!(clock.until(10_000_000) > Duration::from_secs(9));
    }
}
