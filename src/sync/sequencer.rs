use crate::shared::constants::TIMESTAMP_BUMP_US;

/// Keeps timestamps handed to a sink strictly increasing.
///
/// Sinks (encoders, muxers) reject repeated or decreasing presentation
/// times. A timestamp that does not advance past the previous one is moved
/// to `previous + step`.
#[derive(Debug, Clone)]
pub struct TimestampSequencer {
    last: Option<i64>,
    step: i64,
    bumped: u64,
}

impl TimestampSequencer {
    pub fn new() -> Self {
        Self::with_step(TIMESTAMP_BUMP_US)
    }

    pub fn with_step(step: i64) -> Self {
        Self {
            last: None,
            step: step.max(1),
            bumped: 0,
        }
    }

    /// Sequence the next timestamp.
    pub fn next(&mut self, timestamp: i64) -> i64 {
        let ts = match self.last {
            Some(last) if timestamp <= last => {
                self.bumped += 1;
                last + self.step
            }
            _ => timestamp,
        };
        self.last = Some(ts);
        ts
    }

    /// How many timestamps had to be moved forward.
    pub fn bumped(&self) -> u64 {
        self.bumped
    }

}

impl Default for TimestampSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_is_bumped() {
        let mut seq = TimestampSequencer::new();
        assert_eq!(seq.next(40_000), 40_000);
        assert_eq!(seq.next(40_000), 41_000);
        assert_eq!(seq.next(40_000), 42_000);
        assert_eq!(seq.next(80_000), 80_000);
        assert_eq!(seq.bumped(), 2);
    }

    #[test]
    fn test_first_timestamp_passes_through() {
        let mut seq = TimestampSequencer::new();
        assert_eq!(seq.next(0), 0);
        assert_eq!(seq.next(0), 1_000);
    }

    #[test]
    fn test_output_strictly_increasing() {
        let input = [5, 5, 3, 9, 9, 9, -1, 2_000, 2_000, 100];
        let mut seq = TimestampSequencer::with_step(10);
        let out: Vec<i64> = input.iter().map(|&ts| seq.next(ts)).collect();
        assert!(out.windows(2).all(|w| w[0] < w[1]), "{:?}", out);
    }
}
