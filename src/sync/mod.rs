pub mod clock;
pub mod sequencer;

pub use clock::SessionClock;
pub use sequencer::TimestampSequencer;
