use crate::shared::constants::UNSET_TIMESTAMP;

/// One timestamped chunk of raw frame data.
///
/// The payload is exclusively owned. Moving a `FrameBuffer` hands the
/// allocation over untouched; `clone()` always duplicates the bytes.
/// A buffer with no payload (`byte_size() == 0`) is the "nothing available"
/// sentinel returned by the queue, not an error.
///
/// Allocation failure aborts the process, like any other Rust allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<u8>,
    timestamp: i64,
}

impl FrameBuffer {
    /// The empty sentinel: no payload, timestamp unset.
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            timestamp: UNSET_TIMESTAMP,
        }
    }

    /// Take ownership of a producer's buffer without copying it.
    pub fn bind(data: Vec<u8>, timestamp: i64) -> Self {
        Self { data, timestamp }
    }

    /// Copy borrowed bytes into a new buffer.
    pub fn from_slice(data: &[u8], timestamp: i64) -> Self {
        Self {
            data: data.to_vec(),
            timestamp,
        }
    }

    /// Allocate `byte_size` bytes with an unset timestamp.
    pub fn with_size(byte_size: usize) -> Self {
        Self {
            data: vec![0u8; byte_size],
            timestamp: UNSET_TIMESTAMP,
        }
    }

    /// Reallocate to `byte_size`, discarding the previous content.
    pub fn resize(&mut self, byte_size: usize) {
        self.data = vec![0u8; byte_size];
    }

    /// Move the payload and metadata out, leaving the empty sentinel behind.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, value: i64) {
        self.timestamp = value;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::empty()
    }
}
