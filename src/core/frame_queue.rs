use crate::core::error::ProviderError;
use crate::core::frame_buffer::FrameBuffer;
use crate::shared::constants::DEFAULT_QUEUE_CAPACITY;
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

struct QueueState {
    frames: VecDeque<FrameBuffer>,
    capacity: usize,
    closed: bool,
}

/// Fixed-capacity FIFO of frames shared by one producer and one consumer.
///
/// A full queue never blocks the producer: `push` evicts the oldest frames
/// so that the newest `capacity` frames survive. `pop` and `peek` return the
/// empty sentinel instead of blocking when nothing is queued, and every
/// operation turns into a no-op once the queue is closed.
pub struct BoundedFrameQueue {
    state: Mutex<QueueState>,
    evicted: AtomicU64,
    // Single-slot doorbell rung on push/close; a token survives until the
    // consumer waits, so a wakeup can not be lost.
    doorbell_tx: Sender<()>,
    doorbell_rx: Receiver<()>,
}

impl BoundedFrameQueue {
    pub fn new(capacity: usize) -> Result<Self, ProviderError> {
        if capacity == 0 {
            return Err(ProviderError::InvalidCapacity);
        }
        Ok(Self::build(capacity))
    }

    fn build(capacity: usize) -> Self {
        let (doorbell_tx, doorbell_rx) = crossbeam_channel::bounded(1);
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
            }),
            evicted: AtomicU64::new(0),
            doorbell_tx,
            doorbell_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn ring(&self) {
        let _ = self.doorbell_tx.try_send(());
    }

    /// Append a frame, evicting from the head until there is room for it.
    /// Dropped silently when the queue is closed.
    pub fn push(&self, frame: FrameBuffer) {
        let mut evicted = Vec::new();
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            while state.frames.len() >= state.capacity {
                match state.frames.pop_front() {
                    Some(old) => evicted.push(old),
                    None => break,
                }
            }
            state.frames.push_back(frame);
        }
        // Evicted payloads are freed outside the lock
        if !evicted.is_empty() {
            self.evicted.fetch_add(evicted.len() as u64, Ordering::Relaxed);
        }
        drop(evicted);
        self.ring();
    }

    /// Remove the oldest frame, or return the empty sentinel.
    pub fn pop(&self) -> FrameBuffer {
        let mut state = self.lock();
        if state.closed {
            return FrameBuffer::empty();
        }
        state.frames.pop_front().unwrap_or_default()
    }

    /// Remove the oldest frame only if `ready` accepts it. The check runs
    /// under the lock, so the frame judged is the frame returned.
    pub fn pop_if<F>(&self, ready: F) -> Option<FrameBuffer>
    where
        F: FnOnce(&FrameBuffer) -> bool,
    {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        if !ready(state.frames.front()?) {
            return None;
        }
        state.frames.pop_front()
    }

    /// Deep copy of the oldest frame without removing it, or the sentinel.
    pub fn peek(&self) -> FrameBuffer {
        let state = self.lock();
        if state.closed {
            return FrameBuffer::empty();
        }
        state.frames.front().cloned().unwrap_or_default()
    }

    /// Wait until something is pushed (or the queue closes), at most `timeout`.
    pub fn wait_for_push(&self, timeout: Duration) -> bool {
        self.doorbell_rx.recv_timeout(timeout).is_ok()
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Change the capacity. Shrinking trims the oldest frames right away so
    /// the queue never holds more than `capacity` frames.
    pub fn set_capacity(&self, capacity: usize) -> Result<(), ProviderError> {
        if capacity == 0 {
            return Err(ProviderError::InvalidCapacity);
        }
        let mut trimmed = Vec::new();
        {
            let mut state = self.lock();
            state.capacity = capacity;
            while state.frames.len() > capacity {
                match state.frames.pop_front() {
                    Some(old) => trimmed.push(old),
                    None => break,
                }
            }
        }
        self.evicted.fetch_add(trimmed.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Number of frames dropped to enforce the capacity since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        let drained: Vec<FrameBuffer> = self.lock().frames.drain(..).collect();
        drop(drained);
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.ring();
    }

    pub fn open(&self) {
        self.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Default for BoundedFrameQueue {
    fn default() -> Self {
        Self::build(DEFAULT_QUEUE_CAPACITY)
    }
}
