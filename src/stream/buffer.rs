//! Token batching between the stream worker and the render tick
//!
//! The worker calls [`StreamingBuffer::write`] for every chunk; the event loop
//! calls [`StreamingBuffer::flush`] on each tick. A flush releases everything
//! buffered once either `batch_size` writes have accumulated or
//! `1000 / max_fps` milliseconds have passed since the previous flush.
//!
//! All state sits behind one mutex, so extracting the content, resetting the
//! write counter and stamping the flush time happen as one step.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_BATCH_SIZE: usize = 15;
pub const DEFAULT_MAX_FPS: u32 = 30;
pub const MAX_FPS_LIMIT: u32 = 60;

fn flush_interval(max_fps: u32) -> Duration {
    Duration::from_millis(u64::from(1000 / max_fps))
}

#[derive(Debug)]
struct BufferState {
    content: String,
    pending_writes: usize,
    last_flush: Instant,
    batch_size: usize,
    max_fps: u32,
    min_flush_interval: Duration,
}

impl BufferState {
    fn should_flush(&self) -> bool {
        if self.content.is_empty() {
            return false;
        }
        self.pending_writes >= self.batch_size
            || self.last_flush.elapsed() >= self.min_flush_interval
    }

    fn take(&mut self) -> String {
        self.pending_writes = 0;
        self.last_flush = Instant::now();
        std::mem::take(&mut self.content)
    }
}

/// Snapshot of buffer tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub batch_size: usize,
    pub max_fps: u32,
    pub min_flush_interval: Duration,
}

/// Thread-safe token accumulator
#[derive(Debug)]
pub struct StreamingBuffer {
    state: Mutex<BufferState>,
}

impl Default for StreamingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingBuffer {
    /// Buffer with default tuning (15 writes / 30 fps)
    pub fn new() -> Self {
        Self::with_config(DEFAULT_BATCH_SIZE, DEFAULT_MAX_FPS)
    }

    /// Buffer with custom tuning
    ///
    /// A zero batch size falls back to 15; an fps outside `1..=60` falls back to 30.
    pub fn with_config(batch_size: usize, max_fps: u32) -> Self {
        let batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };
        let max_fps = if max_fps == 0 || max_fps > MAX_FPS_LIMIT {
            DEFAULT_MAX_FPS
        } else {
            max_fps
        };

        Self {
            state: Mutex::new(BufferState {
                content: String::new(),
                pending_writes: 0,
                last_flush: Instant::now(),
                batch_size,
                max_fps,
                min_flush_interval: flush_interval(max_fps),
            }),
        }
    }

    // A panic while holding the lock cannot leave the state half-updated in a
    // way later callers care about, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a token
    pub fn write(&self, token: &str) {
        let mut state = self.lock();
        state.content.push_str(token);
        state.pending_writes += 1;
    }

    /// Release buffered content if a threshold has been reached
    pub fn flush(&self) -> Option<String> {
        let mut state = self.lock();
        if !state.should_flush() {
            return None;
        }
        Some(state.take())
    }

    /// Release buffered content regardless of thresholds
    ///
    /// Used at stream completion and cancellation. Returns `None` only when
    /// there is nothing buffered.
    pub fn force_flush(&self) -> Option<String> {
        let mut state = self.lock();
        if state.content.is_empty() {
            state.pending_writes = 0;
            return None;
        }
        Some(state.take())
    }

    /// Discard buffered content
    pub fn reset(&self) {
        let mut state = self.lock();
        state.content.clear();
        state.pending_writes = 0;
        state.last_flush = Instant::now();
    }

    /// Whether `flush` would release content right now
    pub fn should_flush(&self) -> bool {
        self.lock().should_flush()
    }

    /// Writes since the last flush
    pub fn pending(&self) -> usize {
        self.lock().pending_writes
    }

    pub fn config(&self) -> BufferConfig {
        let state = self.lock();
        BufferConfig {
            batch_size: state.batch_size,
            max_fps: state.max_fps,
            min_flush_interval: state.min_flush_interval,
        }
    }

    /// Change the batch size; zero is ignored
    pub fn set_batch_size(&self, batch_size: usize) {
        if batch_size > 0 {
            self.lock().batch_size = batch_size;
        }
    }

    /// Change the frame-rate cap; values outside `1..=60` are ignored
    pub fn set_max_fps(&self, max_fps: u32) {
        if (1..=MAX_FPS_LIMIT).contains(&max_fps) {
            let mut state = self.lock();
            state.max_fps = max_fps;
            state.min_flush_interval = flush_interval(max_fps);
        }
    }
}
