//! Streaming pipeline: worker → buffer → tick flush → redraw gate

pub mod buffer;
pub mod cancel;
pub mod orchestrator;
pub mod viewport;

pub use buffer::{BufferConfig, StreamingBuffer};
pub use cancel::CancelHandle;
pub use orchestrator::{StreamEvent, StreamOrchestrator, StreamStats, StreamingState};
pub use viewport::{ViewportOptimizer, ViewportStats};

use std::time::Duration;

/// Render tick period (~30 fps)
pub const STREAM_TICK: Duration = Duration::from_millis(33);
