//! Redraw suppression by content hash
//!
//! Length or pointer comparison misses in-place edits of equal length, so the
//! optimizer compares SHA-256 digests of the full rendered content.

use sha2::{Digest, Sha256};
use std::time::Instant;

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Redraw efficiency counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportStats {
    pub total: u64,
    pub skipped: u64,
    pub skip_percent: f64,
}

/// Change-detecting gate in front of the renderer
///
/// Owned by the event loop; no locking.
#[derive(Debug)]
pub struct ViewportOptimizer {
    /// `None` until the first render and after `force_update` / `reset`
    last_hash: Option<String>,
    last_update: Instant,
    dirty: bool,
    update_count: u64,
    skip_count: u64,
}

impl Default for ViewportOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportOptimizer {
    pub fn new() -> Self {
        Self {
            last_hash: None,
            last_update: Instant::now(),
            dirty: true,
            update_count: 0,
            skip_count: 0,
        }
    }

    /// True if `content` differs from what was last approved for rendering
    pub fn should_update(&mut self, content: &str) -> bool {
        self.update_count += 1;

        let hash = hash_content(content);
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            self.skip_count += 1;
            return false;
        }

        self.last_hash = Some(hash);
        self.last_update = Instant::now();
        self.dirty = true;
        true
    }

    /// Record that the approved content has been drawn
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Make the next `should_update` pass regardless of content
    ///
    /// For layout changes such as a terminal resize.
    pub fn force_update(&mut self) {
        self.last_hash = None;
        self.dirty = true;
    }

    /// Forget the last hash, keeping the counters
    pub fn reset(&mut self) {
        self.last_hash = None;
        self.last_update = Instant::now();
        self.dirty = true;
    }

    pub fn stats(&self) -> ViewportStats {
        let skip_percent = if self.update_count == 0 {
            0.0
        } else {
            self.skip_count as f64 / self.update_count as f64 * 100.0
        };
        ViewportStats {
            total: self.update_count,
            skipped: self.skip_count,
            skip_percent,
        }
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_content_twice_then_forced() {
        let mut optimizer = ViewportOptimizer::new();
        assert!(optimizer.should_update("hello"));
        assert!(!optimizer.should_update("hello"));
        optimizer.force_update();
        assert!(optimizer.should_update("hello"));
    }

    #[test]
    fn test_first_call_passes_even_for_empty_content() {
        let mut optimizer = ViewportOptimizer::new();
        assert!(optimizer.should_update(""));
        assert!(!optimizer.should_update(""));
    }

    #[test]
    fn test_force_update_passes_for_empty_content() {
        let mut optimizer = ViewportOptimizer::new();
        assert!(optimizer.should_update(""));
        optimizer.force_update();
        assert!(optimizer.should_update(""));
    }

    #[test]
    fn test_same_length_edit_is_detected() {
        let mut optimizer = ViewportOptimizer::new();
        assert!(optimizer.should_update("abcd"));
        assert!(optimizer.should_update("abce"));
    }

    #[test]
    fn test_reset_keeps_counters() {
        let mut optimizer = ViewportOptimizer::new();
        optimizer.should_update("a");
        optimizer.should_update("a");
        optimizer.reset();

        let stats = optimizer.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.skipped, 1);
        assert!(optimizer.should_update("a"));
    }

    #[test]
    fn test_stats_percentage() {
        let mut optimizer = ViewportOptimizer::new();
        assert_eq!(optimizer.stats().skip_percent, 0.0);
        for _ in 0..4 {
            optimizer.should_update("same");
        }
        let stats = optimizer.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.skipped, 3);
        assert!((stats.skip_percent - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dirty_flag_lifecycle() {
        let mut optimizer = ViewportOptimizer::new();
        assert!(optimizer.is_dirty());
        optimizer.should_update("x");
        optimizer.mark_clean();
        assert!(!optimizer.is_dirty());
        optimizer.should_update("x");
        assert!(!optimizer.is_dirty());
        optimizer.should_update("y");
        assert!(optimizer.is_dirty());
    }
}
