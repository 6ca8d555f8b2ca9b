//! # Capture Buffer
//!
//! A bounded buffer of observed capability-acquisition attempts recorded
//! during one sandboxed evaluation run (spec §4.4). Each attempted
//! `require("fs")`, `eval(...)`, or similar probe is captured as a
//! [`Frame`] so the evaluator can report what it saw, not just that it
//! saw something.
//!
//! ## Threat Model
//!
//! An artifact that issues an unbounded number of capability probes
//! could otherwise grow the evaluator's own working set without limit.
//! The buffer bounds that growth.
//!
//! ## Hard stop, not silent eviction
//!
//! The underlying [`ContextManager`] retains the teacher's LRU push
//! semantics (`push` auto-evicts the oldest frame on overflow), but the
//! evaluator never relies on that: it checks [`ContextManager::is_full`]
//! before each push and treats a full buffer as `MEMORY_EXHAUSTION`
//! rather than silently forgetting earlier attempts. Forgetting a prior
//! capability probe would undercount what the artifact tried.
//!
//! ## Example
//!
//! ```rust
//! use scanner_monitor::{ContextManager, Frame};
//!
//! let mut ctx = ContextManager::new(100); // Max 100 frames
//!
//! // Record capability attempts during evaluation
//! ctx.push(Frame::new("attempt_1", "require(\"fs\")"));
//! ctx.push(Frame::new("attempt_2", "eval(\"...\")"));
//!
//! // Check utilization
//! if ctx.utilization() > 0.8 {
//!     let evicted = ctx.flush(10); // Evict 10 oldest frames
//!     eprintln!("Evicted {} frames", evicted);
//! }
//! ```

use crate::error::{MonitorError, Result};
use std::collections::VecDeque;

/// A single observed capability-acquisition attempt.
///
/// # Fields
///
/// - `id`: Unique identifier for this frame
/// - `content`: Serialized state content
/// - `priority`: Eviction priority (higher = survives longer)
/// - `timestamp`: When this frame was last accessed
///
/// # Security Notes
///
/// Content should be sanitized before storage to prevent
/// injection attacks when frames are later rendered in a report.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Unique frame identifier.
    id: String,
    /// Serialized frame content.
    content: String,
    /// Eviction priority (0 = lowest, u8::MAX = highest).
    priority: u8,
    /// Access timestamp (monotonic counter).
    accessed: u64,
}

impl Frame {
    /// Creates a new frame with default priority.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique identifier for this frame
    /// * `content` - Serialized state content
    ///
    /// # Example
    ///
    /// ```rust
    /// use scanner_monitor::Frame;
    ///
    /// let frame = Frame::new("attempt_1", "require(\"child_process\")");
    /// assert_eq!(frame.id(), "step_1");
    /// ```
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            priority: 0,
            accessed: 0,
        }
    }

    /// Creates a frame with specified priority.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique identifier
    /// * `content` - Serialized content
    /// * `priority` - Eviction priority (higher survives longer)
    ///
    /// # Security Notes
    ///
    /// Use high priority for security-critical frames that should
    /// not be evicted during normal flush operations.
    #[must_use]
    pub fn with_priority(id: impl Into<String>, content: impl Into<String>, priority: u8) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            priority,
            accessed: 0,
        }
    }

    /// Returns the frame ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the frame content.
    #[inline]
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the frame priority.
    #[inline]
    #[must_use]
    pub const fn priority(&self) -> u8 {
        self.priority
    }

    /// Returns the last access timestamp.
    #[inline]
    #[must_use]
    pub const fn accessed(&self) -> u64 {
        self.accessed
    }

    /// Returns approximate memory size of this frame in bytes.
    #[inline]
    #[must_use]
    pub fn memory_size(&self) -> usize {
        self.id.len() + self.content.len() + 9 // 8 bytes for u64 + 1 for u8
    }
}

/// Manages captured capability-attempt frames with LRU eviction policy.
///
/// # Overview
///
/// `ContextManager` maintains a bounded collection of frames. When the
/// frame count exceeds capacity, the least recently used frames are
/// automatically evicted to maintain the bound.
///
/// # Thread Safety
///
/// `ContextManager` is not thread-safe. Each evaluation run should have
/// its own manager instance.
///
/// # Security Notes
///
/// - Capacity limits MUST be enforced to prevent memory exhaustion
/// - Eviction events SHOULD be logged for security audit
/// - High-priority frames resist eviction but can still be flushed
///
/// # Example
///
/// ```rust
/// use scanner_monitor::{ContextManager, Frame};
///
/// let mut ctx = ContextManager::new(3);
///
/// ctx.push(Frame::new("a", "content a"));
/// ctx.push(Frame::new("b", "content b"));
/// ctx.push(Frame::new("c", "content c"));
///
/// assert_eq!(ctx.len(), 3);
/// assert!(ctx.is_full());
///
/// // Adding another frame triggers auto-eviction of oldest
/// ctx.push(Frame::new("d", "content d"));
/// assert_eq!(ctx.len(), 3);
/// assert!(ctx.get("a").is_none()); // Evicted
/// ```
#[derive(Debug)]
pub struct ContextManager {
    /// Maximum number of frames allowed.
    capacity: usize,
    /// Current frames in insertion order.
    frames: VecDeque<Frame>,
    /// Monotonic timestamp counter.
    timestamp: u64,
    /// Total frames evicted during lifetime.
    evicted_count: u64,
    /// Flush threshold (0.0 to 1.0).
    flush_threshold: f64,
}

impl ContextManager {
    /// Creates a new context manager with specified capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of frames to store
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0 (use at least 1).
    ///
    /// # Example
    ///
    /// ```rust
    /// use scanner_monitor::ContextManager;
    ///
    /// let ctx = ContextManager::new(100);
    /// assert_eq!(ctx.capacity(), 100);
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be at least 1");
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
            timestamp: 0,
            evicted_count: 0,
            flush_threshold: 0.8,
        }
    }

    /// Creates a context manager with custom flush threshold.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum frames
    /// * `flush_threshold` - Utilization threshold for auto-flush (0.0 to 1.0)
    #[must_use]
    pub fn with_threshold(capacity: usize, flush_threshold: f64) -> Self {
        assert!(capacity > 0, "capacity must be at least 1");
        assert!(
            (0.0..=1.0).contains(&flush_threshold),
            "threshold must be between 0.0 and 1.0"
        );
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
            timestamp: 0,
            evicted_count: 0,
            flush_threshold,
        }
    }

    /// Returns the maximum capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current number of frames.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if no frames are stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns true if at capacity.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    /// Returns utilization as a fraction (0.0 to 1.0).
    #[inline]
    #[must_use]
    pub fn utilization(&self) -> f64 {
        self.frames.len() as f64 / self.capacity as f64
    }

    /// Returns total frames evicted during lifetime.
    #[inline]
    #[must_use]
    pub const fn evicted_count(&self) -> u64 {
        self.evicted_count
    }

    /// Returns true if utilization exceeds flush threshold.
    #[inline]
    #[must_use]
    pub fn should_flush(&self) -> bool {
        self.utilization() > self.flush_threshold
    }

    /// Pushes a new frame, evicting oldest if at capacity.
    ///
    /// # Arguments
    ///
    /// * `frame` - Frame to add
    ///
    /// # Returns
    ///
    /// The evicted frame if one was removed, None otherwise.
    ///
    /// # Security Notes
    ///
    /// Auto-eviction ensures bounded memory but may lose context.
    /// Prefer explicit flush() for controlled eviction.
    pub fn push(&mut self, mut frame: Frame) -> Option<Frame> {
        self.timestamp += 1;
        frame.accessed = self.timestamp;

        let evicted = if self.is_full() {
            self.evicted_count += 1;
            self.frames.pop_front()
        } else {
            None
        };

        self.frames.push_back(frame);
        evicted
    }

    /// Gets a frame by ID, updating its access time.
    ///
    /// # Arguments
    ///
    /// * `id` - Frame ID to find
    ///
    /// # Returns
    ///
    /// Reference to the frame if found.
    ///
    /// # Security Notes
    ///
    /// Accessing a frame updates its timestamp, making it less
    /// likely to be evicted. This is intentional LRU behavior.
    pub fn get(&mut self, id: &str) -> Option<&Frame> {
        self.timestamp += 1;
        let ts = self.timestamp;

        self.frames.iter_mut().find(|f| f.id == id).map(|f| {
            f.accessed = ts;
            &*f
        })
    }

    /// Gets a frame by ID without updating access time (peek).
    ///
    /// # Arguments
    ///
    /// * `id` - Frame ID to find
    #[must_use]
    pub fn peek(&self, id: &str) -> Option<&Frame> {
        self.frames.iter().find(|f| f.id == id)
    }

    /// Flushes (evicts) the N oldest frames.
    ///
    /// # Arguments
    ///
    /// * `count` - Number of frames to evict
    ///
    /// # Returns
    ///
    /// Number of frames actually evicted (may be less than requested).
    ///
    /// # Security Notes
    ///
    /// This is DESTRUCTIVE - evicted frames are permanently lost.
    /// Call this proactively when approaching capacity limits.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scanner_monitor::{ContextManager, Frame};
    ///
    /// let mut ctx = ContextManager::new(10);
    /// for i in 0..10 {
    ///     ctx.push(Frame::new(format!("f{}", i), "content"));
    /// }
    ///
    /// let evicted = ctx.flush(3);
    /// assert_eq!(evicted, 3);
    /// assert_eq!(ctx.len(), 7);
    /// ```
    pub fn flush(&mut self, count: usize) -> usize {
        let actual = count.min(self.frames.len());
        for _ in 0..actual {
            self.frames.pop_front();
            self.evicted_count += 1;
        }
        actual
    }

    /// Flushes frames to reach target utilization.
    ///
    /// # Arguments
    ///
    /// * `target` - Target utilization (0.0 to 1.0)
    ///
    /// # Returns
    ///
    /// Number of frames evicted.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scanner_monitor::{ContextManager, Frame};
    ///
    /// let mut ctx = ContextManager::new(100);
    /// for i in 0..90 {
    ///     ctx.push(Frame::new(format!("f{}", i), "x"));
    /// }
    /// assert!((ctx.utilization() - 0.9).abs() < 0.01);
    ///
    /// let evicted = ctx.flush_to_utilization(0.5);
    /// assert!(ctx.utilization() <= 0.5);
    /// ```
    pub fn flush_to_utilization(&mut self, target: f64) -> usize {
        let target_count = (self.capacity as f64 * target) as usize;
        if self.frames.len() <= target_count {
            return 0;
        }
        self.flush(self.frames.len() - target_count)
    }

    /// Flushes all low-priority frames (priority < threshold).
    ///
    /// # Arguments
    ///
    /// * `priority_threshold` - Minimum priority to keep
    ///
    /// # Returns
    ///
    /// Number of frames evicted.
    ///
    /// # Security Notes
    ///
    /// Use this to preserve security-critical high-priority frames
    /// while evicting less important context.
    pub fn flush_low_priority(&mut self, priority_threshold: u8) -> usize {
        let before = self.frames.len();
        self.frames.retain(|f| f.priority >= priority_threshold);
        let evicted = before - self.frames.len();
        self.evicted_count += evicted as u64;
        evicted
    }

    /// Clears all frames.
    ///
    /// # Security Notes
    ///
    /// Use when starting a fresh evaluation run. All frames are permanently lost.
    pub fn clear(&mut self) {
        self.evicted_count += self.frames.len() as u64;
        self.frames.clear();
    }

    /// Returns an iterator over all frames.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Returns total approximate memory usage in bytes.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.frames.iter().map(Frame::memory_size).sum()
    }

    /// Validates capacity and returns error if exceeded.
    ///
    /// # Returns
    ///
    /// `Ok(())` if within capacity, `Err(ContextOverflow)` if exceeded.
    ///
    /// # Security Notes
    ///
    /// Call this after operations that may add frames to ensure
    /// hard limits are respected. Unlike soft limits (threshold),
    /// this represents an absolute security boundary.
    pub fn validate_capacity(&self) -> Result<()> {
        if self.frames.len() > self.capacity {
            return Err(MonitorError::ContextOverflow {
                current: self.frames.len(),
                limit: self.capacity,
            });
        }
        Ok(())
    }
}

impl Default for ContextManager {
    /// Creates a manager with default capacity of 1000 frames.
    fn default() -> Self {
        Self::new(1000)
    }
}
