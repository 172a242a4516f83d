#![forbid(unsafe_code)]

//! Window index tracking.
//!
//! The window is the contiguous, inclusive range of cache indices whose
//! elements are allowed in the document.
//!
//! # Invariants
//!
//! - `0 <= start <= end < count` whenever `count > 0`; empty when `count == 0`.
//! - The span is never below `min(window_size, count)`.
//! - Growth happens in whole `step`s (clamped at the edges), never one item
//!   at a time, so scroll positions near a threshold do not cause churn.
//! - The window never shrinks by itself. Only [`WindowTracker::slide_to_bottom`]
//!   and tail re-anchoring move it.

use core::ops::RangeInclusive;

use crate::trace;

/// Inclusive range of cache indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start + 1
    }

    #[must_use]
    pub const fn contains(&self, idx: usize) -> bool {
        self.start <= idx && idx <= self.end
    }

    #[must_use]
    pub const fn range(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Tracks the window over a cache of `count` records.
#[derive(Debug, Clone)]
pub struct WindowTracker {
    window: Option<Window>,
    count: usize,
    window_size: usize,
    step: usize,
}

impl WindowTracker {
    /// `window_size` and `step` are raised to at least 1.
    #[must_use]
    pub fn new(window_size: usize, step: usize) -> Self {
        Self {
            window: None,
            count: 0,
            window_size: window_size.max(1),
            step: step.max(1),
        }
    }

    /// Current window, `None` while the cache is empty.
    #[must_use]
    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// Cache size the window was last fitted to.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn contains(&self, idx: usize) -> bool {
        self.window.is_some_and(|w| w.contains(idx))
    }

    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.window.map_or(0, |w| w.len())
    }

    fn tail_anchored(&self, count: usize) -> Option<Window> {
        (count > 0).then(|| Window::new(count.saturating_sub(self.window_size), count - 1))
    }

    /// Anchor the window to the newest `window_size` records.
    pub fn initialize(&mut self, count: usize) {
        self.count = count;
        self.window = self.tail_anchored(count);
        trace!(target: "longchat::window", count, window = ?self.window, "window initialized");
    }

    /// Refit the window after the cache changed size.
    ///
    /// A window that reached the former tail follows the new tail and keeps
    /// its span; any other window is clamped into range and widened back up
    /// to the minimum size if clamping cut it short.
    pub fn reclamp(&mut self, count: usize) {
        let previous_count = self.count;
        self.count = count;
        let Some(old) = self.window else {
            self.window = self.tail_anchored(count);
            return;
        };
        if count == 0 {
            self.window = None;
            return;
        }

        let min_span = self.window_size.min(count);
        let new = if old.end + 1 >= previous_count {
            let span = old.len().clamp(min_span, count);
            Window::new(count - span, count - 1)
        } else {
            let end = old.end.min(count - 1);
            let mut start = old.start.min(end);
            let mut end = end;
            if end - start + 1 < min_span {
                start = (end + 1).saturating_sub(min_span);
                end = (start + min_span - 1).min(count - 1);
            }
            Window::new(start, end)
        };
        if Some(new) != self.window {
            trace!(target: "longchat::window", ?old, ?new, count, "window reclamped");
        }
        self.window = Some(new);
    }

    /// Reveal one step of older history. Returns whether the window moved.
    pub fn extend_backward(&mut self) -> bool {
        match self.window.as_mut() {
            Some(w) if w.start > 0 => {
                w.start = w.start.saturating_sub(self.step);
                true
            }
            _ => false,
        }
    }

    /// Reveal one step of newer history. Returns whether the window moved.
    pub fn extend_forward(&mut self) -> bool {
        let last = self.count.saturating_sub(1);
        match self.window.as_mut() {
            Some(w) if w.end < last => {
                w.end = (w.end + self.step).min(last);
                true
            }
            _ => false,
        }
    }

    /// Jump to the newest `window_size` records. Returns whether the window
    /// moved.
    pub fn slide_to_bottom(&mut self) -> bool {
        let target = self.tail_anchored(self.count);
        let changed = target != self.window;
        self.window = target;
        changed
    }
}
