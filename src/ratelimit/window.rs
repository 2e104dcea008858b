//! Fixed-window state and the admission rule applied to it.

use std::time::{Duration, Instant};

use crate::error::{Result, WindowgateError};

/// Outcome of applying a [`WindowRule`] to a [`WindowState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The previous window had elapsed; a new one was opened with this request.
    Reset,
    /// Counted against the current window.
    Admitted,
    /// The current window is full.
    Rejected,
}

impl Decision {
    /// Whether the request was let through.
    pub fn is_admitted(self) -> bool {
        !matches!(self, Decision::Rejected)
    }
}

/// The requests admitted for one key within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// When the current window began
    window_start: Instant,
    /// Requests admitted since `window_start`
    count: u64,
}

impl WindowState {
    /// Open an empty window starting at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    /// When the current window began.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Requests admitted in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    fn reset(&mut self, now: Instant, count: u64) {
        self.window_start = now;
        self.count = count;
    }
}

/// Immutable limiter parameters: how many requests fit into how long a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRule {
    max_size: u64,
    duration: Duration,
}

impl WindowRule {
    /// Validate and build a rule.
    pub fn new(max_size: u64, duration: Duration) -> Result<Self> {
        if max_size < 1 {
            return Err(WindowgateError::InvalidMaxSize(max_size));
        }
        if duration.is_zero() {
            return Err(WindowgateError::InvalidDuration(duration));
        }
        Ok(Self { max_size, duration })
    }

    /// Maximum admitted requests per window.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Length of each window.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether the window starting at `window_start` is over at `now`.
    ///
    /// A window covers `[start, start + duration]` inclusive, so a request
    /// landing exactly on the end still counts against it.
    pub fn has_elapsed(&self, window_start: Instant, now: Instant) -> bool {
        now.saturating_duration_since(window_start) > self.duration
    }

    /// Decide a single request against `state`, updating it in place.
    ///
    /// The caller must hold exclusive access to `state` for the whole call.
    pub fn apply(&self, state: &mut WindowState, now: Instant) -> Decision {
        if self.has_elapsed(state.window_start, now) {
            state.reset(now, 1);
            return Decision::Reset;
        }

        if state.count < self.max_size {
            state.count += 1;
            return Decision::Admitted;
        }

        Decision::Rejected
    }
}
