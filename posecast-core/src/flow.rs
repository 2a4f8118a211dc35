//! Per-frame admission control.
//!
//! Consulted once per capture callback, before any transform work, so
//! dropped frames cost nothing. Two gates, checked in order:
//!
//! 1. **Frame-rate cap**: fewer than `min_frame_interval` since the
//!    last admitted frame → drop.
//! 2. **Single outstanding request**: a response is still pending and
//!    `response_timeout` has not elapsed since the send → drop.
//!
//! Once the timeout has elapsed the pending request is abandoned and
//! the frame goes through, so a lost response never stalls the stream.

use std::time::{Duration, Instant};

// ── FlowConfig ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowConfig {
    /// Minimum spacing between admitted frames.
    pub min_frame_interval: Duration,
    /// How long to wait for a response before giving up on it.
    pub response_timeout: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            min_frame_interval: Duration::from_millis(100),
            response_timeout: Duration::from_millis(1500),
        }
    }
}

// ── Admission ────────────────────────────────────────────────────

/// Verdict for one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Transform and send. `abandoned` is set when a timed-out
    /// request was released to let this frame through.
    Proceed { abandoned: bool },
    /// Inside the frame-rate cap.
    RateLimited,
    /// Still waiting on the previous response.
    AwaitingResponse,
}

// ── FlowController ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FlowController {
    config: FlowConfig,
    last_sent_at: Option<Instant>,
    last_processed_at: Option<Instant>,
    awaiting_response: bool,
}

impl FlowController {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            last_sent_at: None,
            last_processed_at: None,
            awaiting_response: false,
        }
    }

    /// Decide whether the frame captured at `now` may proceed.
    ///
    /// On [`Admission::Proceed`] the frame counts as processed from
    /// here on, whether or not the send succeeds.
    pub fn admit(&mut self, now: Instant) -> Admission {
        if let Some(last) = self.last_processed_at {
            if now.saturating_duration_since(last) < self.config.min_frame_interval {
                return Admission::RateLimited;
            }
        }

        let mut abandoned = false;
        if self.awaiting_response {
            let waited = self
                .last_sent_at
                .map(|sent| now.saturating_duration_since(sent))
                .unwrap_or(Duration::MAX);
            if waited < self.config.response_timeout {
                return Admission::AwaitingResponse;
            }
            self.awaiting_response = false;
            abandoned = true;
        }

        self.last_processed_at = Some(now);
        Admission::Proceed { abandoned }
    }

    /// Record that a frame went out at `now`.
    pub fn mark_sent(&mut self, now: Instant) {
        self.awaiting_response = true;
        self.last_sent_at = Some(now);
    }

    /// A response arrived; the next frame need not wait.
    pub fn on_response(&mut self) {
        self.awaiting_response = false;
    }

    /// Forget any in-flight request (channel reset).
    pub fn reset(&mut self) {
        self.awaiting_response = false;
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    pub fn last_processed_at(&self) -> Option<Instant> {
        self.last_processed_at
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }
}

// ── Tests ────────────────────────────────────────────────────────
