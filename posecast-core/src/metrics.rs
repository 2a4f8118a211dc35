//! Side-channel latency reporting.
//!
//! The session offers every [`ResponseTiming`] to a [`MetricsReporter`],
//! which forwards at most one sample per interval to a [`MetricsSink`].
//! Consecutive sink failures trip a circuit breaker that suspends
//! delivery for a cooldown window. None of this feeds back into the
//! frame pipeline.

use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::PosecastError;
use crate::response::ResponseTiming;

// ── MetricsSample ────────────────────────────────────────────────

/// One delivered measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSample {
    pub delay_ms: u64,
    pub fps: f64,
    /// Wall-clock time of the sample, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// Destination for metrics samples (an HTTP endpoint, a log, ...).
pub trait MetricsSink: Send + Sync {
    fn report(&self, sample: &MetricsSample) -> Result<(), PosecastError>;
}

/// Logs every sample at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn report(&self, sample: &MetricsSample) -> Result<(), PosecastError> {
        info!(
            delay_ms = sample.delay_ms,
            fps = format_args!("{:.1}", sample.fps),
            timestamp_ms = sample.timestamp_ms,
            "inference round-trip"
        );
        Ok(())
    }
}

/// Appends every sample as one JSON object per line.
pub struct JsonLinesSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }
}

impl std::fmt::Debug for JsonLinesSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}

impl MetricsSink for JsonLinesSink {
    fn report(&self, sample: &MetricsSample) -> Result<(), PosecastError> {
        let mut line = serde_json::to_vec(sample).map_err(std::io::Error::from)?;
        line.push(b'\n');
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(&line)?;
        out.flush()?;
        Ok(())
    }
}

// ── MetricsConfig ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Minimum spacing between delivered samples.
    pub interval: Duration,
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open.
    pub cooldown: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            failure_threshold: 3,
            cooldown: Duration::from_millis(30_000),
        }
    }
}

// ── MetricsReporter ──────────────────────────────────────────────

/// What happened to an offered sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Inside the interval, or the timing was incomplete.
    Throttled,
    /// The breaker is open.
    Suspended,
    Failed,
}

pub struct MetricsReporter {
    config: MetricsConfig,
    sink: Box<dyn MetricsSink>,
    last_sent_at: Option<Instant>,
    consecutive_failures: u32,
    suspended_until: Option<Instant>,
}

impl std::fmt::Debug for MetricsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsReporter")
            .field("config", &self.config)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("suspended_until", &self.suspended_until)
            .finish_non_exhaustive()
    }
}

impl MetricsReporter {
    pub fn new(config: MetricsConfig, sink: Box<dyn MetricsSink>) -> Self {
        Self {
            config,
            sink,
            last_sent_at: None,
            consecutive_failures: 0,
            suspended_until: None,
        }
    }

    /// Offer the timing of one response observed at `now`.
    ///
    /// Samples without both a delay and a rate are not reported.
    pub fn offer(&mut self, timing: &ResponseTiming, now: Instant) -> Delivery {
        let (Some(delay_ms), Some(fps)) = (timing.delay_ms, timing.fps) else {
            return Delivery::Throttled;
        };

        if let Some(until) = self.suspended_until {
            if now < until {
                return Delivery::Suspended;
            }
            debug!("metrics breaker closed, resuming delivery");
            self.suspended_until = None;
            self.consecutive_failures = 0;
        }

        if let Some(last) = self.last_sent_at {
            if now.saturating_duration_since(last) < self.config.interval {
                return Delivery::Throttled;
            }
        }
        self.last_sent_at = Some(now);

        let sample = MetricsSample {
            delay_ms,
            fps,
            timestamp_ms: wall_clock_ms(),
        };
        match self.sink.report(&sample) {
            Ok(()) => {
                self.consecutive_failures = 0;
                Delivery::Sent
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        failures = self.consecutive_failures,
                        cooldown_ms = self.config.cooldown.as_millis() as u64,
                        "metrics sink failing, suspending delivery: {e}"
                    );
                    self.suspended_until = Some(now + self.config.cooldown);
                } else {
                    debug!("metrics delivery failed: {e}");
                }
                Delivery::Failed
            }
        }
    }

    pub fn is_suspended(&self, now: Instant) -> bool {
        self.suspended_until.is_some_and(|until| now < until)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Tests ────────────────────────────────────────────────────────
