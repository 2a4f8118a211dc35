//! Client service core logic.
//!
//! Drives a [`TransportSession`] from the synthetic camera at the
//! configured frame rate and logs the overlays that come back.

use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use posecast_core::{
    DropReason, FrameOutcome, JsonLinesSink, MetricsSink, Overlay, OverlaySink, TracingSink,
    TransportSession,
};

use crate::camera::SyntheticCamera;
use crate::config::ClientConfig;

/// How often the capture loop logs session counters.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

// ── LoggingOverlay ───────────────────────────────────────────────

/// Overlay sink for headless runs: logs what would be drawn.
#[derive(Debug, Default)]
pub struct LoggingOverlay {
    drawn: AtomicU64,
}

impl LoggingOverlay {
    pub fn drawn(&self) -> u64 {
        self.drawn.load(Ordering::Relaxed)
    }
}

impl OverlaySink for LoggingOverlay {
    fn draw(&self, overlay: &Overlay) {
        self.drawn.fetch_add(1, Ordering::Relaxed);
        debug!(
            points = overlay.points.len(),
            segments = overlay.segments().count(),
            label = overlay.label.as_deref().unwrap_or(""),
            delay_ms = ?overlay.timing.delay_ms,
            "overlay"
        );
    }
}

// ── ClientService ────────────────────────────────────────────────

pub struct ClientService {
    config: ClientConfig,
    running: Arc<AtomicBool>,
}

impl ClientService {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the capture loop until stopped.
    ///
    /// 1. Opens the session and starts connecting.
    /// 2. Feeds one synthetic frame per tick; flow control decides
    ///    which ones go out.
    /// 3. Disconnects cleanly when `running` becomes `false`.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::SeqCst);

        let overlay = Arc::new(LoggingOverlay::default());
        let session = TransportSession::new(
            self.config.to_session_config(),
            overlay.clone(),
            self.metrics_sink()?,
        )?;
        let mut camera = SyntheticCamera::new(&self.config.capture, self.config.capture_rotation())?;

        info!("streaming to {}", session.config().url);
        session.connect();

        let mut ticker = tokio::time::interval(camera.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_report = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = Self::wait_for_stop(&self.running) => break,
            }

            if let FrameOutcome::Dropped(DropReason::Transform(e)) = session.on_frame(&camera.next_frame()) {
                warn!("frame rejected: {e}");
            }

            if last_report.elapsed() >= STATS_INTERVAL {
                let stats = session.stats();
                info!(
                    state = %stats.state,
                    sent = stats.frames_sent,
                    dropped = stats.frames_dropped,
                    responses = stats.responses,
                    reconnects = stats.reconnect_attempts,
                    drawn = overlay.drawn(),
                    "session stats"
                );
                last_report = Instant::now();
            }
        }

        session.disconnect();
        self.running.store(false, Ordering::SeqCst);
        info!(frames = camera.frames_produced(), "posecast client stopped");
        Ok(())
    }

    /// JSON lines to `metrics.log_file` when set, the log otherwise.
    fn metrics_sink(&self) -> std::io::Result<Box<dyn MetricsSink>> {
        let path = &self.config.metrics.log_file;
        if path.is_empty() {
            return Ok(Box::new(TracingSink));
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("writing metrics to {path}");
        Ok(Box::new(JsonLinesSink::new(file)))
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
