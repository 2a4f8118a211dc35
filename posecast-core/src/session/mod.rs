//! The persistent inference link.
//!
//! A [`TransportSession`] owns one WebSocket connection to the
//! inference service and everything whose meaning depends on it: the
//! connection state, flow control, the send-timestamp queue and the
//! response processor. All of it sits behind a single lock so the three
//! entry points (capture callbacks, socket events and reconnect timers)
//! never observe each other half-way.
//!
//! Every connection attempt and every reconnect timer is stamped with
//! an epoch. Tearing down or superseding a link bumps the epoch, after
//! which anything the old task reports is ignored. That is what keeps a
//! late response from touching a fresh session, and a stale timer from
//! opening a second connection.

pub mod backoff;
pub mod state;

pub use backoff::{Backoff, BackoffPolicy};
pub use state::ConnectionState;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_tungstenite::tokio::connect_async;
use async_tungstenite::tungstenite::Message;
use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::PosecastError;
use crate::flow::{Admission, FlowConfig, FlowController};
use crate::frame::{FramePipeline, PipelineConfig, PlanarImage};
use crate::metrics::{MetricsConfig, MetricsReporter, MetricsSink};
use crate::response::{
    Overlay, ResponseProcessor, SendTimestampQueue, ViewGeometry, DEFAULT_SMOOTHING_ALPHA,
};

/// Frames that may wait for the socket before new ones are dropped.
pub const OUTBOUND_QUEUE_DEPTH: usize = 4;

// ── SessionConfig ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint of the inference service.
    pub url: String,
    /// Upper bound on one connect handshake.
    pub connect_timeout: Duration,
    pub flow: FlowConfig,
    pub backoff: BackoffPolicy,
    pub pipeline: PipelineConfig,
    pub view: ViewGeometry,
    pub smoothing_alpha: f32,
    pub metrics: MetricsConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:5000/ws".to_string(),
            connect_timeout: Duration::from_millis(5000),
            flow: FlowConfig::default(),
            backoff: BackoffPolicy::default(),
            pipeline: PipelineConfig::default(),
            view: ViewGeometry::default(),
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
            metrics: MetricsConfig::default(),
        }
    }
}

// ── Outputs ──────────────────────────────────────────────────────

/// Receives one [`Overlay`] per processed response.
///
/// Called from the socket task, outside the session lock. Keep it
/// short; it runs once per response.
pub trait OverlaySink: Send + Sync {
    fn draw(&self, overlay: &Overlay);
}

impl<F> OverlaySink for F
where
    F: Fn(&Overlay) + Send + Sync,
{
    fn draw(&self, overlay: &Overlay) {
        self(overlay)
    }
}

/// Why a captured frame was not sent.
#[derive(Debug)]
pub enum DropReason {
    /// No open link, or it closed while the frame was being transformed.
    NotConnected,
    RateLimited,
    AwaitingResponse,
    /// The socket is not draining; the outbound queue is full.
    QueueFull,
    /// The transform pipeline rejected the frame.
    Transform(PosecastError),
}

/// Result of [`TransportSession::on_frame`].
#[derive(Debug)]
pub enum FrameOutcome {
    /// Queued on the socket; `bytes` includes the header.
    Sent { bytes: usize },
    Dropped(DropReason),
}

impl FrameOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Counters since the session was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub state: ConnectionState,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub responses: u64,
    /// Attempts started by the backoff timer or by regained reachability.
    pub reconnect_attempts: u64,
    /// Delay of the most recently scheduled reconnect.
    pub retry_delay: Option<Duration>,
}

// ── TransportSession ─────────────────────────────────────────────

/// Handle to one inference session. Cheap to clone.
///
/// Background tasks keep the session alive; call
/// [`disconnect`](Self::disconnect) to shut it down.
#[derive(Clone)]
pub struct TransportSession {
    shared: Arc<Shared>,
}

struct Shared {
    config: SessionConfig,
    pipeline: FramePipeline,
    runtime: Handle,
    overlay: Arc<dyn OverlaySink>,
    inner: Mutex<Inner>,
}

struct Inner {
    connection: ConnectionState,
    epoch: u64,
    /// Cleared by an explicit disconnect, set again by connect.
    auto_reconnect: bool,
    reachable: bool,
    backoff: Backoff,
    flow: FlowController,
    timestamps: SendTimestampQueue,
    processor: ResponseProcessor,
    metrics: MetricsReporter,
    outbound: Option<mpsc::Sender<Message>>,
    /// Connection task or reconnect timer for the current epoch.
    task: Option<JoinHandle<()>>,
    stats: SessionStats,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TransportSession {
    /// Build a session. Must be called from within a Tokio runtime;
    /// background tasks are spawned onto that runtime.
    pub fn new(
        config: SessionConfig,
        overlay: Arc<dyn OverlaySink>,
        metrics_sink: Box<dyn MetricsSink>,
    ) -> Result<Self, PosecastError> {
        let runtime = Handle::try_current().map_err(|_| PosecastError::NoRuntime)?;
        let pipeline = FramePipeline::new(&config.pipeline)?;
        let inner = Inner {
            connection: ConnectionState::Disconnected,
            epoch: 0,
            auto_reconnect: false,
            reachable: true,
            backoff: Backoff::new(config.backoff),
            flow: FlowController::new(config.flow),
            timestamps: SendTimestampQueue::new(),
            processor: ResponseProcessor::new(config.view, config.smoothing_alpha),
            metrics: MetricsReporter::new(config.metrics, metrics_sink),
            outbound: None,
            task: None,
            stats: SessionStats::default(),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                pipeline,
                runtime,
                overlay,
                inner: Mutex::new(inner),
            }),
        })
    }

    /// Open the link and keep it open until [`disconnect`](Self::disconnect).
    ///
    /// No-op while already connecting or connected. Supersedes a pending
    /// reconnect timer. While the network is unreachable the attempt is
    /// deferred until [`set_network_reachable`](Self::set_network_reachable)
    /// reports it back.
    pub fn connect(&self) {
        let mut inner = self.shared.lock();
        inner.auto_reconnect = true;
        if inner.connection.is_active() {
            debug!("connect ignored: already {}", inner.connection);
            return;
        }
        if !inner.reachable {
            info!("network unreachable; connect deferred");
            return;
        }
        inner.backoff.reset();
        self.shared.start_attempt(&mut inner);
    }

    /// Close the link and stop reconnecting. Idempotent.
    ///
    /// In-flight accounting is cleared before this returns; a response
    /// that arrives afterwards is discarded.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        inner.auto_reconnect = false;
        if inner.connection != ConnectionState::Disconnected {
            info!(url = %self.shared.config.url, "disconnecting");
        }
        Shared::teardown(&mut inner);
    }

    /// Feed the platform's reachability signal.
    ///
    /// Losing reachability closes the link without consuming a backoff
    /// step. Regaining it starts an attempt straight away if the session
    /// wants to be connected.
    pub fn set_network_reachable(&self, reachable: bool) {
        let mut inner = self.shared.lock();
        if inner.reachable == reachable {
            return;
        }
        inner.reachable = reachable;

        if reachable {
            info!("network reachable");
            let idle = matches!(
                inner.connection,
                ConnectionState::Disconnected | ConnectionState::AwaitingReconnect
            );
            if inner.auto_reconnect && idle {
                inner.stats.reconnect_attempts += 1;
                self.shared.start_attempt(&mut inner);
            }
        } else {
            warn!("network unreachable; closing link");
            Shared::teardown(&mut inner);
        }
    }

    /// Run one captured frame through flow control, the transform
    /// pipeline and the socket.
    ///
    /// The image is fully consumed before this returns.
    pub fn on_frame(&self, image: &PlanarImage<'_>) -> FrameOutcome {
        let epoch = {
            let mut inner = self.shared.lock();
            if !inner.connection.is_connected() || inner.outbound.is_none() {
                return inner.drop_frame(DropReason::NotConnected);
            }
            match inner.flow.admit(Instant::now()) {
                Admission::RateLimited => return inner.drop_frame(DropReason::RateLimited),
                Admission::AwaitingResponse => {
                    return inner.drop_frame(DropReason::AwaitingResponse)
                }
                Admission::Proceed { abandoned } => {
                    if abandoned {
                        debug!("response timed out; abandoning it");
                        inner.timestamps.pop();
                    }
                }
            }
            inner.epoch
        };

        let message = match self.shared.pipeline.process(image) {
            Ok(message) => message,
            Err(e) => {
                debug!("frame rejected by pipeline: {e}");
                return self.shared.lock().drop_frame(DropReason::Transform(e));
            }
        };
        let (width, height) = (message.header.width, message.header.height);
        let bytes = message.to_bytes();
        let len = bytes.len();

        let mut inner = self.shared.lock();
        if inner.epoch != epoch {
            return inner.drop_frame(DropReason::NotConnected);
        }
        let Some(tx) = inner.outbound.as_ref() else {
            return inner.drop_frame(DropReason::NotConnected);
        };
        match tx.try_send(Message::binary(bytes)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(depth = OUTBOUND_QUEUE_DEPTH, "outbound queue full");
                return inner.drop_frame(DropReason::QueueFull);
            }
            Err(TrySendError::Closed(_)) => return inner.drop_frame(DropReason::NotConnected),
        }

        let now = Instant::now();
        inner.flow.mark_sent(now);
        inner.timestamps.push(now);
        inner.processor.note_frame_sent(width, height);
        inner.stats.frames_sent += 1;
        trace!(width, height, bytes = len, "frame sent");
        FrameOutcome::Sent { bytes: len }
    }

    /// Change the view the overlay is drawn into (rotation, camera
    /// switch, resize).
    pub fn set_view(&self, view: ViewGeometry) {
        self.shared.lock().processor.set_view(view);
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().connection
    }

    pub fn stats(&self) -> SessionStats {
        let inner = self.shared.lock();
        SessionStats {
            state: inner.connection,
            ..inner.stats
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }
}

impl Inner {
    fn drop_frame(&mut self, reason: DropReason) -> FrameOutcome {
        trace!(?reason, "frame dropped");
        self.stats.frames_dropped += 1;
        FrameOutcome::Dropped(reason)
    }

    /// Forget everything tied to the current link.
    fn reset_accounting(&mut self) {
        self.timestamps.clear();
        self.flow.reset();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin a fresh connection attempt in a new epoch.
    fn start_attempt(self: &Arc<Self>, inner: &mut Inner) {
        if let Err(e) = inner.connection.begin_connect() {
            debug!("attempt skipped: {e}");
            return;
        }
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.outbound = None;
        inner.epoch += 1;
        let epoch = inner.epoch;

        debug!(url = %self.config.url, epoch, "connecting");
        let shared = Arc::clone(self);
        inner.task = Some(self.runtime.spawn(shared.run_connection(epoch)));
    }

    /// Close whatever link exists and settle in `Disconnected`.
    fn teardown(inner: &mut Inner) {
        inner.epoch += 1;
        let had_link = inner.outbound.take().is_some();
        if let Some(task) = inner.task.take() {
            // an open link closes itself once its sender is gone
            if !had_link {
                task.abort();
            }
        }
        inner.reset_accounting();
        inner.connection.force_disconnect();
    }

    async fn run_connection(self: Arc<Self>, epoch: u64) {
        let url = self.config.url.as_str();
        let stream = match tokio::time::timeout(self.config.connect_timeout, connect_async(url)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                self.connect_failed(epoch, e.into());
                return;
            }
            Err(_) => {
                self.connect_failed(epoch, PosecastError::Timeout(self.config.connect_timeout));
                return;
            }
        };

        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return;
            }
            if let Err(e) = inner.connection.connected() {
                debug!("stale connect result: {e}");
                return;
            }
            inner.backoff.reset();
            inner.outbound = Some(tx);
        }
        info!(%url, "connected");

        let (mut sink, mut incoming) = stream.split();
        loop {
            tokio::select! {
                outgoing = rx.recv() => match outgoing {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            let e = PosecastError::from(e);
                            warn!("send failed: {e}");
                            break;
                        }
                    }
                    None => {
                        if let Err(e) = sink.close(None).await {
                            debug!("close handshake failed: {}", PosecastError::from(e));
                        }
                        break;
                    }
                },
                received = incoming.next() => match received {
                    Some(Ok(Message::Text(text))) => self.handle_response(epoch, text.as_str()),
                    Some(Ok(Message::Binary(data))) => {
                        debug!(len = data.len(), "ignoring binary message");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "server closed the link");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let e = PosecastError::from(e);
                        warn!("link error: {e}");
                        break;
                    }
                    None => break,
                },
            }
        }

        self.handle_closed(epoch);
    }

    fn connect_failed(self: &Arc<Self>, epoch: u64, error: PosecastError) {
        warn!(url = %self.config.url, "connect failed: {error}");
        self.handle_closed(epoch);
    }

    /// The link for `epoch` is gone, whether it ever opened or not.
    fn handle_closed(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return;
        }
        inner.outbound = None;
        // this is the task that is finishing
        inner.task = None;
        inner.reset_accounting();

        if !(inner.auto_reconnect && inner.reachable) {
            inner.connection.force_disconnect();
            return;
        }
        if let Err(e) = inner.connection.schedule_reconnect() {
            debug!("reconnect not scheduled: {e}");
            inner.connection.force_disconnect();
            return;
        }

        let delay = inner.backoff.next_delay();
        inner.stats.retry_delay = Some(delay);
        inner.epoch += 1;
        let epoch = inner.epoch;
        info!(delay_ms = delay.as_millis() as u64, "link lost; reconnecting");

        let shared = Arc::clone(self);
        inner.task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.reconnect_due(epoch);
        }));
    }

    fn reconnect_due(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.connection != ConnectionState::AwaitingReconnect {
            return;
        }
        // the timer's own handle; must not be aborted by start_attempt
        inner.task = None;
        inner.stats.reconnect_attempts += 1;
        self.start_attempt(&mut inner);
    }

    fn handle_response(&self, epoch: u64, text: &str) {
        let now = Instant::now();
        let overlay = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return;
            }
            let sent_at = inner.timestamps.pop();
            inner.flow.on_response();
            inner.stats.responses += 1;

            let timing = inner.processor.timing(sent_at, now);
            inner.metrics.offer(&timing, now);
            match inner.processor.process(text, timing) {
                Ok(overlay) => overlay,
                Err(e) => {
                    warn!("discarding unreadable response: {e}");
                    return;
                }
            }
        };
        trace!(points = overlay.points.len(), edges = overlay.edges.len(), "overlay ready");
        self.overlay.draw(&overlay);
    }
}

// ── Tests ────────────────────────────────────────────────────────
