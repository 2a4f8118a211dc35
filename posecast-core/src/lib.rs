//! # posecast-core
//!
//! Streams camera frames to a remote inference service and turns its
//! keypoint responses into a view-space overlay.
//!
//! This crate contains:
//! - **Frame**: plane extraction, downsampling and rotation of 4:2:0 images
//! - **Codec**: `FrameHeader` + `FrameCodec`, the 16-byte-header binary framing
//! - **Flow**: `FlowController`, the frame-rate cap and single-outstanding gate
//! - **Response**: keypoint parsing, view mapping and temporal smoothing
//! - **Session**: `TransportSession`, the WebSocket link with reconnect backoff
//! - **Metrics**: throttled, circuit-breaking latency reporting
//! - **Error**: `PosecastError`, a `thiserror`-based error hierarchy

pub mod codec;
pub mod error;
pub mod flow;
pub mod frame;
pub mod metrics;
pub mod response;
pub mod session;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{FrameCodec, FrameHeader, FrameMessage, MAX_FRAME_SIZE};
pub use error::PosecastError;
pub use flow::{Admission, FlowConfig, FlowController};
pub use frame::{FramePipeline, PackedFrame, PipelineConfig, PlanarImage, Plane, Rotation};
pub use metrics::{
    Delivery, JsonLinesSink, MetricsConfig, MetricsReporter, MetricsSample, MetricsSink,
    TracingSink,
};
pub use response::{
    CameraFacing, DisplayMode, KeypointSet, Overlay, Point, ResponseProcessor, ResponseTiming,
    SendTimestampQueue, Smoother, ViewGeometry, ViewTransform,
};
pub use session::{
    BackoffPolicy, ConnectionState, DropReason, FrameOutcome, OUTBOUND_QUEUE_DEPTH, OverlaySink,
    SessionConfig, SessionStats, TransportSession,
};
