//! Domain-specific error types for the posecast pipeline.
//!
//! All fallible operations return `Result<T, PosecastError>`.
//! A failing frame never takes the session down: callers drop the
//! frame and carry on.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for posecast.
#[derive(Debug, Error)]
pub enum PosecastError {
    // ── Frame Errors ─────────────────────────────────────────────
    /// The packed buffer length does not match `width * height * 3 / 2`.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A source plane ended before all of its samples were read.
    #[error("plane {plane} too short: need {needed} bytes, have {available}")]
    PlaneTooShort {
        plane: usize,
        needed: usize,
        available: usize,
    },

    /// A plane reported a zero pixel stride.
    #[error("plane {0} has a zero pixel stride")]
    InvalidStride(usize),

    /// Width or height is zero, odd, or otherwise unusable.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Rotation is not one of 0, 90, 180 or 270 degrees.
    #[error("invalid rotation: {0} degrees")]
    InvalidRotation(u32),

    /// The downsample target is zero or odd.
    #[error("invalid downsample target: {width}x{height}")]
    InvalidTarget { width: u32, height: u32 },

    // ── Wire Errors ──────────────────────────────────────────────
    /// Fewer bytes than a frame header.
    #[error("frame header too short: {0} bytes")]
    HeaderTooShort(usize),

    /// Header `payload_len` disagrees with its own geometry.
    #[error("payload length {actual} does not match {width}x{height} (expected {expected})")]
    PayloadLengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// Frame size exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Response Errors ──────────────────────────────────────────
    /// The inbound payload is not a JSON object we can read.
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    // ── Connection Errors ────────────────────────────────────────
    /// The WebSocket layer reported an error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] async_tungstenite::tungstenite::Error),

    /// A connection state transition was attempted from the wrong state.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: crate::session::ConnectionState,
        action: &'static str,
    },

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Session methods were called outside a Tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    // ── Metrics Errors ───────────────────────────────────────────
    /// A metrics sink could not write its sample.
    #[error("metrics sink i/o: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = PosecastError::SizeMismatch {
            expected: 1500,
            actual: 1400,
        };
        assert!(e.to_string().contains("1500"));
        assert!(e.to_string().contains("1400"));

        let e = PosecastError::InvalidRotation(45);
        assert!(e.to_string().contains("45"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: PosecastError = io_err.into();
        assert!(matches!(e, PosecastError::Io(_)));
        assert!(e.to_string().contains("pipe broke"));
    }

    #[test]
    fn from_websocket() {
        let e: PosecastError = async_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(e, PosecastError::WebSocket(_)));
    }

    #[test]
    fn from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: PosecastError = json_err.into();
        assert!(matches!(e, PosecastError::MalformedResponse(_)));
    }
}
