//! Configuration for the posecast client.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use posecast_core::{
    BackoffPolicy, CameraFacing, DisplayMode, FlowConfig, MetricsConfig, PipelineConfig,
    Rotation, SessionConfig, ViewGeometry,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Inference server connection.
    pub network: NetworkConfig,
    /// Frame admission.
    pub flow: FlowSection,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Frame transform.
    pub pipeline: PipelineSection,
    /// Overlay view geometry and smoothing.
    pub display: DisplayConfig,
    /// Latency reporting.
    pub metrics: MetricsSection,
    /// Synthetic capture source.
    pub capture: CaptureConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// WebSocket URL of the inference endpoint.
    pub server_url: String,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSection {
    /// Minimum spacing between transmitted frames.
    pub min_frame_interval_ms: u64,
    /// How long to wait for a response before sending anyway.
    pub response_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_ms: u64,
    pub multiplier: u32,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Downsample width, in capture orientation. Must be even.
    pub target_width: u32,
    /// Downsample height, in capture orientation. Must be even.
    pub target_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub view_width: f32,
    pub view_height: f32,
    /// "fill" or "fit".
    pub mode: DisplayMode,
    /// "front" or "back"; front mirrors the overlay.
    pub facing: CameraFacing,
    /// Weight of the previous frame when smoothing keypoints.
    pub smoothing_alpha: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    pub interval_ms: u64,
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    /// Append samples to this file as JSON lines; empty logs them instead.
    pub log_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    /// Frames generated per second.
    pub fps: u32,
    /// Rotation hint attached to every frame: 0, 90, 180 or 270.
    pub rotation: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:5000/ws".into(),
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            min_frame_interval_ms: 100,
            response_timeout_ms: 1500,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1000,
            multiplier: 2,
            max_backoff_ms: 16_000,
        }
    }
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            target_width: 100,
            target_height: 100,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            view_width: 1080.0,
            view_height: 1920.0,
            mode: DisplayMode::Fill,
            facing: CameraFacing::Front,
            smoothing_alpha: 0.7,
        }
    }
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            failure_threshold: 3,
            cooldown_ms: 30_000,
            log_file: String::new(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            rotation: 90,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Where [`ClientConfig::load`] got its values from.
///
/// Loading happens before logging is set up, so the outcome is
/// reported afterwards with [`log`](Self::log).
#[derive(Debug)]
pub enum ConfigSource {
    File,
    Missing,
    Invalid(toml::de::Error),
}

impl ConfigSource {
    pub fn log(&self, path: &Path) {
        match self {
            Self::File => tracing::info!("config loaded from {}", path.display()),
            Self::Missing => tracing::info!("no config at {}; using defaults", path.display()),
            Self::Invalid(e) => {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display())
            }
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return (Self::default(), ConfigSource::Missing);
        };
        match toml::from_str(&contents) {
            Ok(config) => (config, ConfigSource::File),
            Err(e) => (Self::default(), ConfigSource::Invalid(e)),
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Build the session settings, clamping anything out of range.
    pub fn to_session_config(&self) -> SessionConfig {
        let initial = self.reconnect.initial_backoff_ms.max(1);
        SessionConfig {
            url: self.network.server_url.clone(),
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.max(1)),
            flow: FlowConfig {
                min_frame_interval: Duration::from_millis(self.flow.min_frame_interval_ms.max(1)),
                response_timeout: Duration::from_millis(self.flow.response_timeout_ms),
            },
            backoff: BackoffPolicy {
                initial: Duration::from_millis(initial),
                multiplier: self.reconnect.multiplier.max(1),
                max: Duration::from_millis(self.reconnect.max_backoff_ms.max(initial)),
            },
            pipeline: PipelineConfig {
                target_width: even_nonzero(self.pipeline.target_width),
                target_height: even_nonzero(self.pipeline.target_height),
            },
            view: ViewGeometry {
                width: self.display.view_width.max(1.0),
                height: self.display.view_height.max(1.0),
                mode: self.display.mode,
                facing: self.display.facing,
            },
            smoothing_alpha: self.display.smoothing_alpha.clamp(0.0, 0.99),
            metrics: MetricsConfig {
                interval: Duration::from_millis(self.metrics.interval_ms),
                failure_threshold: self.metrics.failure_threshold.max(1),
                cooldown: Duration::from_millis(self.metrics.cooldown_ms),
            },
        }
    }

    /// The capture rotation hint; unsupported values fall back to 0.
    pub fn capture_rotation(&self) -> Rotation {
        Rotation::try_from(self.capture.rotation).unwrap_or_else(|e| {
            tracing::warn!("{e}; capturing without rotation");
            Rotation::Deg0
        })
    }
}

/// Round down to an even value, at least 2.
pub(crate) fn even_nonzero(v: u32) -> u32 {
    v.max(2) & !1
}

// ── Tests ────────────────────────────────────────────────────────
