//! The capture-side transform chain, composed.

use crate::codec::FrameMessage;
use crate::error::PosecastError;
use crate::frame::downsample::Downsampler;
use crate::frame::extract::extract;
use crate::frame::rotate::rotate;
use crate::frame::types::PlanarImage;

// ── PipelineConfig ───────────────────────────────────────────────

/// Tuning for [`FramePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Downsample target width, in capture orientation.
    pub target_width: u32,
    /// Downsample target height, in capture orientation.
    pub target_height: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_width: 100,
            target_height: 100,
        }
    }
}

// ── FramePipeline ────────────────────────────────────────────────

/// Extract → downsample → rotate, producing a wire-ready message.
///
/// Stateless apart from its configuration, so one instance can be
/// shared by every capture callback.
#[derive(Debug, Clone)]
pub struct FramePipeline {
    downsampler: Downsampler,
}

impl FramePipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self, PosecastError> {
        Ok(Self {
            downsampler: Downsampler::new(config.target_width, config.target_height)?,
        })
    }

    /// Output dimensions for a frame with the given rotation hint.
    pub fn output_size(&self, image: &PlanarImage<'_>) -> (u32, u32) {
        let (w, h) = self.downsampler.target();
        if image.rotation.swaps_axes() { (h, w) } else { (w, h) }
    }

    /// Run every stage on `image`. The returned message owns all of
    /// its data; `image` may be released as soon as this returns.
    pub fn process(&self, image: &PlanarImage<'_>) -> Result<FrameMessage, PosecastError> {
        let packed = extract(image)?;
        let scaled = self.downsampler.apply(packed)?;
        let upright = rotate(scaled, image.rotation);
        Ok(FrameMessage::new(upright, image.rotation))
    }
}

// ── Tests ────────────────────────────────────────────────────────
