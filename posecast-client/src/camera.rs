//! Synthetic capture source.
//!
//! Produces 4:2:0 frames laid out the way mobile camera stacks hand
//! them over: padded luma rows and a single interleaved chroma buffer
//! exposed as two planes with a pixel stride of 2. The luma carries a
//! diagonal gradient that shifts every frame so successive frames
//! differ.

use std::time::Duration;

use posecast_core::{PlanarImage, Plane, PosecastError, Rotation};

use crate::config::CaptureConfig;

/// Bytes of padding at the end of every row.
const ROW_PADDING: usize = 32;

pub struct SyntheticCamera {
    width: u32,
    height: u32,
    rotation: Rotation,
    fps: u32,
    frames: u64,
    luma: Vec<u8>,
    chroma: Vec<u8>,
}

impl SyntheticCamera {
    pub fn new(config: &CaptureConfig, rotation: Rotation) -> Result<Self, PosecastError> {
        let (width, height) = (config.width, config.height);
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(PosecastError::InvalidDimensions { width, height });
        }
        let stride = Self::row_stride(width);
        Ok(Self {
            width,
            height,
            rotation,
            fps: config.fps.clamp(1, 120),
            frames: 0,
            luma: vec![0; stride * height as usize],
            chroma: vec![0; stride * (height as usize / 2)],
        })
    }

    fn row_stride(width: u32) -> usize {
        width as usize + ROW_PADDING
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps
    }

    pub fn frames_produced(&self) -> u64 {
        self.frames
    }

    /// Render the next frame and lend it out until the next call.
    pub fn next_frame(&mut self) -> PlanarImage<'_> {
        let stride = Self::row_stride(self.width);
        let (w, h) = (self.width as usize, self.height as usize);
        let shift = (self.frames % 256) as usize * 4;

        for y in 0..h {
            let row = &mut self.luma[y * stride..y * stride + w];
            for (x, px) in row.iter_mut().enumerate() {
                *px = ((x + y + shift) % 256) as u8;
            }
        }
        for y in 0..h / 2 {
            let row = &mut self.chroma[y * stride..y * stride + w];
            for pair in row.chunks_exact_mut(2) {
                pair[0] = 0x80;
                pair[1] = (0x60 + y % 64) as u8;
            }
        }
        self.frames += 1;

        PlanarImage {
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            planes: [
                Plane::new(&self.luma, stride, 1),
                Plane::new(&self.chroma, stride, 2),
                Plane::new(&self.chroma[1..], stride, 2),
            ],
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
