//! Nearest-neighbour resampling of packed frames.
//!
//! Each destination sample maps back to `floor(dst * src_dim / dst_dim)`,
//! clamped to `src_dim - 1`. Luma is mapped at full resolution, the
//! chroma pairs at half resolution with the same scale, moving both
//! bytes of a pair together.

use crate::error::PosecastError;
use crate::frame::types::PackedFrame;

/// Resamples frames to a fixed target resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Downsampler {
    target_width: u32,
    target_height: u32,
}

impl Downsampler {
    /// Create a downsampler; the target must be even and non-zero.
    pub fn new(target_width: u32, target_height: u32) -> Result<Self, PosecastError> {
        if target_width == 0
            || target_height == 0
            || target_width % 2 != 0
            || target_height % 2 != 0
        {
            return Err(PosecastError::InvalidTarget {
                width: target_width,
                height: target_height,
            });
        }
        Ok(Self {
            target_width,
            target_height,
        })
    }

    pub fn target(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Resample `frame` to the target resolution.
    ///
    /// A frame already at the target size is returned untouched.
    pub fn apply(&self, frame: PackedFrame) -> Result<PackedFrame, PosecastError> {
        if (frame.width(), frame.height()) == self.target() {
            return Ok(frame);
        }

        let (src_w, src_h) = (frame.width() as usize, frame.height() as usize);
        let (dst_w, dst_h) = (self.target_width as usize, self.target_height as usize);
        let expected = PackedFrame::expected_len(self.target_width, self.target_height);
        let mut out = Vec::with_capacity(expected);

        resample_plane(frame.luma(), src_w, src_h, dst_w, dst_h, 1, &mut out);
        resample_plane(
            frame.chroma(),
            src_w / 2,
            src_h / 2,
            dst_w / 2,
            dst_h / 2,
            2,
            &mut out,
        );

        if out.len() != expected {
            return Err(PosecastError::SizeMismatch {
                expected,
                actual: out.len(),
            });
        }
        PackedFrame::new(self.target_width, self.target_height, out)
    }
}

/// Source index for destination index `dst`, never past `src_dim - 1`.
pub(crate) fn nearest(dst: usize, dst_dim: usize, src_dim: usize) -> usize {
    (dst * src_dim / dst_dim).min(src_dim - 1)
}

fn resample_plane(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
    elem: usize,
    out: &mut Vec<u8>,
) {
    let columns: Vec<usize> = (0..dst_w).map(|x| nearest(x, dst_w, src_w)).collect();
    for y in 0..dst_h {
        let row = nearest(y, dst_h, src_h) * src_w;
        for &x in &columns {
            let at = (row + x) * elem;
            out.extend_from_slice(&src[at..at + elem]);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
