//! Shared types for the capture → wire pipeline.
//!
//! [`PlanarImage`] borrows the capture subsystem's buffers for the
//! duration of one callback. Every later stage works on an owned
//! [`PackedFrame`], so nothing outlives the callback.

use std::fmt;

use crate::error::PosecastError;

// ── Rotation ─────────────────────────────────────────────────────

/// Clockwise rotation applied to bring a captured frame upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// All supported rotations, in ascending order.
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    /// Rotation in degrees.
    pub const fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// The rotation that undoes this one (`360 - r`).
    pub const fn inverse(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg0,
            Rotation::Deg90 => Rotation::Deg270,
            Rotation::Deg180 => Rotation::Deg180,
            Rotation::Deg270 => Rotation::Deg90,
        }
    }

    /// Whether width and height trade places under this rotation.
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl TryFrom<u32> for Rotation {
    type Error = PosecastError;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(PosecastError::InvalidRotation(other)),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

// ── Plane ────────────────────────────────────────────────────────

/// One sample plane as handed over by the capture subsystem.
///
/// Rows start `row_stride` bytes apart and samples within a row are
/// `pixel_stride` bytes apart. Neither is assumed to be tight.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Byte offset of the sample at `(x, y)`.
    pub fn offset(&self, x: usize, y: usize) -> usize {
        y * self.row_stride + x * self.pixel_stride
    }
}

// ── PlanarImage ──────────────────────────────────────────────────

/// A 4:2:0 planar image: full-resolution luma followed by two
/// half-resolution chroma planes.
#[derive(Debug, Clone, Copy)]
pub struct PlanarImage<'a> {
    /// Luma width in pixels.
    pub width: u32,
    /// Luma height in pixels.
    pub height: u32,
    /// Rotation needed to display the frame upright.
    pub rotation: Rotation,
    /// `[luma, first chroma, second chroma]`. The packed output
    /// interleaves chroma in this order.
    pub planes: [Plane<'a>; 3],
}

// ── PackedFrame ──────────────────────────────────────────────────

/// Luma plane followed by interleaved chroma pairs, no row padding.
///
/// The buffer is always exactly `width * height * 3 / 2` bytes; the
/// constructor refuses anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PackedFrame {
    /// Byte length of a packed frame with the given luma dimensions.
    ///
    /// Saturates instead of overflowing; use [`checked_len`](Self::checked_len)
    /// for dimensions that come off the wire.
    pub const fn expected_len(width: u32, height: u32) -> usize {
        (width as usize).saturating_mul(height as usize).saturating_mul(3) / 2
    }

    /// Byte length for untrusted dimensions, `None` if it does not fit.
    pub fn checked_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(3)
            .map(|n| n / 2)
    }

    /// Wrap `data`, validating its geometry.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PosecastError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(PosecastError::InvalidDimensions { width, height });
        }
        let expected = Self::checked_len(width, height)
            .ok_or(PosecastError::InvalidDimensions { width, height })?;
        if data.len() != expected {
            return Err(PosecastError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build from a buffer whose geometry the caller has already
    /// established (e.g. a rotation of a valid frame).
    pub(crate) fn from_trusted(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), Self::expected_len(width, height));
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The whole packed buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Full-resolution luma samples.
    pub fn luma(&self) -> &[u8] {
        &self.data[..self.luma_len()]
    }

    /// Interleaved chroma pairs at half resolution.
    pub fn chroma(&self) -> &[u8] {
        &self.data[self.luma_len()..]
    }

    fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_from_degrees() {
        assert_eq!(Rotation::try_from(90).unwrap(), Rotation::Deg90);
        assert_eq!(Rotation::try_from(270).unwrap(), Rotation::Deg270);
        assert!(matches!(
            Rotation::try_from(45),
            Err(PosecastError::InvalidRotation(45))
        ));
    }

    #[test]
    fn rotation_inverse_sums_to_full_turn() {
        for r in Rotation::ALL {
            assert_eq!((r.degrees() + r.inverse().degrees()) % 360, 0);
        }
    }

    #[test]
    fn packed_frame_rejects_wrong_length() {
        let err = PackedFrame::new(4, 4, vec![0; 23]).unwrap_err();
        assert!(matches!(
            err,
            PosecastError::SizeMismatch {
                expected: 24,
                actual: 23
            }
        ));
    }

    #[test]
    fn packed_frame_rejects_odd_dimensions() {
        assert!(PackedFrame::new(3, 4, vec![0; 18]).is_err());
        assert!(PackedFrame::new(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn length_of_huge_dimensions_does_not_overflow() {
        assert_eq!(PackedFrame::checked_len(4, 4), Some(24));
        assert_eq!(PackedFrame::checked_len(u32::MAX, u32::MAX), None);
        assert!(PackedFrame::expected_len(u32::MAX, u32::MAX) > crate::codec::MAX_FRAME_SIZE);
    }

    #[test]
    fn packed_frame_splits_planes() {
        let data: Vec<u8> = (0..24).collect();
        let frame = PackedFrame::new(4, 4, data).unwrap();
        assert_eq!(frame.luma().len(), 16);
        assert_eq!(frame.chroma(), &[16, 17, 18, 19, 20, 21, 22, 23]);
    }

    #[test]
    fn plane_offset_honours_strides() {
        let buf = [0u8; 64];
        let plane = Plane::new(&buf, 10, 2);
        assert_eq!(plane.offset(3, 2), 26);
    }
}
