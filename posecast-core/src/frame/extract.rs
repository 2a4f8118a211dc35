//! Plane extraction: strided planar image → tightly packed frame.
//!
//! Copies the luma plane row by row, then walks both chroma planes at
//! half resolution writing one sample from each per step. Row and pixel
//! strides are honoured independently per plane, so padded rows and
//! semi-planar chroma (pixel stride 2) both work.

use crate::error::PosecastError;
use crate::frame::types::{PackedFrame, PlanarImage, Plane};

/// Pack `image` into a [`PackedFrame`] at native resolution.
///
/// Fails with [`PosecastError::SizeMismatch`] if the number of bytes
/// written is not `width * height * 3 / 2` (odd dimensions), and with
/// [`PosecastError::PlaneTooShort`] if a plane ends early.
pub fn extract(image: &PlanarImage<'_>) -> Result<PackedFrame, PosecastError> {
    let width = image.width as usize;
    let height = image.height as usize;
    if width == 0 || height == 0 {
        return Err(PosecastError::InvalidDimensions {
            width: image.width,
            height: image.height,
        });
    }
    for (index, plane) in image.planes.iter().enumerate() {
        if plane.pixel_stride == 0 {
            return Err(PosecastError::InvalidStride(index));
        }
    }

    let expected = PackedFrame::checked_len(image.width, image.height).ok_or(
        PosecastError::InvalidDimensions {
            width: image.width,
            height: image.height,
        },
    )?;
    let mut out = Vec::with_capacity(expected);

    let [luma, first, second] = &image.planes;

    for y in 0..height {
        copy_row(luma, 0, y, width, &mut out)?;
    }

    for y in 0..height / 2 {
        for x in 0..width / 2 {
            out.push(sample(first, 1, x, y)?);
            out.push(sample(second, 2, x, y)?);
        }
    }

    if out.len() != expected {
        return Err(PosecastError::SizeMismatch {
            expected,
            actual: out.len(),
        });
    }

    PackedFrame::new(image.width, image.height, out)
}

fn copy_row(
    plane: &Plane<'_>,
    index: usize,
    y: usize,
    width: usize,
    out: &mut Vec<u8>,
) -> Result<(), PosecastError> {
    if plane.pixel_stride == 1 {
        let start = plane.offset(0, y);
        let row = plane
            .data
            .get(start..start + width)
            .ok_or(PosecastError::PlaneTooShort {
                plane: index,
                needed: start + width,
                available: plane.data.len(),
            })?;
        out.extend_from_slice(row);
        return Ok(());
    }
    for x in 0..width {
        out.push(sample(plane, index, x, y)?);
    }
    Ok(())
}

fn sample(plane: &Plane<'_>, index: usize, x: usize, y: usize) -> Result<u8, PosecastError> {
    let offset = plane.offset(x, y);
    plane
        .data
        .get(offset)
        .copied()
        .ok_or(PosecastError::PlaneTooShort {
            plane: index,
            needed: offset + 1,
            available: plane.data.len(),
        })
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::types::Rotation;
    use proptest::prelude::*;

    /// Lay out `cols × rows` samples from `value` with the given strides.
    fn padded_plane(
        cols: usize,
        rows: usize,
        row_stride: usize,
        pixel_stride: usize,
        value: impl Fn(usize, usize) -> u8,
    ) -> Vec<u8> {
        let mut buf = vec![0xEE; row_stride * rows];
        for y in 0..rows {
            for x in 0..cols {
                buf[y * row_stride + x * pixel_stride] = value(x, y);
            }
        }
        buf
    }

    #[test]
    fn tight_planes_pack_in_order() {
        let y: Vec<u8> = (0..16).collect();
        let u = [100, 101, 102, 103];
        let v = [200, 201, 202, 203];
        let image = PlanarImage {
            width: 4,
            height: 4,
            rotation: Rotation::Deg0,
            planes: [Plane::new(&y, 4, 1), Plane::new(&u, 2, 1), Plane::new(&v, 2, 1)],
        };

        let frame = extract(&image).unwrap();
        assert_eq!(frame.luma(), y.as_slice());
        assert_eq!(frame.chroma(), &[100, 200, 101, 201, 102, 202, 103, 203]);
    }

    #[test]
    fn padded_rows_and_pixel_stride_two() {
        let y = padded_plane(4, 2, 7, 1, |x, y| (y * 4 + x) as u8);
        let u = padded_plane(2, 1, 6, 2, |x, _| 50 + x as u8);
        let v = padded_plane(2, 1, 6, 2, |x, _| 60 + x as u8);
        let image = PlanarImage {
            width: 4,
            height: 2,
            rotation: Rotation::Deg0,
            planes: [Plane::new(&y, 7, 1), Plane::new(&u, 6, 2), Plane::new(&v, 6, 2)],
        };

        let frame = extract(&image).unwrap();
        assert_eq!(frame.as_bytes(), &[0, 1, 2, 3, 4, 5, 6, 7, 50, 60, 51, 61]);
    }

    #[test]
    fn luma_with_pixel_stride_two() {
        let y = padded_plane(2, 2, 4, 2, |x, y| (10 * y + x) as u8);
        let c = [9u8];
        let image = PlanarImage {
            width: 2,
            height: 2,
            rotation: Rotation::Deg0,
            planes: [Plane::new(&y, 4, 2), Plane::new(&c, 1, 1), Plane::new(&c, 1, 1)],
        };
        let frame = extract(&image).unwrap();
        assert_eq!(frame.as_bytes(), &[0, 1, 10, 11, 9, 9]);
    }

    #[test]
    fn odd_dimensions_are_a_size_mismatch() {
        let y = [0u8; 9];
        let c = [0u8; 4];
        let image = PlanarImage {
            width: 3,
            height: 3,
            rotation: Rotation::Deg0,
            planes: [Plane::new(&y, 3, 1), Plane::new(&c, 2, 1), Plane::new(&c, 2, 1)],
        };
        assert!(matches!(
            extract(&image),
            Err(PosecastError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn short_plane_is_reported() {
        let y = [0u8; 16];
        let u = [0u8; 3];
        let v = [0u8; 4];
        let image = PlanarImage {
            width: 4,
            height: 4,
            rotation: Rotation::Deg0,
            planes: [Plane::new(&y, 4, 1), Plane::new(&u, 2, 1), Plane::new(&v, 2, 1)],
        };
        assert!(matches!(
            extract(&image),
            Err(PosecastError::PlaneTooShort { plane: 1, .. })
        ));
    }

    #[test]
    fn zero_pixel_stride_is_rejected() {
        let buf = [0u8; 16];
        let image = PlanarImage {
            width: 4,
            height: 4,
            rotation: Rotation::Deg0,
            planes: [Plane::new(&buf, 4, 1), Plane::new(&buf, 2, 0), Plane::new(&buf, 2, 1)],
        };
        assert!(matches!(extract(&image), Err(PosecastError::InvalidStride(1))));
    }

    proptest! {
        #[test]
        fn prop_extracted_length_is_three_halves(
            half_w in 1usize..16,
            half_h in 1usize..16,
            luma_pad in 0usize..8,
            chroma_pad in 0usize..8,
            chroma_pixel_stride in 1usize..3,
        ) {
            let (w, h) = (half_w * 2, half_h * 2);
            let luma_stride = w + luma_pad;
            let chroma_stride = half_w * chroma_pixel_stride + chroma_pad;
            let y = vec![1u8; luma_stride * h];
            let c = vec![2u8; chroma_stride * half_h];
            let image = PlanarImage {
                width: w as u32,
                height: h as u32,
                rotation: Rotation::Deg0,
                planes: [
                    Plane::new(&y, luma_stride, 1),
                    Plane::new(&c, chroma_stride, chroma_pixel_stride),
                    Plane::new(&c, chroma_stride, chroma_pixel_stride),
                ],
            };
            let frame = extract(&image).unwrap();
            prop_assert_eq!(frame.byte_len(), w * h * 3 / 2);
        }
    }
}
