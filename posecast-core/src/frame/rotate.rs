//! Quarter-turn rotation of packed frames.
//!
//! The buffer is treated as a `width × height` luma plane followed by a
//! `width/2 × height/2` plane of 2-byte chroma pairs, and each plane is
//! rotated clockwise on its own. Chroma pairs always move as a unit.

use crate::frame::types::{PackedFrame, Rotation};

/// Rotate `frame` clockwise by `rotation`.
///
/// Width and height are swapped for 90° and 270°. `Deg0` returns the
/// frame unchanged.
pub fn rotate(frame: PackedFrame, rotation: Rotation) -> PackedFrame {
    if rotation == Rotation::Deg0 {
        return frame;
    }

    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let mut out = Vec::with_capacity(frame.byte_len());
    rotate_plane(frame.luma(), w, h, 1, rotation, &mut out);
    rotate_plane(frame.chroma(), w / 2, h / 2, 2, rotation, &mut out);

    let (out_w, out_h) = if rotation.swaps_axes() {
        (frame.height(), frame.width())
    } else {
        (frame.width(), frame.height())
    };

    PackedFrame::from_trusted(out_w, out_h, out)
}

fn rotate_plane(src: &[u8], w: usize, h: usize, elem: usize, rotation: Rotation, out: &mut Vec<u8>) {
    let mut push = |x: usize, y: usize| {
        let at = (y * w + x) * elem;
        out.extend_from_slice(&src[at..at + elem]);
    };

    match rotation {
        Rotation::Deg0 => {
            for y in 0..h {
                for x in 0..w {
                    push(x, y);
                }
            }
        }
        Rotation::Deg180 => {
            for y in (0..h).rev() {
                for x in (0..w).rev() {
                    push(x, y);
                }
            }
        }
        // Output row `r` is input column `r` read bottom to top.
        Rotation::Deg90 => {
            for col in 0..w {
                for row in (0..h).rev() {
                    push(col, row);
                }
            }
        }
        // Output row `r` is input column `w-1-r` read top to bottom.
        Rotation::Deg270 => {
            for col in (0..w).rev() {
                for row in 0..h {
                    push(col, row);
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
