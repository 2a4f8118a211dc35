//! Capture-side frame transforms.
//!
//! ```text
//! PlanarImage ──extract──► PackedFrame ──downsample──► PackedFrame ──rotate──► PackedFrame
//!  (borrowed,               (native size)               (target size)           (upright)
//!   strided)
//! ```
//!
//! | Module       | Purpose                                              |
//! |------------- |------------------------------------------------------|
//! | `types`      | `PlanarImage`, `Plane`, `Rotation`, `PackedFrame`    |
//! | `extract`    | Strided planes → packed luma + interleaved chroma    |
//! | `downsample` | Nearest-neighbour resample to a fixed target size    |
//! | `rotate`     | Quarter-turn rotation preserving chroma pairs        |
//! | `pipeline`   | The three stages composed, ready for framing         |

pub mod downsample;
pub mod extract;
pub mod pipeline;
pub mod rotate;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use downsample::Downsampler;
pub use extract::extract;
pub use pipeline::{FramePipeline, PipelineConfig};
pub use rotate::rotate;
pub use types::{PackedFrame, PlanarImage, Plane, Rotation};
