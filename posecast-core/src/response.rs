//! Inbound response handling.
//!
//! Each text message from the inference service carries keypoints in
//! the pixel space of the frame it analysed:
//!
//! ```json
//! { "image_width": 100, "image_height": 100,
//!   "keypoints": [[x, y], ...], "topology": [[i, j], ...],
//!   "label": "hand" }
//! ```
//!
//! [`ResponseProcessor`] pairs the message with its send timestamp,
//! maps the keypoints into view space and smooths them against the
//! previous frame. Anything malformed degrades to "draw less".

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PosecastError;

/// Default weight given to the previous frame when smoothing.
pub const DEFAULT_SMOOTHING_ALPHA: f32 = 0.7;

// ── SendTimestampQueue ───────────────────────────────────────────

/// Send times of frames that have not been answered yet, oldest first.
#[derive(Debug, Default, Clone)]
pub struct SendTimestampQueue {
    sent: VecDeque<Instant>,
}

impl SendTimestampQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: Instant) {
        self.sent.push_back(at);
    }

    /// Oldest outstanding send time, or `None` if nothing is in flight.
    pub fn pop(&mut self) -> Option<Instant> {
        self.sent.pop_front()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

// ── View geometry ────────────────────────────────────────────────

/// How the camera preview is fitted into the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Cover the whole view, cropping the overflow.
    #[default]
    Fill,
    /// Show the whole image, letterboxing the rest.
    Fit,
}

/// Which camera produced the frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// Selfie camera; the preview is mirrored horizontally.
    #[default]
    Front,
    Back,
}

/// The on-screen surface keypoints are drawn onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewGeometry {
    pub width: f32,
    pub height: f32,
    pub mode: DisplayMode,
    pub facing: CameraFacing,
}

impl Default for ViewGeometry {
    fn default() -> Self {
        Self {
            width: 1080.0,
            height: 1920.0,
            mode: DisplayMode::Fill,
            facing: CameraFacing::Front,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

// ── ViewTransform ────────────────────────────────────────────────

/// Image pixel space → view space, matching how the preview is laid out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
    view_width: f32,
    mirror: bool,
}

impl ViewTransform {
    pub fn new(view: &ViewGeometry, image_width: f32, image_height: f32) -> Self {
        let scale_x = view.width / image_width;
        let scale_y = view.height / image_height;
        let scale = match view.mode {
            DisplayMode::Fill => scale_x.max(scale_y),
            DisplayMode::Fit => scale_x.min(scale_y),
        };
        Self {
            scale,
            offset_x: (view.width - image_width * scale) / 2.0,
            offset_y: (view.height - image_height * scale) / 2.0,
            view_width: view.width,
            mirror: view.facing == CameraFacing::Front,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Centering offsets `(x, y)`; negative when the image overflows.
    pub fn offset(&self) -> (f32, f32) {
        (self.offset_x, self.offset_y)
    }

    pub fn map(&self, p: Point) -> Point {
        let x = p.x * self.scale + self.offset_x;
        let y = p.y * self.scale + self.offset_y;
        if self.mirror {
            Point::new(self.view_width - x, y)
        } else {
            Point::new(x, y)
        }
    }
}

// ── Smoother ─────────────────────────────────────────────────────

/// Exponential smoothing of keypoints across consecutive frames.
///
/// Only applies when the point count matches the previous frame;
/// otherwise the new points become the baseline as-is.
#[derive(Debug, Clone)]
pub struct Smoother {
    alpha: f32,
    previous: Option<Vec<Point>>,
}

impl Smoother {
    /// `alpha` is the weight of history, in `[0, 1)`.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            previous: None,
        }
    }

    pub fn apply(&mut self, current: Vec<Point>) -> Vec<Point> {
        let smoothed = match &self.previous {
            Some(prev) if prev.len() == current.len() => prev
                .iter()
                .zip(&current)
                .map(|(p, c)| {
                    Point::new(
                        p.x * self.alpha + c.x * (1.0 - self.alpha),
                        p.y * self.alpha + c.y * (1.0 - self.alpha),
                    )
                })
                .collect(),
            _ => current,
        };
        self.previous = Some(smoothed.clone());
        smoothed
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

// ── KeypointSet ──────────────────────────────────────────────────

/// One parsed response, still in server pixel space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeypointSet {
    pub image_width: Option<f32>,
    pub image_height: Option<f32>,
    pub points: Vec<Point>,
    /// Index pairs into `points`; not yet range-checked.
    pub edges: Vec<(usize, usize)>,
    pub label: Option<String>,
}

impl KeypointSet {
    /// Parse a response body leniently.
    ///
    /// Only text that is not JSON at all is an error. Missing or
    /// mistyped fields fall back to empty/absent. A malformed keypoint
    /// ends the list there so earlier indices stay meaningful, and
    /// malformed edges are skipped.
    pub fn parse(text: &str) -> Result<Self, PosecastError> {
        let root: Value = serde_json::from_str(text)?;
        let Some(obj) = root.as_object() else {
            return Ok(Self::default());
        };

        let dimension = |key: &str| {
            obj.get(key)
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite() && *v > 0.0)
                .map(|v| v as f32)
        };

        let points = obj
            .get("keypoints")
            .and_then(Value::as_array)
            .map(|list| list.iter().map_while(parse_point).collect())
            .unwrap_or_default();

        let edges = obj
            .get("topology")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(parse_edge).collect())
            .unwrap_or_default();

        Ok(Self {
            image_width: dimension("image_width"),
            image_height: dimension("image_height"),
            points,
            edges,
            label: obj.get("label").and_then(Value::as_str).map(str::to_owned),
        })
    }
}

fn parse_point(value: &Value) -> Option<Point> {
    let pair = value.as_array()?;
    let x = pair.first()?.as_f64()?;
    let y = pair.get(1)?.as_f64()?;
    Some(Point::new(x as f32, y as f32))
}

fn parse_edge(value: &Value) -> Option<(usize, usize)> {
    let pair = value.as_array()?;
    let a = pair.first()?.as_u64()?;
    let b = pair.get(1)?.as_u64()?;
    Some((a as usize, b as usize))
}

// ── Overlay ──────────────────────────────────────────────────────

/// Round-trip measurements for one response.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResponseTiming {
    /// Send-to-response delay; `None` when no send time was queued.
    pub delay_ms: Option<u64>,
    /// Instantaneous response rate; `None` for the first response.
    pub fps: Option<f64>,
}

/// What the overlay layer draws for one response, in view space.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub points: Vec<Point>,
    /// Only pairs whose endpoints exist in `points`.
    pub edges: Vec<(usize, usize)>,
    pub label: Option<String>,
    pub image_width: f32,
    pub image_height: f32,
    pub timing: ResponseTiming,
}

impl Overlay {
    /// Line segments to draw, one per edge.
    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.edges
            .iter()
            .filter_map(|&(a, b)| Some((*self.points.get(a)?, *self.points.get(b)?)))
    }
}

// ── ResponseProcessor ────────────────────────────────────────────

/// Turns inbound messages into [`Overlay`]s.
#[derive(Debug, Clone)]
pub struct ResponseProcessor {
    view: ViewGeometry,
    smoother: Smoother,
    last_response_at: Option<Instant>,
    last_frame_size: Option<(u32, u32)>,
}

impl ResponseProcessor {
    pub fn new(view: ViewGeometry, alpha: f32) -> Self {
        Self {
            view,
            smoother: Smoother::new(alpha),
            last_response_at: None,
            last_frame_size: None,
        }
    }

    pub fn view(&self) -> &ViewGeometry {
        &self.view
    }

    /// Replace the view geometry. Any change invalidates the smoothing
    /// history, since old points live in the old view space.
    pub fn set_view(&mut self, view: ViewGeometry) {
        if view != self.view {
            self.smoother.reset();
            self.view = view;
        }
    }

    /// Remember the dimensions of the last frame sent; used when a
    /// response omits its own image size.
    pub fn note_frame_sent(&mut self, width: u32, height: u32) {
        self.last_frame_size = Some((width, height));
    }

    /// Delay and rate for a response arriving at `now`.
    pub fn timing(&mut self, sent_at: Option<Instant>, now: Instant) -> ResponseTiming {
        let delay_ms = sent_at.map(|sent| now.saturating_duration_since(sent).as_millis() as u64);
        let fps = self.last_response_at.and_then(|last| {
            let elapsed_ms = now.saturating_duration_since(last).as_secs_f64() * 1000.0;
            (elapsed_ms > 0.0).then(|| 1000.0 / elapsed_ms)
        });
        self.last_response_at = Some(now);
        ResponseTiming { delay_ms, fps }
    }

    /// Parse, map and smooth one response body.
    pub fn process(&mut self, text: &str, timing: ResponseTiming) -> Result<Overlay, PosecastError> {
        let set = KeypointSet::parse(text)?;

        let (fallback_w, fallback_h) = self
            .last_frame_size
            .map(|(w, h)| (w as f32, h as f32))
            .unwrap_or((self.view.width, self.view.height));
        let image_width = set.image_width.unwrap_or(fallback_w);
        let image_height = set.image_height.unwrap_or(fallback_h);

        let transform = ViewTransform::new(&self.view, image_width, image_height);
        let mapped = set.points.iter().map(|p| transform.map(*p)).collect();
        let points = self.smoother.apply(mapped);

        let count = points.len();
        let edges = set
            .edges
            .into_iter()
            .filter(|&(a, b)| a < count && b < count)
            .collect();

        Ok(Overlay {
            points,
            edges,
            label: set.label,
            image_width,
            image_height,
            timing,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
