//! Margin-to-pixel geometry: clip rectangles and pixel crop boxes.
//!
//! All types here are plain value types in document space (PDF points,
//! top-left origin) or pixel space. The two operations are pure functions:
//! the same inputs always produce the same outputs, with a fixed
//! truncate-toward-zero policy when mapping points to pixels, so crop
//! behaviour is reproducible across runs and in tests.

use crate::error::KbError;

/// Geometric bounds of a page in document-space points, top-left origin.
///
/// Fixed by the source document; immutable once loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBounds {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageBounds {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// Four non-negative margin offsets in document-space points.
///
/// Mutable during an interactive review session; reset to the configured
/// defaults when a new page starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Margins {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Zero margins: the clip rectangle equals the page bounds.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

/// The sub-region of a page remaining after margins are subtracted.
///
/// Invariant (enforced by [`compute_clip`]): `x0 < x1` and `y0 < y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// Integer pixel crop box inside a rendered page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// Subtract margins from page bounds, yielding the clip rectangle.
///
/// Returns [`KbError::InvalidRegion`] when the margins leave a degenerate or
/// inverted rectangle, so the caller never sees a negative-area crop.
pub fn compute_clip(bounds: PageBounds, margins: Margins) -> Result<ClipRect, KbError> {
    let clip = ClipRect {
        x0: bounds.x0 + margins.left,
        y0: bounds.y0 + margins.top,
        x1: bounds.x1 - margins.right,
        y1: bounds.y1 - margins.bottom,
    };

    if clip.x0 >= clip.x1 || clip.y0 >= clip.y1 {
        return Err(KbError::InvalidRegion {
            width: bounds.width(),
            height: bounds.height(),
            lr: margins.left + margins.right,
            tb: margins.top + margins.bottom,
        });
    }

    Ok(clip)
}

/// Map a clip rectangle into pixel space for a rendered image.
///
/// `scale` is the render scale (rendered image height / page height).
/// Each coordinate is scaled independently and truncated toward zero, then
/// clamped into the image bounds; out-of-bounds values are clamped, never
/// wrapped.
pub fn compute_crop_box(
    clip: ClipRect,
    scale: f32,
    img_width: u32,
    img_height: u32,
) -> Result<PixelBox, KbError> {
    if !(scale > 0.0) || !scale.is_finite() {
        return Err(KbError::InvalidScale { scale });
    }

    // Truncation toward zero, per coordinate, no shared rounding state.
    let px = |v: f32| -> u32 { (v * scale).max(0.0) as u32 };

    let x0 = px(clip.x0).min(img_width);
    let y0 = px(clip.y0).min(img_height);
    let x1 = px(clip.x1).min(img_width);
    let y1 = px(clip.y1).min(img_height);

    Ok(PixelBox { x0, y0, x1, y1 })
}
