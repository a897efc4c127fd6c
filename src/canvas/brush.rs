use crate::config::DEFAULT_BRUSH_SIZE;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Highlight colour of mask strokes, `rgba(234, 179, 8, 0.4)`.
pub const HIGHLIGHT_RGB: [u8; 3] = [234, 179, 8];
pub const HIGHLIGHT_ALPHA: f32 = 0.4;

/// Stroke width in surface pixels, shared between whoever owns the setting
/// and the canvas that reads it.
///
/// Every clone observes the same value. The width is always at least 1.
#[derive(Debug, Clone)]
pub struct BrushSetting(Arc<AtomicU32>);

impl BrushSetting {
    pub fn new(width: u32) -> Self {
        Self(Arc::new(AtomicU32::new(width.max(1))))
    }

    pub fn width(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set_width(&self, width: u32) {
        self.0.store(width.max(1), Ordering::Relaxed);
    }

    pub fn radius(&self) -> f64 {
        f64::from(self.width()) / 2.0
    }
}

impl Default for BrushSetting {
    fn default() -> Self {
        Self::new(DEFAULT_BRUSH_SIZE)
    }
}

/// Source-over blend of the highlight onto one RGBA pixel.
pub(super) fn blend_highlight(pixel: [u8; 4]) -> [u8; 4] {
    let src_a = HIGHLIGHT_ALPHA;
    let dst_a = f32::from(pixel[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);

    let channel = |src: u8, dst: u8| {
        let value = (f32::from(src) * src_a + f32::from(dst) * dst_a * (1.0 - src_a)) / out_a;
        value.round().clamp(0.0, 255.0) as u8
    };

    [
        channel(HIGHLIGHT_RGB[0], pixel[0]),
        channel(HIGHLIGHT_RGB[1], pixel[1]),
        channel(HIGHLIGHT_RGB[2], pixel[2]),
        (out_a * 255.0).round() as u8,
    ]
}

/// Squared distance from `(px, py)` to the segment `a -> b`.
pub(super) fn segment_distance_sq(px: f64, py: f64, a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq == 0.0 {
        0.0
    } else {
        (((px - a.0) * dx + (py - a.1) * dy) / length_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    (px - cx) * (px - cx) + (py - cy) * (py - cy)
}
