use crate::config::{Config, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH};

/// Space the surface must fit into: the container's width and a height cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerBounds {
    pub width: u32,
    pub max_height: u32,
}

impl ContainerBounds {
    pub fn new(width: u32, max_height: u32) -> Self {
        Self { width, max_height }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.canvas_width, config.canvas_height)
    }
}

impl Default for ContainerBounds {
    fn default() -> Self {
        Self::new(DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

/// A position in surface pixels, origin at the surface's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub x: f32,
    pub y: f32,
}

impl SurfacePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Largest scale at which the image fits `bounds` without distortion.
pub fn fit_scale(natural_width: u32, natural_height: u32, bounds: ContainerBounds) -> f64 {
    let by_width = f64::from(bounds.width) / f64::from(natural_width.max(1));
    let by_height = f64::from(bounds.max_height) / f64::from(natural_height.max(1));
    by_width.min(by_height)
}

/// `round(natural * scale)` on both axes, never below one pixel.
pub fn fitted_size(natural_width: u32, natural_height: u32, scale: f64) -> SurfaceSize {
    let scaled = |natural: u32| ((f64::from(natural) * scale).round() as u32).max(1);
    SurfaceSize {
        width: scaled(natural_width),
        height: scaled(natural_height),
    }
}

/// Maps pointer positions reported against a displayed element onto the
/// surface it shows.
///
/// The element may be laid out at a different size than the surface (for
/// example when a stylesheet shrinks it to the available width), so both the
/// origin offset and the display-to-surface ratio are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerMapping {
    pub origin_x: f32,
    pub origin_y: f32,
    pub displayed_width: f32,
    pub displayed_height: f32,
    pub surface: SurfaceSize,
}

impl PointerMapping {
    /// Element displayed at exactly the surface size, with its top-left at
    /// `(origin_x, origin_y)` in pointer coordinates.
    pub fn unscaled(origin_x: f32, origin_y: f32, surface: SurfaceSize) -> Self {
        Self {
            origin_x,
            origin_y,
            displayed_width: surface.width as f32,
            displayed_height: surface.height as f32,
            surface,
        }
    }

    pub fn to_surface(&self, pointer_x: f32, pointer_y: f32) -> SurfacePoint {
        let (sx, sy) = self.ratios();
        SurfacePoint::new(
            (pointer_x - self.origin_x) * sx,
            (pointer_y - self.origin_y) * sy,
        )
    }

    pub fn to_pointer(&self, point: SurfacePoint) -> (f32, f32) {
        let (sx, sy) = self.ratios();
        (point.x / sx + self.origin_x, point.y / sy + self.origin_y)
    }

    fn ratios(&self) -> (f32, f32) {
        let ratio = |surface: u32, displayed: f32| {
            if displayed > 0.0 {
                surface as f32 / displayed
            } else {
                1.0
            }
        };
        (
            ratio(self.surface.width, self.displayed_width),
            ratio(self.surface.height, self.displayed_height),
        )
    }
}
