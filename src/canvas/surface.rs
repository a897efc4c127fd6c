use super::brush::{blend_highlight, segment_distance_sq};
use super::geometry::{SurfacePoint, SurfaceSize};
use image::{GrayImage, Luma, Rgba, RgbaImage};

/// The paintable raster: the rendered base image plus whatever strokes have
/// been blended over it.
///
/// `coverage` marks pixels the current stroke already touched so a single
/// stroke lays down one uniform translucent band; `painted` accumulates every
/// stroke since the last reset.
#[derive(Debug, Clone)]
pub struct MaskSurface {
    base: RgbaImage,
    pixels: RgbaImage,
    painted: GrayImage,
    coverage: GrayImage,
}

impl MaskSurface {
    pub fn from_base(base: RgbaImage) -> Self {
        let (width, height) = base.dimensions();
        Self {
            pixels: base.clone(),
            base,
            painted: GrayImage::new(width, height),
            coverage: GrayImage::new(width, height),
        }
    }

    pub fn size(&self) -> SurfaceSize {
        SurfaceSize {
            width: self.pixels.width(),
            height: self.pixels.height(),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn base(&self) -> &RgbaImage {
        &self.base
    }

    /// 255 wherever a stroke landed since the last reset, 0 elsewhere.
    pub fn painted_mask(&self) -> &GrayImage {
        &self.painted
    }

    /// Restores the rendered base in place and forgets every stroke.
    pub fn reset(&mut self) {
        self.pixels.copy_from_slice(self.base.as_raw());
        self.painted.fill(0);
        self.coverage.fill(0);
    }

    pub(super) fn start_stroke(&mut self) {
        self.coverage.fill(0);
    }

    /// Blends every pixel whose coordinate lies within `width / 2` of the
    /// segment `from -> to` and has not been touched by the current stroke.
    pub(super) fn paint_segment(&mut self, from: SurfacePoint, to: SurfacePoint, width: u32) {
        let radius = f64::from(width) / 2.0;
        let radius_sq = radius * radius;
        let a = (f64::from(from.x), f64::from(from.y));
        let b = (f64::from(to.x), f64::from(to.y));

        let Some((x_range, y_range)) = self.clipped_bounds(a, b, radius) else {
            return;
        };

        for y in y_range {
            for x in x_range.clone() {
                if segment_distance_sq(f64::from(x), f64::from(y), a, b) > radius_sq {
                    continue;
                }
                if self.coverage.get_pixel(x, y).0[0] != 0 {
                    continue;
                }
                let blended = blend_highlight(self.pixels.get_pixel(x, y).0);
                self.pixels.put_pixel(x, y, Rgba(blended));
                self.coverage.put_pixel(x, y, Luma([255]));
                self.painted.put_pixel(x, y, Luma([255]));
            }
        }
    }

    fn clipped_bounds(
        &self,
        a: (f64, f64),
        b: (f64, f64),
        radius: f64,
    ) -> Option<(std::ops::RangeInclusive<u32>, std::ops::RangeInclusive<u32>)> {
        let axis = |lo: f64, hi: f64, extent: u32| {
            let min = (lo - radius).floor().max(0.0);
            let max = (hi + radius).ceil().min(f64::from(extent) - 1.0);
            (min <= max).then(|| (min as u32)..=(max as u32))
        };
        let x_range = axis(a.0.min(b.0), a.0.max(b.0), self.pixels.width())?;
        let y_range = axis(a.1.min(b.1), a.1.max(b.1), self.pixels.height())?;
        Some((x_range, y_range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blue_surface(width: u32, height: u32) -> MaskSurface {
        MaskSurface::from_base(RgbaImage::from_pixel(width, height, Rgba([20, 40, 200, 255])))
    }

    #[test]
    fn test_single_stroke_blends_each_pixel_once() {
        let mut surface = blue_surface(40, 40);
        surface.start_stroke();
        surface.paint_segment(SurfacePoint::new(10.0, 20.0), SurfacePoint::new(20.0, 20.0), 6);
        surface.paint_segment(SurfacePoint::new(20.0, 20.0), SurfacePoint::new(10.0, 20.0), 6);

        let once = blend_highlight([20, 40, 200, 255]);
        assert_eq!(surface.pixels().get_pixel(15, 20).0, once);
    }

    #[test]
    fn test_separate_strokes_accumulate() {
        let mut surface = blue_surface(40, 40);
        for _ in 0..2 {
            surface.start_stroke();
            surface.paint_segment(SurfacePoint::new(15.0, 15.0), SurfacePoint::new(15.0, 15.0), 4);
        }
        let twice = blend_highlight(blend_highlight([20, 40, 200, 255]));
        assert_eq!(surface.pixels().get_pixel(15, 15).0, twice);
    }

    #[test]
    fn test_segment_outside_the_surface_is_clipped() {
        let mut surface = blue_surface(10, 10);
        surface.start_stroke();
        surface.paint_segment(SurfacePoint::new(-50.0, -50.0), SurfacePoint::new(-40.0, -50.0), 8);
        assert_eq!(surface.pixels(), surface.base());

        surface.paint_segment(SurfacePoint::new(-3.0, 5.0), SurfacePoint::new(2.0, 5.0), 2);
        assert_ne!(surface.pixels().get_pixel(0, 5), surface.base().get_pixel(0, 5));
        assert_eq!(surface.pixels().get_pixel(4, 5), surface.base().get_pixel(4, 5));
    }

    #[test]
    fn test_reset_restores_base_and_clears_painted_mask() {
        let mut surface = blue_surface(20, 20);
        surface.start_stroke();
        surface.paint_segment(SurfacePoint::new(2.0, 2.0), SurfacePoint::new(18.0, 18.0), 5);
        assert!(surface.painted_mask().pixels().any(|p| p.0[0] == 255));

        surface.reset();
        assert_eq!(surface.pixels(), surface.base());
        assert!(surface.painted_mask().pixels().all(|p| p.0[0] == 0));
    }
}
