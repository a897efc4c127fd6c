use super::brush::BrushSetting;
use super::geometry::{fit_scale, fitted_size, ContainerBounds, SurfacePoint, SurfaceSize};
use super::source::{encode_png_data_url, DecodedImage, ImageReference};
use super::surface::MaskSurface;
use super::CanvasError;
use crate::api::logging::emit_decode_failure;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};

struct LoadedImage {
    reference: ImageReference,
    decoded: DecodedImage,
    scale: f64,
}

/// Owns the paintable overlay for one displayed image.
///
/// Stroke points are taken in surface pixels as-is; translating pointer
/// events is the caller's job (see [`super::PointerMapping`]).
pub struct MaskCanvasController {
    bounds: ContainerBounds,
    brush: BrushSetting,
    loaded: Option<LoadedImage>,
    surface: Option<MaskSurface>,
    stroke_tip: Option<SurfacePoint>,
}

impl MaskCanvasController {
    pub fn new(bounds: ContainerBounds, brush: BrushSetting) -> Self {
        Self {
            bounds,
            brush,
            loaded: None,
            surface: None,
            stroke_tip: None,
        }
    }

    /// Decodes `image`, fits it to the container and renders it as the new
    /// base, discarding every stroke.
    ///
    /// If decoding fails the current surface, if any, is left exactly as it
    /// was.
    pub async fn load_image(&mut self, image: &ImageReference) -> Result<SurfaceSize, CanvasError> {
        let decoded = match image.decode().await {
            Ok(decoded) => decoded,
            Err(error) => {
                emit_decode_failure(image.id(), &error.to_string());
                return Err(error);
            }
        };

        let scale = fit_scale(
            decoded.natural_width(),
            decoded.natural_height(),
            self.bounds,
        );
        let surface = MaskSurface::from_base(render_base(&decoded, scale));
        let size = surface.size();

        self.loaded = Some(LoadedImage {
            reference: image.clone(),
            decoded,
            scale,
        });
        self.surface = Some(surface);
        self.stroke_tip = None;
        Ok(size)
    }

    /// Re-fits the loaded image to new container bounds.
    ///
    /// Reallocates the surface (dropping strokes) only when the fit actually
    /// changes; returns the surface size when an image is loaded.
    pub fn set_container(&mut self, bounds: ContainerBounds) -> Option<SurfaceSize> {
        self.bounds = bounds;
        let loaded = self.loaded.as_mut()?;
        let scale = fit_scale(
            loaded.decoded.natural_width(),
            loaded.decoded.natural_height(),
            bounds,
        );
        let current = self.surface.as_ref().map(MaskSurface::size);
        let target = fitted_size(
            loaded.decoded.natural_width(),
            loaded.decoded.natural_height(),
            scale,
        );

        if scale != loaded.scale || current != Some(target) {
            loaded.scale = scale;
            self.surface = Some(MaskSurface::from_base(render_base(&loaded.decoded, scale)));
            self.stroke_tip = None;
        }
        Some(target)
    }

    pub fn begin_stroke(&mut self, point: SurfacePoint) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        surface.start_stroke();
        self.stroke_tip = Some(point);
    }

    /// Draws a round-capped segment from the previous point to `point` at the
    /// brush's current width.
    pub fn extend_stroke(&mut self, point: SurfacePoint) {
        let (Some(surface), Some(tip)) = (self.surface.as_mut(), self.stroke_tip) else {
            return;
        };
        surface.paint_segment(tip, point, self.brush.width());
        self.stroke_tip = Some(point);
    }

    pub fn end_stroke(&mut self) {
        self.stroke_tip = None;
    }

    /// Puts the rendered base back over the whole surface.
    pub fn reset(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            surface.reset();
        }
        self.stroke_tip = None;
    }

    /// Base image plus strokes, as currently visible.
    pub fn export_masked_surface(&self) -> Option<RgbaImage> {
        self.surface.as_ref().map(|surface| surface.pixels().clone())
    }

    pub fn export_png_data_url(&self) -> Result<Option<String>, CanvasError> {
        self.surface
            .as_ref()
            .map(|surface| encode_png_data_url(surface.pixels()))
            .transpose()
    }

    pub fn painted_mask(&self) -> Option<GrayImage> {
        self.surface
            .as_ref()
            .map(|surface| surface.painted_mask().clone())
    }

    pub fn surface(&self) -> Option<&MaskSurface> {
        self.surface.as_ref()
    }

    pub fn surface_size(&self) -> Option<SurfaceSize> {
        self.surface.as_ref().map(MaskSurface::size)
    }

    pub fn fit_scale(&self) -> Option<f64> {
        self.loaded.as_ref().map(|loaded| loaded.scale)
    }

    pub fn image(&self) -> Option<&ImageReference> {
        self.loaded.as_ref().map(|loaded| &loaded.reference)
    }

    pub fn has_image(&self) -> bool {
        self.surface.is_some()
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke_tip.is_some()
    }

    pub fn brush(&self) -> &BrushSetting {
        &self.brush
    }

    pub fn bounds(&self) -> ContainerBounds {
        self.bounds
    }
}

fn render_base(decoded: &DecodedImage, scale: f64) -> RgbaImage {
    let size = fitted_size(decoded.natural_width(), decoded.natural_height(), scale);
    let pixels = decoded.pixels();
    if pixels.dimensions() == (size.width, size.height) {
        return pixels.clone();
    }
    imageops::resize(pixels, size.width, size.height, FilterType::Lanczos3)
}
