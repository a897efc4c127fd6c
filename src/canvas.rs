mod brush;
mod controller;
mod geometry;
mod source;
mod surface;

pub use brush::{BrushSetting, HIGHLIGHT_ALPHA, HIGHLIGHT_RGB};
pub use controller::MaskCanvasController;
pub use geometry::{
    fit_scale, fitted_size, ContainerBounds, PointerMapping, SurfacePoint, SurfaceSize,
};
pub use source::{encode_png_data_url, DecodedImage, ImageReference};
pub use surface::MaskSurface;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("image {image} could not be decoded")]
    Decode {
        image: u64,
        #[source]
        source: image::ImageError,
    },
    #[error("image has no pixels")]
    EmptyImage,
    #[error("invalid base64 in image data URL")]
    InvalidDataUrl(#[from] base64::DecodeError),
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode surface as PNG")]
    Encode(#[source] image::ImageError),
    #[error("image decode task did not complete")]
    DecodeTaskFailed(#[from] tokio::task::JoinError),
}
