use super::CanvasError;
use crate::types::{decode_data_url, png_bytes_to_data_url};
use bytes::Bytes;
use image::RgbaImage;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Immutable handle to an uploaded image's encoded bytes.
///
/// Clones share the bytes and the id; a new upload always gets a new id.
#[derive(Debug, Clone)]
pub struct ImageReference {
    id: u64,
    bytes: Bytes,
}

impl PartialEq for ImageReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ImageReference {}

impl ImageReference {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            bytes: bytes.into(),
        }
    }

    pub fn from_data_url(data_url: &str) -> Result<Self, CanvasError> {
        Ok(Self::from_bytes(decode_data_url(data_url)?))
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CanvasError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| CanvasError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Decodes on the blocking pool so the cooperative thread keeps serving
    /// other events meanwhile.
    pub async fn decode(&self) -> Result<DecodedImage, CanvasError> {
        let bytes = self.bytes.clone();
        let image = self.id;
        let pixels = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await?
            .map_err(|source| CanvasError::Decode { image, source })?
            .to_rgba8();

        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(CanvasError::EmptyImage);
        }
        Ok(DecodedImage {
            pixels: Arc::new(pixels),
        })
    }
}

/// Fully decoded RGBA pixels at natural size.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: Arc<RgbaImage>,
}

impl DecodedImage {
    pub fn natural_width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn natural_height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// PNG-encodes `pixels` as a `data:image/png;base64,...` URL.
pub fn encode_png_data_url(pixels: &RgbaImage) -> Result<String, CanvasError> {
    let mut png = std::io::Cursor::new(Vec::new());
    pixels
        .write_to(&mut png, image::ImageFormat::Png)
        .map_err(CanvasError::Encode)?;
    Ok(png_bytes_to_data_url(png.get_ref()))
}
