use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::{env_non_empty, is_local_endpoint_url};

pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_FAST_MODEL: &str = "gemini-flash-lite-latest";
pub const DEFAULT_CANVAS_WIDTH: u32 = 800;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 600;
pub const DEFAULT_BRUSH_SIZE: u32 = 30;
pub const MIN_BRUSH_SIZE: u32 = 5;
pub const MAX_BRUSH_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_url: String,
    pub edit_model: String,
    pub image_model: String,
    pub chat_model: String,
    pub fast_model: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub brush_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            brush_size: DEFAULT_BRUSH_SIZE,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let api_key = env_non_empty("GEMINI_API_KEY").or_else(|| env_non_empty("API_KEY"));

        Ok(Self {
            api_key,
            api_url: env_non_empty("GEMINI_API_URL").unwrap_or(defaults.api_url),
            edit_model: env_non_empty("MASKSTUDIO_EDIT_MODEL").unwrap_or(defaults.edit_model),
            image_model: env_non_empty("MASKSTUDIO_IMAGE_MODEL").unwrap_or(defaults.image_model),
            chat_model: env_non_empty("MASKSTUDIO_CHAT_MODEL").unwrap_or(defaults.chat_model),
            fast_model: env_non_empty("MASKSTUDIO_FAST_MODEL").unwrap_or(defaults.fast_model),
            canvas_width: env_u32("MASKSTUDIO_CANVAS_WIDTH")?.unwrap_or(defaults.canvas_width),
            canvas_height: env_u32("MASKSTUDIO_CANVAS_HEIGHT")?
                .unwrap_or(defaults.canvas_height),
            brush_size: env_u32("MASKSTUDIO_BRUSH_SIZE")?.unwrap_or(defaults.brush_size),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid GEMINI_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            bail!(
                "GEMINI_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        for (label, model) in [
            ("edit", &self.edit_model),
            ("image", &self.image_model),
            ("chat", &self.chat_model),
            ("fast", &self.fast_model),
        ] {
            if model.trim().is_empty() {
                bail!("The {label} model name must not be empty");
            }
        }

        if self.canvas_width == 0 || self.canvas_height == 0 {
            bail!(
                "Canvas bounds must be positive (got {}x{})",
                self.canvas_width,
                self.canvas_height
            );
        }

        if !(MIN_BRUSH_SIZE..=MAX_BRUSH_SIZE).contains(&self.brush_size) {
            bail!(
                "Brush size {} is outside {MIN_BRUSH_SIZE}..={MAX_BRUSH_SIZE}",
                self.brush_size
            );
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

fn env_u32(name: &str) -> Result<Option<u32>> {
    env_non_empty(name)
        .map(|raw| {
            raw.parse::<u32>()
                .with_context(|| format!("{name} must be a non-negative integer, got '{raw}'"))
        })
        .transpose()
}
