use crate::api::logging::emit_request_failure;
use crate::api::ApiClient;
use crate::canvas::{
    BrushSetting, CanvasError, ContainerBounds, ImageReference, MaskCanvasController, SurfaceSize,
};
use crate::config::Config;
use crate::types::{decode_data_url, GenerationSettings};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

pub const MASKED_EDIT_PREFIX: &str =
    "Focus on the highlighted areas and follow this instruction: ";
pub const FAST_REQUEST_FAILED: &str = "Fast request failed.";

/// Instruction sent alongside the highlighted image.
pub fn masked_edit_instruction(prompt: &str) -> String {
    format!("{MASKED_EDIT_PREFIX}{}", prompt.trim())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// PNG data URL of the edited image.
    Edited(String),
    /// The model answered without an image part.
    NoImageReturned,
    /// No image is loaded or the prompt is blank; nothing was sent.
    NotReady,
}

/// One editing workspace: the uploaded image, its mask canvas, the edit
/// prompt and the last result.
pub struct EditorSession {
    client: Arc<ApiClient>,
    canvas: MaskCanvasController,
    brush: BrushSetting,
    image: Option<ImageReference>,
    prompt: String,
    edited_image: Option<String>,
    loading: bool,
}

impl EditorSession {
    pub fn new(client: Arc<ApiClient>, config: &Config) -> Self {
        let brush = BrushSetting::new(config.brush_size);
        Self {
            client,
            canvas: MaskCanvasController::new(ContainerBounds::from_config(config), brush.clone()),
            brush,
            image: None,
            prompt: String::new(),
            edited_image: None,
            loading: false,
        }
    }

    /// Replaces the current image. A previous edit result is discarded only
    /// once the new image has decoded.
    pub async fn upload(&mut self, image: ImageReference) -> Result<SurfaceSize, CanvasError> {
        let size = self.canvas.load_image(&image).await?;
        self.image = Some(image);
        self.edited_image = None;
        Ok(size)
    }

    pub fn canvas(&self) -> &MaskCanvasController {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut MaskCanvasController {
        &mut self.canvas
    }

    pub fn brush(&self) -> &BrushSetting {
        &self.brush
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn image(&self) -> Option<&ImageReference> {
        self.image.as_ref()
    }

    pub fn edited_image(&self) -> Option<&str> {
        self.edited_image.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn can_apply_edit(&self) -> bool {
        self.image.is_some() && !self.prompt.trim().is_empty() && !self.loading
    }

    /// Sends the highlighted surface and the prefixed prompt to the edit
    /// model. A returned image becomes the session's edit result; an empty
    /// reply leaves the previous result in place.
    pub async fn apply_edit(&mut self) -> Result<EditOutcome> {
        if !self.can_apply_edit() {
            return Ok(EditOutcome::NotReady);
        }
        let Some(surface) = self.canvas.export_png_data_url()? else {
            return Ok(EditOutcome::NotReady);
        };
        let instruction = masked_edit_instruction(&self.prompt);

        self.loading = true;
        let result = self.client.edit_image(&surface, &instruction).await;
        self.loading = false;

        match result {
            Ok(Some(edited)) => {
                self.edited_image = Some(edited.clone());
                Ok(EditOutcome::Edited(edited))
            }
            Ok(None) => Ok(EditOutcome::NoImageReturned),
            Err(error) => {
                emit_request_failure("image_edit", &error);
                Err(error.context("failed to edit image"))
            }
        }
    }

    /// Writes the last edit result to `path` as PNG bytes.
    pub async fn save_edited(&self, path: impl AsRef<Path>) -> Result<bool> {
        match &self.edited_image {
            Some(data_url) => {
                write_data_url(data_url, path.as_ref()).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Text-to-image generation. A blank prompt sends nothing.
pub async fn generate_image(
    client: &ApiClient,
    prompt: &str,
    settings: GenerationSettings,
) -> Result<Option<String>> {
    if prompt.trim().is_empty() {
        return Ok(None);
    }
    client
        .generate_image(prompt, settings)
        .await
        .inspect_err(|error| emit_request_failure("image_generation", error))
}

/// Low-latency one-shot answer. Failures collapse to a fixed message.
pub async fn fast_assist(client: &ApiClient, prompt: &str) -> Option<String> {
    if prompt.trim().is_empty() {
        return None;
    }
    match client.fast_complete(prompt).await {
        Ok(text) => Some(text),
        Err(error) => {
            emit_request_failure("fast_assist", &error);
            Some(FAST_REQUEST_FAILED.to_string())
        }
    }
}

pub async fn write_data_url(data_url: &str, path: &Path) -> Result<()> {
    let bytes = decode_data_url(data_url).context("image data URL is not valid base64")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::{MockApiClient, MockReply};
    use crate::api::NO_FAST_RESPONSE;
    use crate::canvas::SurfacePoint;
    use crate::test_support::solid_png;
    use crate::types::data_url_payload;

    fn mock_client(replies: Vec<MockReply>) -> (ApiClient, MockApiClient) {
        let mock = MockApiClient::with_replies(replies);
        let client =
            ApiClient::new_mock(Arc::new(mock.clone())).with_mock_content(Arc::new(mock.clone()));
        (client, mock)
    }

    fn session() -> EditorSession {
        session_with(Vec::new()).0
    }

    fn session_with(replies: Vec<MockReply>) -> (EditorSession, MockApiClient) {
        let (client, mock) = mock_client(replies);
        let config = Config {
            canvas_width: 400,
            canvas_height: 600,
            brush_size: 20,
            ..Config::default()
        };
        (EditorSession::new(Arc::new(client), &config), mock)
    }

    async fn painted_session(replies: Vec<MockReply>) -> (EditorSession, MockApiClient) {
        let (mut editor, mock) = session_with(replies);
        editor
            .upload(ImageReference::from_bytes(solid_png(40, 30, [0, 0, 255, 255])))
            .await
            .unwrap();
        let canvas = editor.canvas_mut();
        canvas.begin_stroke(SurfacePoint::new(5.0, 5.0));
        canvas.extend_stroke(SurfacePoint::new(30.0, 5.0));
        canvas.end_stroke();
        editor.set_prompt("add a hat");
        (editor, mock)
    }

    #[test]
    fn test_instruction_carries_the_highlight_prefix() {
        assert_eq!(
            masked_edit_instruction("  add a hat "),
            "Focus on the highlighted areas and follow this instruction: add a hat"
        );
    }

    #[tokio::test]
    async fn test_edit_without_image_or_prompt_is_not_sent() {
        let mut editor = session();
        editor.set_prompt("add a hat");
        assert_eq!(editor.apply_edit().await.unwrap(), EditOutcome::NotReady);

        editor
            .upload(ImageReference::from_bytes(solid_png(8, 8, [1, 1, 1, 255])))
            .await
            .unwrap();
        editor.set_prompt("   ");
        assert!(!editor.can_apply_edit());
        assert_eq!(editor.apply_edit().await.unwrap(), EditOutcome::NotReady);
        assert!(!editor.is_loading());
    }

    #[tokio::test]
    async fn test_upload_fits_canvas_and_shares_brush() {
        let mut editor = session();
        let size = editor
            .upload(ImageReference::from_bytes(solid_png(800, 600, [0, 0, 255, 255])))
            .await
            .unwrap();
        assert_eq!(size, SurfaceSize { width: 400, height: 300 });
        assert_eq!(editor.canvas().brush().width(), 20);

        editor.brush().set_width(6);
        assert_eq!(editor.canvas().brush().width(), 6);

        editor.canvas_mut().begin_stroke(SurfacePoint::new(10.0, 10.0));
        editor.canvas_mut().extend_stroke(SurfacePoint::new(20.0, 10.0));
        editor.canvas_mut().end_stroke();
        let mask = editor.canvas().painted_mask().unwrap();
        assert_eq!(mask.get_pixel(15, 13).0, [255]);
        assert_eq!(mask.get_pixel(15, 14).0, [0]);
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_current_image() {
        let mut editor = session();
        let first = ImageReference::from_bytes(solid_png(4, 4, [1, 1, 1, 255]));
        editor.upload(first.clone()).await.unwrap();

        let err = editor
            .upload(ImageReference::from_bytes(&b"garbage"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, CanvasError::Decode { .. }));
        assert_eq!(editor.image(), Some(&first));
    }

    #[tokio::test]
    async fn test_save_edited_writes_png_bytes() {
        let mut editor = session();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edit.png");
        assert!(!editor.save_edited(&path).await.unwrap());

        let png = solid_png(2, 2, [5, 6, 7, 255]);
        editor.edited_image = Some(crate::types::png_bytes_to_data_url(&png));
        assert!(editor.save_edited(&path).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), png);
    }

    #[tokio::test]
    async fn test_blank_prompts_skip_the_network() {
        let client = ApiClient::new_mock(Arc::new(MockApiClient::new(Vec::new())));
        assert!(generate_image(&client, " ", GenerationSettings::default())
            .await
            .unwrap()
            .is_none());
        assert!(fast_assist(&client, "").await.is_none());
    }

    #[tokio::test]
    async fn test_edit_sends_highlighted_surface_with_prefixed_prompt() {
        let (mut editor, mock) = painted_session(vec![MockReply::image("RURJVA==")]).await;
        let surface = editor.canvas().export_png_data_url().unwrap().unwrap();

        let outcome = editor.apply_edit().await.unwrap();
        assert_eq!(
            outcome,
            EditOutcome::Edited("data:image/png;base64,RURJVA==".to_string())
        );
        assert_eq!(editor.edited_image(), Some("data:image/png;base64,RURJVA=="));
        assert!(!editor.is_loading());

        let requests = mock.content_requests();
        assert_eq!(requests.len(), 1);
        let parts = &requests[0].payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["data"], data_url_payload(&surface));
        assert_eq!(
            parts[1]["text"],
            "Focus on the highlighted areas and follow this instruction: add a hat"
        );
    }

    #[tokio::test]
    async fn test_reply_without_image_keeps_previous_result() {
        let (mut editor, _mock) = painted_session(vec![
            MockReply::image("Rmlyc3Q="),
            MockReply::text("I cannot do that"),
        ])
        .await;

        editor.apply_edit().await.unwrap();
        let outcome = editor.apply_edit().await.unwrap();

        assert_eq!(outcome, EditOutcome::NoImageReturned);
        assert_eq!(editor.edited_image(), Some("data:image/png;base64,Rmlyc3Q="));
        assert!(!editor.is_loading());
    }

    #[tokio::test]
    async fn test_failed_edit_surfaces_error_and_clears_loading() {
        let (mut editor, mock) =
            painted_session(vec![MockReply::failing("connection refused")]).await;

        let err = editor.apply_edit().await.unwrap_err();
        assert!(format!("{err:#}").contains("connection refused"));
        assert!(!editor.is_loading());
        assert!(editor.edited_image().is_none());
        assert!(editor.can_apply_edit());
        assert_eq!(mock.content_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_fast_assist_falls_back_on_empty_reply_and_failure() {
        let (client, _mock) = mock_client(vec![
            MockReply::text(""),
            MockReply::failing("timed out"),
        ]);
        assert_eq!(
            fast_assist(&client, "caption this").await.as_deref(),
            Some(NO_FAST_RESPONSE)
        );
        assert_eq!(
            fast_assist(&client, "caption this").await.as_deref(),
            Some(FAST_REQUEST_FAILED)
        );
    }

    #[tokio::test]
    async fn test_generate_returns_image_data_url() {
        let (client, mock) = mock_client(vec![MockReply::image("R0VO")]);
        let image = generate_image(&client, "a fox", GenerationSettings::default())
            .await
            .unwrap();
        assert_eq!(image.as_deref(), Some("data:image/png;base64,R0VO"));
        assert_eq!(
            mock.content_requests()[0].payload["generationConfig"]["imageConfig"],
            serde_json::json!({"aspectRatio": "1:1", "imageSize": "1K"})
        );
    }
}
