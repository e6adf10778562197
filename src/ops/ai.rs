//! Remote generation services — grid rendering, camera captions, asset
//! analysis and prompt enhancement over the Gemini-style REST API.
//!
//! All calls are blocking and run on background job threads; the UI never
//! talks to this module directly on the paint path.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbaImage;
use serde_json::{Value, json};

use crate::ops::compositor;
use crate::settings::AppSettings;

/// Errors from the remote services. `Unauthorized` is the only class the
/// UI treats specially (it triggers the key-remediation message); the rest
/// are surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// Missing/rejected API key (401/403 or an "API key" complaint).
    Unauthorized,
    /// The service answered with an error payload.
    Service(String),
    /// The request never completed (DNS, connect, timeout...).
    Network(String),
    /// The service answered 200 but without a usable payload.
    EmptyResponse,
}

impl std::fmt::Display for AiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiError::Unauthorized => {
                write!(f, "A premium API key is required for this model")
            }
            AiError::Service(msg) => write!(f, "{}", msg),
            AiError::Network(msg) => write!(f, "Network failure: {}", msg),
            AiError::EmptyResponse => write!(f, "The service returned no content"),
        }
    }
}

impl AiError {
    /// Banner text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            AiError::Unauthorized => {
                "A premium API key is required. Set GEMINI_API_KEY or add a key in settings."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Map an HTTP error status to an error class. Body text mentioning the
/// API key is treated as an authorization problem regardless of status.
fn classify_status(code: u16, body: &str) -> AiError {
    if code == 401 || code == 403 || body.contains("API key") {
        AiError::Unauthorized
    } else {
        AiError::Service(format!("service error {}: {}", code, body.trim()))
    }
}

/// A reference image, already encoded for the wire.
#[derive(Clone)]
pub struct RefImage {
    pub mime: String,
    pub data: Vec<u8>,
}

/// Result of a grid generation: the master composite plus its panel tiles.
pub struct GeneratedGrid {
    pub full: RgbaImage,
    pub slices: Vec<RgbaImage>,
}

/// Snapshot of everything a background job needs to talk to the service.
/// Cheap to clone into the job closure.
#[derive(Clone)]
pub struct AiClient {
    api_base: String,
    api_key: String,
    image_model: String,
    text_model: String,
    vision_model: String,
    timeout: Duration,
}

impl AiClient {
    /// Build a client from the current settings. An empty configured key
    /// falls back to `GEMINI_API_KEY`.
    pub fn from_settings(settings: &AppSettings) -> Self {
        let api_key = if settings.api_key.trim().is_empty() {
            std::env::var("GEMINI_API_KEY").unwrap_or_default()
        } else {
            settings.api_key.clone()
        };
        Self {
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key,
            image_model: settings.image_model.clone(),
            text_model: settings.text_model.clone(),
            vision_model: settings.vision_model.clone(),
            timeout: Duration::from_secs(settings.request_timeout_secs.max(10)),
        }
    }

    pub fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    // ---- operations ---------------------------------------------------

    /// Generate a storyboard master (single frame or seamless grid) and
    /// slice it into panels. `rows * cols` must be 1, 4 or 9.
    pub fn generate_grid(
        &self,
        prompt: &str,
        rows: u32,
        cols: u32,
        aspect_ratio: &str,
        image_size: &str,
        refs: &[RefImage],
        context_image: Option<&[u8]>,
    ) -> Result<GeneratedGrid, AiError> {
        let text = build_grid_prompt(prompt, rows, cols, context_image.is_some(), !refs.is_empty());

        let mut parts = Vec::new();
        // Context first: the continuity instructions in the prompt refer to
        // "the first image provided".
        if let Some(png) = context_image {
            parts.push(inline_part("image/png", png));
        }
        for r in refs {
            parts.push(inline_part(&r.mime, &r.data));
        }
        parts.push(json!({ "text": text }));

        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "imageConfig": {
                    "aspectRatio": aspect_ratio,
                    "imageSize": image_size,
                }
            }
        });

        let response = self.post(&self.image_model, &body)?;
        let png = extract_inline_image(&response).ok_or(AiError::EmptyResponse)?;
        let full = image::load_from_memory(&png)
            .map_err(|e| AiError::Service(format!("undecodable image from service: {}", e)))?
            .into_rgba8();
        let slices = compositor::slice_grid(&full, rows, cols);
        Ok(GeneratedGrid { full, slices })
    }

    /// Short camera-movement caption for a scene. Best effort: any failure
    /// degrades to a fixed fallback, never an error — captions are a
    /// non-critical enrichment.
    pub fn camera_caption(&self, prompt: &str) -> String {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": CAMERA_SYSTEM_PROMPT }] },
            "contents": [{ "parts": [{ "text": format!("Scene: {}", prompt) }] }],
        });
        match self.post(&self.text_model, &body).map(|v| extract_text(&v)) {
            Ok(Some(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => "Static shot, slow zoom.".to_string(),
            Err(e) => {
                crate::log_warn!("camera caption failed, using fallback: {}", e);
                "Cinematic movement.".to_string()
            }
        }
    }

    /// Free-form analysis of an image with a user instruction.
    pub fn analyze(&self, image: &[u8], mime: &str, instruction: &str) -> Result<String, AiError> {
        let body = json!({
            "contents": [{ "parts": [
                inline_part(mime, image),
                { "text": instruction },
            ]}],
        });
        let response = self.post(&self.vision_model, &body)?;
        extract_text(&response).ok_or(AiError::EmptyResponse)
    }

    /// Rewrite a raw scene description into a detailed cinematic prompt.
    pub fn enhance_prompt(&self, raw: &str) -> Result<String, AiError> {
        let instruction = format!(
            "You are a film director's assistant. Rewrite the following scene \
             description into a detailed, cinematic image generation prompt. \
             Focus on lighting, camera angle, texture, and mood. Keep it under \
             100 words.\n\nInput: \"{}\"",
            raw
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": instruction }] }],
        });
        let response = self.post(&self.text_model, &body)?;
        match extract_text(&response) {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Ok(raw.to_string()),
        }
    }

    // ---- transport ----------------------------------------------------

    fn post(&self, model: &str, body: &Value) -> Result<Value, AiError> {
        if !self.has_key() {
            return Err(AiError::Unauthorized);
        }
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.api_base, model, self.api_key
        );
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(self.timeout)
            .timeout_write(Duration::from_secs(45))
            .build();
        let result = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string());
        match result {
            Ok(resp) => {
                let text = resp
                    .into_string()
                    .map_err(|e| AiError::Network(e.to_string()))?;
                let value: Value = serde_json::from_str(&text)
                    .map_err(|_| AiError::Service(format!("invalid JSON response: {}", text)))?;
                if let Some(err) = value.get("error") {
                    let msg = err
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown service error");
                    return Err(classify_status(200, msg));
                }
                Ok(value)
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(classify_status(code, &body))
            }
            Err(err) => Err(AiError::Network(err.to_string())),
        }
    }
}

fn inline_part(mime: &str, data: &[u8]) -> Value {
    json!({
        "inlineData": {
            "mimeType": mime,
            "data": BASE64.encode(data),
        }
    })
}

/// First text part of the first candidate, if any.
fn extract_text(response: &Value) -> Option<String> {
    response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(|t| t.as_str()))
        .map(|s| s.to_string())
}

/// First inline image of the first candidate, base64-decoded.
fn extract_inline_image(response: &Value) -> Option<Vec<u8>> {
    response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?
        .iter()
        .find_map(|part| {
            part.get("inlineData")
                .and_then(|d| d.get("data"))
                .and_then(|d| d.as_str())
        })
        .and_then(|data| BASE64.decode(data).ok())
}

const CAMERA_SYSTEM_PROMPT: &str = "You are a specialized AI video prompter assistant. \
Analyze the scene description and provide a technical camera movement prompt usable \
by video generation models. Output ONLY the camera movement description. Max 15 words. English.";

/// Assemble the generation instruction. Single frames get the cinematic
/// one-shot template; grids get the seamless-collage layout mandate. The
/// continuity block is appended when a context image rides along.
pub fn build_grid_prompt(
    prompt: &str,
    rows: u32,
    cols: u32,
    has_context: bool,
    has_refs: bool,
) -> String {
    let mut text = if rows == 1 && cols == 1 {
        format!(
            "Create a high-fidelity CINEMATIC SINGLE FRAME shot based on the following:\n\
             Subject Content: \"{}\"\n\n\
             Styling Instructions:\n\
             - Cinematic lighting, shallow depth of field, high dynamic range.\n\
             - Realistic textures, 8k resolution, photorealistic film look.\n\
             - NO TEXT, NO UI, NO WATERMARKS.",
            prompt
        )
    } else {
        let total = rows * cols;
        format!(
            "MANDATORY LAYOUT: Create a SEAMLESS {rows}x{cols} COLLAGE containing exactly {total} distinct panels.\n\
             - The output image MUST be a single image divided into a {rows} (rows) by {cols} (columns) matrix.\n\
             - Each panel shows the SAME subject/scene from a DIFFERENT angle or action moment.\n\
             - LAYOUT: ZERO PADDING. NO THICK BORDERS. NO FRAMES.\n\
             - The grid should be tight and seamless.\n\n\
             Subject Content: \"{prompt}\"\n\n\
             Styling Instructions:\n\
             - Cinematic lighting, high fidelity, 8k resolution, photorealistic.\n\
             - No text, no UI elements."
        )
    };

    if has_context {
        text.push_str(
            "\n\nCONTINUITY INSTRUCTION (Context Image Provided):\n\
             - The first image provided is the \"Context Reference\" (Previous Shot).\n\
             - Keep the same character design, clothing, lighting, and environment \
             style as the Context Reference.",
        );
        if has_refs {
            text.push_str(
                "\n- The other images are \"Action/Layout References\". Adopt their \
                 composition and character pose while maintaining the visual style \
                 of the Context Reference.",
            );
        }
    } else if has_refs {
        text.push_str(
            "\n\nREFERENCE INSTRUCTION:\n\
             - Use the provided images as visual references for style, composition, \
             and character design.",
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_classified_by_status_and_body() {
        assert_eq!(classify_status(403, "forbidden"), AiError::Unauthorized);
        assert_eq!(classify_status(401, ""), AiError::Unauthorized);
        assert_eq!(
            classify_status(400, "API key not valid"),
            AiError::Unauthorized
        );
        match classify_status(429, "rate limited") {
            AiError::Service(msg) => assert!(msg.contains("429")),
            other => panic!("expected Service error, got {:?}", other),
        }
    }

    #[test]
    fn single_frame_prompt_has_no_grid_mandate() {
        let text = build_grid_prompt("a rainy alley", 1, 1, false, false);
        assert!(text.contains("SINGLE FRAME"));
        assert!(!text.contains("COLLAGE"));
        assert!(text.contains("a rainy alley"));
    }

    #[test]
    fn grid_prompt_names_exact_panel_count() {
        let text = build_grid_prompt("chase scene", 3, 3, false, true);
        assert!(text.contains("SEAMLESS 3x3 COLLAGE"));
        assert!(text.contains("exactly 9 distinct panels"));
        assert!(text.contains("REFERENCE INSTRUCTION"));
        assert!(!text.contains("CONTINUITY"));
    }

    #[test]
    fn continuity_block_replaces_reference_block() {
        let text = build_grid_prompt("chase scene", 2, 2, true, true);
        assert!(text.contains("CONTINUITY INSTRUCTION"));
        assert!(text.contains("Action/Layout References"));
        assert!(!text.contains("REFERENCE INSTRUCTION"));
    }

    #[test]
    fn context_without_refs_omits_layout_reference_line() {
        let text = build_grid_prompt("night drive", 2, 2, true, false);
        assert!(text.contains("CONTINUITY INSTRUCTION"));
        assert!(!text.contains("Action/Layout References"));
    }

    #[test]
    fn response_text_extraction_skips_non_text_parts() {
        let v: Value = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[
                {"inlineData":{"mimeType":"image/png","data":"aGk="}},
                {"text":"dolly in, slow"}
            ]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(&v).as_deref(), Some("dolly in, slow"));
        assert_eq!(extract_inline_image(&v), Some(b"hi".to_vec()));
    }

    #[test]
    fn missing_key_is_unauthorized_before_any_request() {
        let mut settings = AppSettings::default();
        settings.api_key.clear();
        // Make sure the env fallback does not interfere with the assertion.
        unsafe { std::env::remove_var("GEMINI_API_KEY") };
        let client = AiClient::from_settings(&settings);
        if client.has_key() {
            return; // environment provided a key; nothing to assert
        }
        let err = client.enhance_prompt("x").unwrap_err();
        assert_eq!(err, AiError::Unauthorized);
    }
}
