use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lumen_contracts::config::Config;
use lumen_contracts::regions::{parse_detection_response, Detection};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing::info;

use crate::client::{truncate_text, BODY_EXCERPT_CHARS};
use crate::error::{EngineError, Result};
use crate::normalize::NormalizedImage;

/// Client for the vision-detection collaborator. Detection is advisory
/// tooling: transport failures are real errors, but a reply that fails to
/// parse degrades to zero detections.
pub struct VisionClient {
    http: HttpClient,
    api_base: String,
    api_key: String,
    model: String,
}

impl VisionClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .vision_api_key
            .clone()
            .ok_or(EngineError::MissingRequiredField("vision API key"))?;
        Ok(Self {
            http: HttpClient::new(),
            api_base: config.vision_api_base.clone(),
            api_key,
            model: config.vision_model.clone(),
        })
    }

    /// Sends the image inline with a natural-language instruction and
    /// parses the model's free-text reply into detections.
    pub fn detect(&self, image: &NormalizedImage, instruction: &str) -> Result<Vec<Detection>> {
        let endpoint = format!("{}/models/{}:generateContent", self.api_base, self.model);
        info!(model = %self.model, "requesting vision detections");
        let payload = json!({
            "contents": [{
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": "image/png",
                            "data": BASE64.encode(&image.bytes),
                        }
                    },
                    { "text": detection_instruction(instruction) },
                ]
            }]
        });

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .map_err(EngineError::Transport)?;
        let status = response.status();
        let body = response.text().map_err(EngineError::Transport)?;
        if !status.is_success() {
            return Err(EngineError::RemoteService {
                status: status.as_u16(),
                body_excerpt: truncate_text(&body, BODY_EXCERPT_CHARS),
            });
        }

        let reply: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) => return Ok(Vec::new()),
        };
        Ok(parse_detection_response(&collect_text_parts(&reply)))
    }
}

/// Wraps the user's instruction with the box protocol the translator
/// expects: `[yMin, xMin, yMax, xMax]` on a 1000-unit grid.
fn detection_instruction(instruction: &str) -> String {
    format!(
        "Detect the following in this image: {instruction}. Reply with a JSON array where \
         each entry has \"label\", \"box\" as [yMin, xMin, yMax, xMax] with coordinates \
         normalized to 0-1000, and an optional \"issue\" string. Reply with the JSON only."
    )
}

/// Concatenates every text part across candidates. Image parts and other
/// modalities are ignored.
fn collect_text_parts(reply: &Value) -> String {
    let mut out = String::new();
    let candidates = reply
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                out.push_str(text);
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::collect_text_parts;
    use lumen_contracts::regions::parse_detection_response;

    #[test]
    fn text_parts_are_collected_across_candidates() {
        let reply = json!({
            "candidates": [
                { "content": { "parts": [ { "text": "```json" }, { "text": "[{\"label\": \"hand\", \"box\": [0, 0, 100, 100]}]" } ] } },
                { "content": { "parts": [ { "text": "```" } ] } },
            ]
        });
        let text = collect_text_parts(&reply);
        let detections = parse_detection_response(&text);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "hand");
    }

    #[test]
    fn reply_without_candidates_degrades_to_zero_detections() {
        let reply = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(parse_detection_response(&collect_text_parts(&reply)).is_empty());
    }
}
