use std::io::{Cursor, Read};

use lumen_contracts::config::Config;
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::{EngineError, Result};

pub(crate) const BODY_EXCERPT_CHARS: usize = 500;
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Blocking client for the two remote endpoints. One POST per invocation,
/// no retries: a non-success status surfaces as `RemoteService` with the
/// original status code and a short body excerpt.
pub struct TransportClient {
    http: HttpClient,
    api_base: String,
    token: String,
}

impl TransportClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: HttpClient::new(),
            api_base: config.api_base.clone(),
            token: config.api_key.clone(),
        }
    }

    /// Image-generation endpoint. The response body is an archive holding
    /// exactly one image entry, which is extracted here.
    pub fn generate_image(&self, payload: &Value) -> Result<Vec<u8>> {
        let body = self.post("/ai/generate-image", payload)?;
        unwrap_image_bytes(body, false)
    }

    /// Post-processing endpoint. Responses are endpoint-dependent: archive
    /// bodies are unwrapped, anything else is treated as the raw image.
    pub fn augment_image(&self, payload: &Value) -> Result<Vec<u8>> {
        let body = self.post("/ai/augment-image", payload)?;
        unwrap_image_bytes(body, true)
    }

    fn post(&self, path: &str, payload: &Value) -> Result<Vec<u8>> {
        let endpoint = format!("{}{}", self.api_base, path);
        info!(%endpoint, "sending request");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .map_err(EngineError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EngineError::RemoteService {
                status: status.as_u16(),
                body_excerpt: truncate_text(&body, BODY_EXCERPT_CHARS),
            });
        }
        let bytes = response.bytes().map_err(EngineError::Transport)?.to_vec();
        debug!(len = bytes.len(), "response body received");
        Ok(bytes)
    }
}

/// Second unwrap stage: extract the single image entry from an archive
/// body. `allow_raw` lets non-archive bodies pass through untouched.
fn unwrap_image_bytes(body: Vec<u8>, allow_raw: bool) -> Result<Vec<u8>> {
    if !body.starts_with(ZIP_MAGIC) {
        if allow_raw {
            return Ok(body);
        }
        return Err(EngineError::MissingImage);
    }
    let mut archive = ZipArchive::new(Cursor::new(&body))?;
    let image_name = (0..archive.len())
        .filter_map(|index| archive.by_index(index).ok().map(|entry| entry.name().to_string()))
        .find(|name| {
            let lowered = name.to_ascii_lowercase();
            IMAGE_EXTENSIONS
                .iter()
                .any(|ext| lowered.ends_with(&format!(".{ext}")))
        })
        .ok_or(EngineError::MissingImage)?;
    let mut entry = archive.by_name(&image_name)?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::{truncate_text, unwrap_image_bytes};
    use crate::EngineError;

    fn archive_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(&mut cursor);
        for (name, bytes) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start entry");
            writer.write_all(bytes).expect("write entry");
        }
        writer.finish().expect("finish archive");
        drop(writer);
        cursor.into_inner()
    }

    #[test]
    fn archive_with_one_image_entry_unwraps_to_its_bytes() {
        let body = archive_with(&[("image_0.png", b"png-bytes")]);
        let bytes = unwrap_image_bytes(body, false).expect("unwrap");
        assert_eq!(bytes, b"png-bytes");
    }

    #[test]
    fn archive_without_an_image_entry_is_missing_image() {
        let body = archive_with(&[("manifest.json", b"{}")]);
        let err = unwrap_image_bytes(body, false).unwrap_err();
        assert!(matches!(err, EngineError::MissingImage));
    }

    #[test]
    fn raw_body_passes_through_when_allowed() {
        let err = unwrap_image_bytes(b"raw image bytes".to_vec(), false).unwrap_err();
        assert!(matches!(err, EngineError::MissingImage));
        let bytes = unwrap_image_bytes(b"raw image bytes".to_vec(), true).expect("raw fallback");
        assert_eq!(bytes, b"raw image bytes");
    }

    #[test]
    fn non_success_status_surfaces_remote_service_error() {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 8192];
            let _ = stream.read(&mut buf);
            let body = "quota exhausted";
            let response = format!(
                "HTTP/1.1 402 Payment Required\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).expect("respond");
        });

        let config = lumen_contracts::config::Config {
            api_key: "key".to_string(),
            api_base: format!("http://{addr}"),
            vision_api_key: None,
            vision_api_base: String::new(),
            vision_model: String::new(),
        };
        let client = super::TransportClient::new(&config);
        let err = client
            .generate_image(&serde_json::json!({"input": "x"}))
            .unwrap_err();
        match err {
            EngineError::RemoteService {
                status,
                body_excerpt,
            } => {
                assert_eq!(status, 402);
                assert!(body_excerpt.contains("quota exhausted"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.join().expect("server thread");
    }

    #[test]
    fn excerpt_is_capped_at_five_hundred_chars() {
        let long = "x".repeat(2000);
        let excerpt = truncate_text(&long, 500);
        assert_eq!(excerpt.chars().count(), 501);
        assert!(excerpt.ends_with('…'));
        assert_eq!(truncate_text("short", 500), "short");
    }
}
