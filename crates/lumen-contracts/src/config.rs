use std::env;

use thiserror::Error;

const DEFAULT_API_BASE: &str = "https://image.novelai.net";
const DEFAULT_VISION_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_VISION_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("NOVELAI_API_KEY is not set (export it or add it to .env)")]
    MissingApiKey,
}

/// Runtime configuration resolved once per invocation and passed by
/// reference into the clients; nothing reads the environment after this.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub vision_api_key: Option<String>,
    pub vision_api_base: String,
    pub vision_model: String,
}

impl Config {
    /// Loads `.env` if present, then resolves keys and base-URL overrides
    /// from the environment. Only the generation key is mandatory; the
    /// vision key is checked lazily by the detect action.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let api_key = non_empty_env("NOVELAI_API_KEY")
            .or_else(|| non_empty_env("NAI_API_KEY"))
            .ok_or(ConfigError::MissingApiKey)?;
        Ok(Self {
            api_key,
            api_base: base_url("NOVELAI_API_BASE", DEFAULT_API_BASE),
            vision_api_key: non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY")),
            vision_api_base: base_url("GEMINI_API_BASE", DEFAULT_VISION_API_BASE),
            vision_model: non_empty_env("LUMEN_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
        })
    }
}

fn base_url(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
