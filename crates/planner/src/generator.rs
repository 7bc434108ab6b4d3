use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GenerativeConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GenerativeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Client for the `generateContent` endpoint of the generative-language API.
#[derive(Debug, Clone)]
pub struct GenerativeClient {
    http: Client,
    config: GenerativeConfig,
}

impl GenerativeClient {
    pub fn new(http: Client, config: GenerativeConfig) -> Self {
        Self { http, config }
    }

    pub fn model(&self) -> &str {
        self.config.model.as_str()
    }

    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let payload = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [ { "text": prompt } ]
                }
            ]
        });

        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", self.config.api_key.as_str())
            .json(&payload)
            .send()
            .await
            .context("generative API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "generative API non-success status {}: {}",
                status.as_u16(),
                body
            );
        }

        let body: Value = response
            .json()
            .await
            .context("generative API response parse failed")?;

        if let Some(reason) = body
            .pointer("/promptFeedback/blockReason")
            .and_then(|value| value.as_str())
        {
            anyhow::bail!("prompt blocked by generative API: {reason}");
        }

        extract_candidate_text(&body)
            .filter(|value| !value.trim().is_empty())
            .context("generative API output text missing")
    }
}

/// Concatenates the text parts of the first candidate.
pub fn extract_candidate_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .as_array()?
        .first()?
        .pointer("/content/parts")?
        .as_array()?;

    let chunks = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|value| value.as_str()))
        .collect::<Vec<_>>();

    if chunks.is_empty() {
        None
    } else {
        Some(chunks.concat())
    }
}
