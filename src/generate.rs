//! Hosted text-generation dependency.
//!
//! Defines the [`TextGenerator`] trait and [`HuggingFaceGenerator`], which
//! calls a Hugging Face Inference-compatible endpoint:
//!
//! ```text
//! POST {base_url}/models/{model}
//! Authorization: Bearer <key>
//! {"inputs": "...", "parameters": {"max_new_tokens": 200, "temperature": 0.7,
//!  "top_p": 0.9, "do_sample": true, "return_full_text": false}}
//! ```
//!
//! A single call is made per [`generate`](TextGenerator::generate);
//! retrying is the caller's job (see [`crate::retry`]).

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::{secret_from_env, ModelConfig};
use crate::error::{PipelineError, Result};

/// Fixed sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub do_sample: bool,
}

impl From<&ModelConfig> for SamplingParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            do_sample: config.do_sample,
        }
    }
}

/// A hosted model that turns a prompt into one completion.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the model identifier.
    fn model_name(&self) -> &str;

    /// Fail fast when the generator cannot possibly succeed (e.g. no key).
    fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    /// Generate one completion for `prompt`.
    async fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String>;
}

/// Text generation via the Hugging Face Inference API.
pub struct HuggingFaceGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key_env: String,
    api_key: Option<String>,
}

impl HuggingFaceGenerator {
    /// Create a generator, reading the API key from the configured
    /// environment variable. A missing key is reported on first use.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = secret_from_env(&config.api_key_env);
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ModelConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl TextGenerator for HuggingFaceGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(PipelineError::missing_secret(&self.api_key_env)),
        }
    }

    async fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::missing_secret(&self.api_key_env))?;

        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": params.max_new_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "do_sample": params.do_sample,
                "return_full_text": false,
            },
        });

        let response = self
            .client
            .post(format!("{}/models/{}", self.base_url, self.model))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response.json().await?;
            return parse_generation_response(&json);
        }

        let body_text = response.text().await.unwrap_or_default();
        // Bad credentials will not improve on retry.
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(PipelineError::Config(format!(
                "model API rejected credentials ({}): {}",
                status, body_text
            )));
        }
        Err(PipelineError::Model(format!(
            "model API error {}: {}",
            status, body_text
        )))
    }
}

/// Pull `generated_text` out of either the list or the object response shape.
fn parse_generation_response(json: &serde_json::Value) -> Result<String> {
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        return Err(PipelineError::Model(err.to_string()));
    }

    let item = match json.as_array() {
        Some(items) => items
            .first()
            .ok_or_else(|| PipelineError::Model("empty generation response".into()))?,
        None => json,
    };

    item.get("generated_text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| PipelineError::Parse("missing generated_text in model response".into()))
}
