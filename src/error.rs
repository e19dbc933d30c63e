//! Error taxonomy for the retrieval and answering pipeline.
//!
//! Component-local failures (one URL timing out, one search call failing)
//! are logged and absorbed by the component that sees them. Only the
//! variants that abort a request reach the caller: a missing secret and an
//! exhausted model retry budget. [`crate::pipeline::Pipeline`] maps those
//! onto [`crate::models::Answer`] variants so the HTTP layer never has to
//! inspect message text.

/// Errors raised by pipeline components.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A required secret (API key) is absent from the environment.
    #[error("{name} not found in environment")]
    MissingSecret { name: String },

    /// The search API rejected the request or returned an unusable body.
    #[error("search error: {0}")]
    Search(String),

    /// Transport-level failure talking to an upstream service.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The hosted model returned an error or no completion.
    #[error("model error: {0}")]
    Model(String),

    /// A response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid runtime configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn missing_secret(name: impl Into<String>) -> Self {
        Self::MissingSecret { name: name.into() }
    }

    /// Whether retrying the same call could plausibly succeed.
    ///
    /// Secrets and configuration do not change between attempts.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::MissingSecret { .. } | Self::Config(_))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Http(format!("request timed out: {e}"))
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
