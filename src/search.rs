//! Search-engine dependency.
//!
//! [`SearchProvider`] is the seam the retriever calls; [`SerpApiSearch`] is
//! the production implementation against a SerpAPI-compatible endpoint.
//!
//! # Request shape
//!
//! `GET {base_url}/search.json?engine=google&q=<query>&num=<n>&api_key=<key>`
//! with `tbm=nws` added for the news vertical. Web hits are read from
//! `organic_results[]`, news hits from `news_results[]`.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{secret_from_env, SearchConfig};
use crate::error::{PipelineError, Result};
use crate::models::{SearchResult, Vertical};

/// One search-engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub vertical: Vertical,
    pub num: usize,
}

/// A search backend that returns ranked result URLs.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Run one search and return hits in rank order.
    ///
    /// A missing API key must surface as [`PipelineError::MissingSecret`]
    /// so the retriever can short-circuit instead of treating it as a
    /// transient miss.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>>;
}

/// SerpAPI-compatible search provider.
pub struct SerpApiSearch {
    client: reqwest::Client,
    base_url: String,
    engine: String,
    api_key_env: String,
    api_key: Option<String>,
}

impl SerpApiSearch {
    /// Create a provider, reading the API key from the configured
    /// environment variable. A missing key is not an error here; it is
    /// reported on the first [`search`](SearchProvider::search) call.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let api_key = secret_from_env(&config.api_key_env);
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &SearchConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            engine: config.engine.clone(),
            api_key_env: config.api_key_env.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    fn name(&self) -> &str {
        "serpapi"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::missing_secret(&self.api_key_env))?;

        let num = request.num.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("engine", self.engine.as_str()),
            ("q", request.query.as_str()),
            ("num", num.as_str()),
            ("api_key", api_key),
        ];
        if request.vertical == Vertical::News {
            params.push(("tbm", "nws"));
        }

        tracing::debug!(query = %request.query, vertical = %request.vertical, num = request.num, "searching");

        let response = self
            .client
            .get(format!("{}/search.json", self.base_url))
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Search(format!(
                "search API returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let json: serde_json::Value = response.json().await?;
        parse_serpapi_response(&json, request.vertical)
    }
}

/// Extract ranked URLs from a SerpAPI JSON body.
pub fn parse_serpapi_response(json: &serde_json::Value, vertical: Vertical) -> Result<Vec<SearchResult>> {
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        // SerpAPI reports an empty result set as an error string.
        if err.contains("hasn't returned any results") {
            return Ok(Vec::new());
        }
        return Err(PipelineError::Search(err.to_string()));
    }

    let key = match vertical {
        Vertical::Web => "organic_results",
        Vertical::News => "news_results",
    };

    let Some(entries) = json.get(key).and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };

    let results = entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let url = entry.get("link").and_then(|l| l.as_str())?;
            let rank = entry
                .get("position")
                .and_then(|p| p.as_u64())
                .map(|p| p as u32)
                .unwrap_or(i as u32 + 1);
            Some(SearchResult {
                url: url.to_string(),
                rank,
            })
        })
        .collect();

    Ok(results)
}
