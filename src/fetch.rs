//! Single-shot page fetcher with User-Agent rotation.
//!
//! [`Fetcher::fetch`] issues exactly one GET, extracts paragraph text, and
//! classifies the page as sufficient or not. It never retries and never
//! fails: transport errors and bad statuses come back as an empty,
//! insufficient [`ScrapedDocument`] carrying the status (if any) so the
//! caller can decide whether a retry with a fresh identity is worthwhile.

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use scraper::{Html, Selector};
use std::time::Duration;

use crate::config::FetchConfig;
use crate::error::{PipelineError, Result};
use crate::models::ScrapedDocument;
use rand::seq::SliceRandom;

/// Browser User-Agent strings, one picked at random per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Mobile/15E148 Safari/604.1",
];

const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.5";
const ACCEPT_VALUE: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Select a random User-Agent string from the rotation pool.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Fetches pages and scrapes their paragraph text.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    min_chars: usize,
    referer: String,
    retry_statuses: Vec<u16>,
}

impl Fetcher {
    /// Build a fetcher with the configured timeout and header template.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Http`] if the HTTP client cannot be constructed.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| PipelineError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            min_chars: config.min_chars,
            referer: config.referer.clone(),
            retry_statuses: config.retry_statuses.clone(),
        })
    }

    /// Fetch `url` once with a freshly chosen User-Agent.
    pub async fn fetch(&self, url: &str) -> ScrapedDocument {
        let ua = random_user_agent();
        tracing::debug!(%url, user_agent = ua, "fetching page");

        let response = match self
            .client
            .get(url)
            .header(USER_AGENT, ua)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .header(ACCEPT, ACCEPT_VALUE)
            .header(REFERER, &self.referer)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%url, error = %e, "fetch failed");
                return ScrapedDocument::failed(url, None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "fetch returned non-success status");
            return ScrapedDocument::failed(url, Some(status.as_u16()));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(%url, error = %e, "failed to read response body");
                return ScrapedDocument::failed(url, Some(status.as_u16()));
            }
        };

        let text = extract_paragraph_text(&body);
        let sufficient = is_sufficient(&text, self.min_chars);
        if sufficient {
            tracing::debug!(%url, chars = text.chars().count(), "scraped page");
        } else {
            tracing::debug!(%url, chars = text.chars().count(), "skipped page: insufficient content");
        }

        ScrapedDocument {
            source_url: url.to_string(),
            text,
            sufficient,
            status: Some(status.as_u16()),
        }
    }

    /// Whether `doc` failed with a status that deserves one more attempt.
    pub fn is_retryable(&self, doc: &ScrapedDocument) -> bool {
        doc.status
            .is_some_and(|s| self.retry_statuses.contains(&s))
    }
}

/// Strictly more than `min_chars` characters.
pub fn is_sufficient(text: &str, min_chars: usize) -> bool {
    text.chars().count() > min_chars
}

/// Text of every `<p>` element, whitespace-collapsed, empties dropped,
/// joined with single spaces.
pub fn extract_paragraph_text(html: &str) -> String {
    let Ok(selector) = Selector::parse("p") else {
        return String::new();
    };
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .map(|p| {
            p.text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
