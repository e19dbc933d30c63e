//! Retrieval: search, fetch, fallback, and corpus assembly.
//!
//! # Pipeline
//!
//! 1. Classify the query; current-affairs queries get the recency hint
//!    appended and go to the news vertical.
//! 2. One search call for up to `max_pages` results.
//! 3. Fetch result pages in rank order, at most `concurrency` in flight.
//!    A page that fails with a retryable status (403/406/422 by default)
//!    is fetched once more with a fresh User-Agent.
//! 4. If the query is current affairs and the collected text is shorter
//!    than the fallback threshold, search the encyclopedia site and fetch
//!    its top result.
//! 5. Join sufficient page texts with single spaces and cap the result at
//!    `corpus_max_chars` characters.
//!
//! Per-URL failures and search failures are logged and skipped. Only a
//! missing search API key aborts retrieval.

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::classify::{classify, Classification};
use crate::config::{Config, RetrievalConfig};
use crate::error::{PipelineError, Result};
use crate::fetch::Fetcher;
use crate::models::{RetrievedCorpus, ScrapedDocument, SearchResult, Vertical};
use crate::search::{SearchProvider, SearchRequest, SerpApiSearch};

/// Everything one retrieval run did, for reporting and tests.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub query: String,
    /// Query text actually sent to the search engine.
    pub search_query: String,
    pub classification: Classification,
    pub vertical: Vertical,
    /// Final document for every fetched URL, in rank order, fallback last.
    pub documents: Vec<ScrapedDocument>,
    /// Set when the encyclopedia fallback search ran.
    pub fallback_query: Option<String>,
    pub corpus: RetrievedCorpus,
}

impl Retrieval {
    pub fn used_fallback(&self) -> bool {
        self.fallback_query.is_some()
    }

    pub fn sufficient_documents(&self) -> impl Iterator<Item = &ScrapedDocument> {
        self.documents.iter().filter(|d| d.sufficient)
    }
}

pub struct Retriever {
    search: Arc<dyn SearchProvider>,
    fetcher: Fetcher,
    settings: RetrievalConfig,
}

impl Retriever {
    pub fn new(search: Arc<dyn SearchProvider>, fetcher: Fetcher, settings: RetrievalConfig) -> Self {
        Self {
            search,
            fetcher,
            settings,
        }
    }

    /// Build the production retriever (SerpAPI search + HTTP fetcher).
    pub fn from_config(config: &Config) -> Result<Self> {
        let search = SerpApiSearch::new(&config.search)?;
        let fetcher = Fetcher::new(&config.fetch)?;
        Ok(Self::new(
            Arc::new(search),
            fetcher,
            config.retrieval.clone(),
        ))
    }

    /// Retrieve the corpus for `query` using the configured page count.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievedCorpus> {
        Ok(self
            .retrieve_detailed(query, self.settings.max_pages)
            .await?
            .corpus)
    }

    /// Run the full retrieval pipeline and report what happened.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingSecret`] if the search provider has
    /// no API key. All other failures are absorbed.
    pub async fn retrieve_detailed(&self, query: &str, max_pages: usize) -> Result<Retrieval> {
        let max_pages = max_pages.max(1);
        let classification = classify(query);
        let vertical = classification.vertical();
        let search_query = refine_query(query, classification, &self.settings.recency_hint);

        tracing::info!(
            current_affairs = classification.is_current_affairs,
            %vertical,
            max_pages,
            "retrieving"
        );
        tracing::debug!(%search_query, "search query");

        let results = self
            .run_search(SearchRequest {
                query: search_query.clone(),
                vertical,
                num: max_pages,
            })
            .await?;
        tracing::debug!(count = results.len(), "search returned results");

        let mut documents = self.fetch_all(&results, max_pages).await;

        let mut fallback = None;
        if classification.is_current_affairs {
            let collected = joined_len(&documents);
            if collected < self.settings.fallback_threshold_chars {
                let fq = fallback_query(
                    query,
                    &self.settings.fallback_site,
                    &self.settings.fallback_year_hint,
                );
                tracing::info!(
                    collected,
                    threshold = self.settings.fallback_threshold_chars,
                    site = %self.settings.fallback_site,
                    "insufficient content, running encyclopedia fallback"
                );
                documents.extend(self.fetch_fallback(&fq).await?);
                fallback = Some(fq);
            }
        }

        let texts: Vec<&str> = documents
            .iter()
            .filter(|d| d.sufficient)
            .map(|d| d.text.as_str())
            .collect();
        let corpus = assemble_corpus(&texts, self.settings.corpus_max_chars);
        tracing::info!(
            documents = texts.len(),
            chars = corpus.char_len(),
            "retrieval complete"
        );

        Ok(Retrieval {
            query: query.to_string(),
            search_query,
            classification,
            vertical,
            documents,
            fallback_query: fallback,
            corpus,
        })
    }

    /// Search, propagating a missing secret and absorbing everything else.
    async fn run_search(&self, request: SearchRequest) -> Result<Vec<SearchResult>> {
        match self.search.search(&request).await {
            Ok(results) => Ok(results),
            Err(e @ PipelineError::MissingSecret { .. }) => Err(e),
            Err(e) => {
                tracing::warn!(provider = self.search.name(), error = %e, "search failed, continuing with no results");
                Ok(Vec::new())
            }
        }
    }

    /// Fetch the top `max_pages` results with bounded concurrency,
    /// returning documents in rank order.
    async fn fetch_all(&self, results: &[SearchResult], max_pages: usize) -> Vec<ScrapedDocument> {
        let urls: Vec<String> = results.iter().take(max_pages).map(|r| r.url.clone()).collect();
        stream::iter(urls)
            .map(|url| async move { self.fetch_with_retry(&url).await })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await
    }

    /// One fetch, plus exactly one retry on a retryable status.
    async fn fetch_with_retry(&self, url: &str) -> ScrapedDocument {
        let doc = self.fetcher.fetch(url).await;
        if !self.fetcher.is_retryable(&doc) {
            return doc;
        }

        tracing::warn!(%url, status = ?doc.status, "blocked, retrying with a different User-Agent");
        let retry = self.fetcher.fetch(url).await;
        if retry.status.is_some_and(|s| (200..300).contains(&s)) {
            tracing::debug!(%url, "retry succeeded");
        } else {
            tracing::warn!(%url, status = ?retry.status, "retry failed, skipping");
        }
        retry
    }

    async fn fetch_fallback(&self, fallback_query: &str) -> Result<Vec<ScrapedDocument>> {
        let results = self
            .run_search(SearchRequest {
                query: fallback_query.to_string(),
                vertical: Vertical::Web,
                num: self.settings.fallback_results.max(1),
            })
            .await?;

        let mut documents = Vec::new();
        for result in results.iter().take(self.settings.fallback_results.max(1)) {
            tracing::info!(url = %result.url, "fetching fallback page");
            documents.push(self.fetcher.fetch(&result.url).await);
        }
        Ok(documents)
    }
}

/// Search text for `query`: recency hint appended for current affairs.
pub fn refine_query(query: &str, classification: Classification, recency_hint: &str) -> String {
    if classification.is_current_affairs && !recency_hint.is_empty() {
        format!("{} {}", query, recency_hint)
    } else {
        query.to_string()
    }
}

/// Site-restricted fallback query; attack/terror queries also get the year hint.
pub fn fallback_query(query: &str, site: &str, year_hint: &str) -> String {
    let lowered = query.to_lowercase();
    if (lowered.contains("attack") || lowered.contains("terror")) && !year_hint.is_empty() {
        format!("{} site:{} {}", query, site, year_hint)
    } else {
        format!("{} site:{}", query, site)
    }
}

/// Join texts with single spaces and cap at `max_chars` characters.
pub fn assemble_corpus<S: AsRef<str>>(texts: &[S], max_chars: usize) -> RetrievedCorpus {
    let joined = texts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ");
    RetrievedCorpus::from_text(&joined, max_chars)
}

/// Character length of the sufficient texts joined with single spaces.
fn joined_len(documents: &[ScrapedDocument]) -> usize {
    let mut total = 0;
    let mut count = 0usize;
    for doc in documents.iter().filter(|d| d.sufficient) {
        total += doc.text.chars().count();
        count += 1;
    }
    total + count.saturating_sub(1)
}
