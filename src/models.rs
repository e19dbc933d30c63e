//! Core data models used throughout the pipeline.
//!
//! These types represent the search hits, scraped pages, retrieved corpus,
//! conversation turns, and tagged answers that flow from retrieval through
//! answer generation to the HTTP layer.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which search-engine mode a query is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Vertical {
    /// General web results.
    Web,
    /// News results, used for current-affairs queries.
    News,
}

impl std::fmt::Display for Vertical {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Web => f.write_str("web"),
            Self::News => f.write_str("news"),
        }
    }
}

/// A single search hit. Only drives fetch attempts; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub url: String,
    /// 1-based position in the engine's ranking.
    pub rank: u32,
}

/// Text scraped from one page.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapedDocument {
    pub source_url: String,
    pub text: String,
    /// `text` is longer than the sufficiency threshold.
    pub sufficient: bool,
    /// HTTP status of the response, if one was received.
    pub status: Option<u16>,
}

impl ScrapedDocument {
    /// A document standing in for a failed fetch: empty and insufficient.
    pub fn failed(source_url: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            source_url: source_url.into(),
            text: String::new(),
            sufficient: false,
            status,
        }
    }
}

/// The bounded text blob handed from retrieval to answering.
///
/// `NoContent` is a real value, not an absence: it renders as
/// [`RetrievedCorpus::NO_CONTENT`] and compares unequal to any scraped text,
/// including the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievedCorpus {
    Text(String),
    NoContent,
}

impl RetrievedCorpus {
    pub const NO_CONTENT: &'static str = "No content scraped from search results.";

    /// Build a corpus from already-assembled text, capped at `max_chars`.
    /// Empty text becomes [`RetrievedCorpus::NoContent`].
    pub fn from_text(text: &str, max_chars: usize) -> Self {
        if text.is_empty() {
            Self::NoContent
        } else {
            Self::Text(truncate_chars(text, max_chars).to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(t) => t,
            Self::NoContent => Self::NO_CONTENT,
        }
    }

    pub fn is_no_content(&self) -> bool {
        matches!(self, Self::NoContent)
    }

    /// Scraped text that is empty or whitespace. The sentinel is never blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(t) => t.trim().is_empty(),
            Self::NoContent => false,
        }
    }

    /// Length in characters of the scraped text (0 for `NoContent`).
    pub fn char_len(&self) -> usize {
        match self {
            Self::Text(t) => t.chars().count(),
            Self::NoContent => 0,
        }
    }
}

impl std::fmt::Display for RetrievedCorpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub input: String,
    pub output: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            at: Utc::now(),
        }
    }
}

/// Stable tag for an [`Answer`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Generated,
    Unclear,
    InsufficientContext,
    ConfigError,
    ModelFailure,
}

impl AnswerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Unclear => "unclear",
            Self::InsufficientContext => "insufficient_context",
            Self::ConfigError => "config_error",
            Self::ModelFailure => "model_failure",
        }
    }
}

/// Outcome of answering one query.
///
/// Callers branch on the variant, never on message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// A cleaned model completion.
    Generated(String),
    /// The model produced an empty or too-short completion; carries the fixed fallback.
    Unclear(String),
    /// Current-affairs query with no usable context; the model was not called.
    InsufficientContext(String),
    /// A required secret is missing.
    ConfigError(String),
    /// The model call failed after exhausting its retry budget.
    ModelFailure(String),
}

impl Answer {
    pub fn kind(&self) -> AnswerKind {
        match self {
            Self::Generated(_) => AnswerKind::Generated,
            Self::Unclear(_) => AnswerKind::Unclear,
            Self::InsufficientContext(_) => AnswerKind::InsufficientContext,
            Self::ConfigError(_) => AnswerKind::ConfigError,
            Self::ModelFailure(_) => AnswerKind::ModelFailure,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Generated(t)
            | Self::Unclear(t)
            | Self::InsufficientContext(t)
            | Self::ConfigError(t)
            | Self::ModelFailure(t) => t,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::ConfigError(_) | Self::ModelFailure(_))
    }
}

/// Prefix of `s` holding at most `max_chars` characters, cut on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
