//! Retrieve-then-answer for one question.

use crate::answer::Answerer;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::memory::ConversationMemory;
use crate::models::{Answer, RetrievedCorpus};
use crate::retrieve::Retriever;

pub struct Pipeline {
    retriever: Retriever,
    answerer: Answerer,
}

impl Pipeline {
    pub fn new(retriever: Retriever, answerer: Answerer) -> Self {
        Self {
            retriever,
            answerer,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Retriever::from_config(config)?,
            Answerer::from_config(config)?,
        ))
    }

    /// Retrieve context for `query` and answer it against `memory`.
    ///
    /// Never fails: configuration problems surface as
    /// [`Answer::ConfigError`].
    pub async fn ask(&self, query: &str, memory: &mut ConversationMemory) -> Answer {
        let corpus = match self.retriever.retrieve(query).await {
            Ok(corpus) => corpus,
            Err(e @ PipelineError::MissingSecret { .. }) | Err(e @ PipelineError::Config(_)) => {
                tracing::error!(error = %e, "retrieval not configured");
                return Answer::ConfigError(e.to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, answering without context");
                RetrievedCorpus::NoContent
            }
        };
        self.answerer.answer(query, &corpus, memory).await
    }
}
