//! Answer generation from retrieved context.
//!
//! [`Answerer::answer`] builds one bounded prompt from the question, the
//! truncated corpus, and the conversation so far; calls the model through a
//! [`RetryPolicy`]; strips any echoed prompt; and replaces degenerate
//! completions with a fixed fallback. Every variant of [`Answer`] except
//! `ConfigError` and `ModelFailure` records a turn (insufficient-context
//! replies only when `answer.record_insufficient_turns` is set).

use std::sync::Arc;
use std::time::Duration;

use crate::classify::classify;
use crate::config::{AnswerConfig, Config};
use crate::error::{PipelineError, Result};
use crate::generate::{HuggingFaceGenerator, SamplingParams, TextGenerator};
use crate::memory::ConversationMemory;
use crate::models::{truncate_chars, Answer, RetrievedCorpus};
use crate::retry::{Backoff, RetryOutcome, RetryPolicy};

pub const INSUFFICIENT_CONTEXT_MESSAGE: &str = "No recent information found for the query. Please try a more specific query or check reliable news sources.";

pub const UNCLEAR_ANSWER_MESSAGE: &str = "Sorry, I couldn't generate a clear answer based on the provided context. Please try rephrasing the query.";

/// Closing instruction of every prompt; completions are cut after it.
pub const ANSWER_INSTRUCTION: &str =
    "Answer in 1-2 sentences, using only the context and history for current affairs:";

const INSTRUCTION_BLOCK: &str = "You are an assistant with access to recent web-scraped information. \
For queries about current affairs or events after October 2021, rely EXCLUSIVELY on the provided context and conversation history, \
ignoring any internal knowledge. Summarize key details (e.g., dates, events, outcomes) from the context. \
If the context is insufficient, state so clearly.";

pub struct Answerer {
    generator: Arc<dyn TextGenerator>,
    params: SamplingParams,
    retry: RetryPolicy,
    settings: AnswerConfig,
}

impl Answerer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        params: SamplingParams,
        retry: RetryPolicy,
        settings: AnswerConfig,
    ) -> Self {
        Self {
            generator,
            params,
            retry,
            settings,
        }
    }

    /// Build the production answerer (Hugging Face generator).
    pub fn from_config(config: &Config) -> Result<Self> {
        let generator = HuggingFaceGenerator::new(&config.model)?;
        let backoff = Backoff::parse(&config.model.backoff).ok_or_else(|| {
            PipelineError::Config(format!("unknown backoff policy: {}", config.model.backoff))
        })?;
        let retry = RetryPolicy {
            attempts: config.model.retries,
            delay: Duration::from_secs_f64(config.model.retry_delay_secs),
            backoff,
        };
        Ok(Self::new(
            Arc::new(generator),
            SamplingParams::from(&config.model),
            retry,
            config.answer.clone(),
        ))
    }

    /// Answer `query` from `corpus`, appending the turn to `memory`.
    pub async fn answer(
        &self,
        query: &str,
        corpus: &RetrievedCorpus,
        memory: &mut ConversationMemory,
    ) -> Answer {
        if let Err(e) = self.generator.ensure_ready() {
            tracing::error!(error = %e, "model not configured");
            return Answer::ConfigError(e.to_string());
        }

        if classify(query).is_current_affairs && corpus.is_blank() {
            tracing::info!("current-affairs query with no context, skipping model call");
            if self.settings.record_insufficient_turns {
                memory.record(query, INSUFFICIENT_CONTEXT_MESSAGE);
            }
            return Answer::InsufficientContext(INSUFFICIENT_CONTEXT_MESSAGE.to_string());
        }

        let context = truncate_chars(corpus.as_str(), self.settings.context_max_chars);
        let prompt = build_prompt(query, context, &memory.render_history());

        let generator = &self.generator;
        let params = &self.params;
        let prompt = prompt.as_str();
        let outcome = self
            .retry
            .run(
                move |attempt| {
                    tracing::info!(attempt, model = generator.model_name(), "generating response");
                    generator.generate(prompt, params)
                },
                PipelineError::is_transient,
            )
            .await;

        let raw = match outcome {
            RetryOutcome::Success { value, .. } => value,
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                tracing::error!(attempts, error = %last_error, "model call failed");
                return Answer::ModelFailure(format!(
                    "Error generating response after {} attempts: {}",
                    attempts, last_error
                ));
            }
            RetryOutcome::Aborted { error, .. } => {
                tracing::error!(error = %error, "model call aborted");
                return match error {
                    PipelineError::MissingSecret { .. } | PipelineError::Config(_) => {
                        Answer::ConfigError(error.to_string())
                    }
                    other => Answer::ModelFailure(format!("Error generating response: {}", other)),
                };
            }
        };

        let cleaned = clean_completion(&raw);
        let answer = if is_degenerate(&cleaned, self.settings.min_words) {
            tracing::debug!(words = cleaned.split_whitespace().count(), "degenerate completion, using fallback");
            Answer::Unclear(UNCLEAR_ANSWER_MESSAGE.to_string())
        } else {
            Answer::Generated(cleaned)
        };

        memory.record(query, answer.text());
        tracing::debug!(answer = %answer.text(), "generated response");
        answer
    }
}

/// Assemble the single prompt sent to the model.
pub fn build_prompt(query: &str, context: &str, history: &str) -> String {
    let context = if context.trim().is_empty() {
        "No context available."
    } else {
        context
    };
    format!(
        "{INSTRUCTION_BLOCK} Conversation History: {history}\nContext: {context}\nQuestion: {query}\n{ANSWER_INSTRUCTION} "
    )
}

/// Drop everything up to and including the answer instruction, then trim.
pub fn clean_completion(raw: &str) -> String {
    let markers = [ANSWER_INSTRUCTION, "Answer in 1-2 sentences:"];
    let tail = markers
        .iter()
        .find_map(|m| raw.rfind(m).map(|idx| &raw[idx + m.len()..]))
        .unwrap_or(raw);
    tail.trim().to_string()
}

/// Empty or fewer than `min_words` whitespace-separated words.
pub fn is_degenerate(text: &str, min_words: usize) -> bool {
    text.trim().is_empty() || text.split_whitespace().count() < min_words
}
