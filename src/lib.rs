//! # rag-answer
//!
//! Web-grounded question answering. A question is classified as current
//! affairs or general, sent to a search API, the result pages are scraped
//! for paragraph text, and a hosted language model writes a one-to-two
//! sentence answer from that text and the conversation so far.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ classify │──▶│  search  │──▶│  fetch   │──▶│ retrieve │
//! └──────────┘   │ (SerpAPI)│   │ (scrape) │   │ (corpus) │
//!                └──────────┘   └──────────┘   └────┬─────┘
//!                                                   ▼
//!                ┌──────────┐   ┌──────────┐   ┌──────────┐
//!                │  memory  │◀─▶│  answer  │──▶│ generate │
//!                └──────────┘   └──────────┘   │   (HF)   │
//!                                              └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export SERPAPI_KEY=...
//! export HUGGINGFACE_API_KEY=...
//! rag ask "Pahalgam attack"
//! rag chat
//! rag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`classify`] | Current-affairs query classifier |
//! | [`fetch`] | Page fetching and paragraph extraction |
//! | [`search`] | Search provider abstraction (SerpAPI) |
//! | [`retrieve`] | Search + fetch + fallback into one corpus |
//! | [`generate`] | Hosted text-generation abstraction |
//! | [`retry`] | Bounded retry policy |
//! | [`answer`] | Prompt assembly, model call, answer cleanup |
//! | [`memory`] | Conversation memory and sessions |
//! | [`pipeline`] | Retrieve-then-answer |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing setup |

pub mod answer;
pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod generate;
pub mod logging;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod retry;
pub mod search;
pub mod server;
