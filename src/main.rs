//! # rag CLI
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag classify "<query>"` | Print `current-affairs` or `general` |
//! | `rag retrieve "<query>"` | Show fetched pages and the assembled corpus |
//! | `rag ask "<query>"` | Answer one question |
//! | `rag chat` | Interactive conversation on stdin |
//! | `rag serve` | Start the HTTP API |
//!
//! The config file is optional; built-in defaults are used when it is
//! missing. API keys are always read from `SERPAPI_KEY` and
//! `HUGGINGFACE_API_KEY` (names configurable), which may also be set in a
//! `.env` file in the working directory.

use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use rag_answer::classify::classify;
use rag_answer::config::{self, Config};
use rag_answer::memory::ConversationMemory;
use rag_answer::pipeline::Pipeline;
use rag_answer::retrieve::Retriever;
use rag_answer::{logging, server};

/// Answer questions from fresh web search results.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Web-grounded question answering: search, scrape, and answer with a hosted model",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply if it does not exist.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a query as current affairs or general.
    Classify {
        query: String,
    },

    /// Run retrieval only and print what was fetched.
    Retrieve {
        query: String,

        /// Maximum number of result pages to fetch.
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Answer a single question.
    Ask {
        query: String,
    },

    /// Interactive conversation. `/history` prints the transcript,
    /// `/quit` or EOF exits.
    Chat,

    /// Start the HTTP API.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    config::load_dotenv();

    // Needs no config
    if let Commands::Classify { query } = &cli.command {
        println!("{}", classify(query).label());
        return Ok(());
    }

    let mut cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Classify { .. } => unreachable!(),
        Commands::Retrieve { query, max_pages } => {
            run_retrieve(&cfg, &query, max_pages).await?;
        }
        Commands::Ask { query } => {
            let pipeline = Pipeline::from_config(&cfg)?;
            let mut memory = ConversationMemory::new();
            let answer = pipeline.ask(&query, &mut memory).await;
            if answer.is_error() {
                anyhow::bail!("{}", answer.text());
            }
            println!("{}", answer.text());
        }
        Commands::Chat => {
            let pipeline = Pipeline::from_config(&cfg)?;
            run_chat(&pipeline).await?;
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_retrieve(cfg: &Config, query: &str, max_pages: Option<usize>) -> anyhow::Result<()> {
    let retriever = Retriever::from_config(cfg)?;
    let max_pages = max_pages.unwrap_or(cfg.retrieval.max_pages);
    let retrieval = retriever.retrieve_detailed(query, max_pages).await?;

    println!(
        "Query: {} ({})",
        retrieval.search_query,
        retrieval.classification.label()
    );
    println!("Vertical: {}", retrieval.vertical);
    for doc in &retrieval.documents {
        let status = doc
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mark = if doc.sufficient { "ok" } else { "skipped" };
        println!(
            "  [{}] {:>7} chars  {:<7}  {}",
            status,
            doc.text.chars().count(),
            mark,
            doc.source_url
        );
    }
    if let Some(fq) = &retrieval.fallback_query {
        println!("Fallback: {}", fq);
    }
    println!("Corpus: {} chars", retrieval.corpus.char_len());
    println!();
    println!("{}", retrieval.corpus);
    Ok(())
}

async fn run_chat(pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut memory = ConversationMemory::new();
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line?;
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                if memory.is_empty() {
                    println!("(no turns yet)");
                } else {
                    println!("{}", memory.render_history());
                }
                continue;
            }
            _ => {}
        }

        let answer = pipeline.ask(input, &mut memory).await;
        if answer.is_error() {
            eprintln!("Error: {}", answer.text());
        } else {
            println!("Assistant: {}", answer.text());
        }
    }

    Ok(())
}
