//! booksum - Compress an e-book into a running narrative summary using an LLM

mod book;
mod config;
mod llm;
mod session;
mod summarize;
mod text;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::BooksumConfig;
use llm::LlmClient;
use llm_client::{Config, ModelPreset};
use session::SessionStore;
use std::path::PathBuf;
use std::time::Duration;
use summarize::{SummarizeOptions, Summarizer};

#[derive(Parser, Debug)]
#[command(
    name = "booksum",
    about = "Compress an e-book into a running narrative summary using an LLM",
    long_about = "Splits a book into overlapping sentence-aligned windows and summarizes them \
                  one by one, feeding each window to the model together with the summary so far"
)]
#[command(version)]
struct Args {
    /// Path to the book file (.epub or .txt)
    book: Option<PathBuf>,

    /// Summary log file (default: <book stem>.summary.txt next to the book)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target window size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Extra characters pulled in on each side of a window before clipping
    #[arg(long)]
    overlap: Option<usize>,

    /// Target summary length in characters (default: chunk size / 10)
    #[arg(long)]
    summary_size: Option<usize>,

    /// Skip EPUB spine items before the one with this id
    #[arg(long)]
    start_at: Option<String>,

    /// Model preset to use (overrides default from config)
    #[arg(short, long)]
    model: Option<String>,

    /// Read tool configuration from this file instead of the default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start fresh, ignore any existing checkpoint
    #[arg(long)]
    no_resume: bool,

    /// Enable debug mode for verbose output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Configuration subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Set the default model preset
    SetDefault {
        /// Name of the preset to use as default
        preset: String,
    },
    /// List available presets
    List,
    /// Show current configuration
    Show,
    /// Add a new preset
    AddPreset {
        /// Preset name
        name: String,
        /// Provider (anthropic, openai, openrouter)
        #[arg(short, long)]
        provider: String,
        /// Model identifier
        #[arg(short = 'M', long)]
        model: String,
    },
}

/// Handle config subcommands
fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::SetDefault { preset } => {
            let mut config = Config::load()?;
            // Verify preset exists
            config.get_preset(preset)?;
            config.defaults.insert("booksum".to_string(), preset.clone());
            config.save()?;
            println!("Default preset for booksum set to: {}", preset);
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let current_default = config.get_default_for_program("booksum");
            println!("Available presets:");
            for (name, preset) in &config.presets {
                let default_marker = if name == current_default {
                    " (default)"
                } else {
                    ""
                };
                println!(
                    "  {} - {} / {}{}",
                    name, preset.provider, preset.model, default_marker
                );
            }
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            let path = Config::config_path()?;
            println!("LLM config file: {}", path.display());
            println!();
            println!("{:#?}", config);

            let tool_config = BooksumConfig::load()?;
            let tool_path = BooksumConfig::config_path()?;
            println!();
            println!("Tool config file: {}", tool_path.display());
            println!();
            println!("{:#?}", tool_config);
        }
        ConfigAction::AddPreset {
            name,
            provider,
            model,
        } => {
            let mut config = Config::load()?;
            config.presets.insert(
                name.clone(),
                ModelPreset {
                    provider: provider.clone(),
                    model: model.clone(),
                },
            );
            config.save()?;
            println!("Added preset: {}", name);
        }
    }
    Ok(())
}

/// Default summary log path: <book stem>.summary.txt next to the book
fn default_log_path(book_path: &PathBuf) -> PathBuf {
    let stem = book_path.file_stem().unwrap_or_default();
    book_path.with_file_name(format!("{}.summary.txt", stem.to_string_lossy()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle config subcommands first (before LLM initialization)
    if let Some(Commands::Config { action }) = &args.command {
        return handle_config_command(action);
    }

    let book_path = args.book.clone().ok_or_else(|| {
        anyhow::anyhow!("Book file path is required. Run 'booksum --help' for usage.")
    })?;

    if !book_path.exists() {
        anyhow::bail!("Book file not found: {}", book_path.display());
    }

    // Load tool configuration; flags override config values
    let config = match &args.config {
        Some(path) => BooksumConfig::load_from(path)
            .context(format!("Failed to load config: {}", path.display()))?,
        None => BooksumConfig::load().context("Failed to load configuration")?,
    };

    let chunk_size = args.chunk_size.unwrap_or(config.chunk_size);
    let overlap = args.overlap.unwrap_or(config.overlap);
    if chunk_size == 0 {
        anyhow::bail!("Chunk size must be positive");
    }
    let summary_size = args
        .summary_size
        .or(config.summary_size)
        .unwrap_or(chunk_size / 10);

    let log_path = args.output.clone().unwrap_or_else(|| default_log_path(&book_path));

    eprintln!("Reading {}", book_path.display());
    let document = book::extract_text(&book_path, args.start_at.as_deref())?;
    if document.trim().is_empty() {
        anyhow::bail!("Document is empty: {}", book_path.display());
    }
    eprintln!("Document: {} characters", document.chars().count());

    let chunks: Vec<String> = text::chunk_windows(&document, chunk_size, overlap).collect();
    eprintln!("Total chunks: {}", chunks.len());

    // Check for an existing checkpoint unless starting fresh
    let store = SessionStore::open_default()?;
    let existing = if !args.no_resume {
        store.find_for_book(&book_path, chunk_size, overlap)?
    } else {
        None
    };

    let mut checkpoint = match existing {
        Some(checkpoint) => {
            eprintln!(
                "Resuming session: {}/{} chunks complete",
                checkpoint.next_chunk, checkpoint.total_chunks
            );
            checkpoint
        }
        None => store.create(&book_path, chunk_size, overlap, chunks.len())?,
    };

    // Initialize LLM client
    let client = LlmClient::new(args.model.as_deref(), args.debug)?;

    let options = SummarizeOptions {
        summary_size,
        delay: Duration::from_millis(config.delay_ms),
        max_retries: config.max_retries,
        retry_backoff: Duration::from_secs(2),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        preamble: config.preamble.clone(),
        debug: args.debug,
    };

    let summarizer = Summarizer::new(client.provider(), &store, log_path.clone(), options);
    let summary = summarizer.run(&chunks, &mut checkpoint).await?;

    // Cleanup checkpoint on success
    store.remove(&checkpoint)?;

    println!("{}", summary);
    eprintln!("---");
    eprintln!("Summary log: {}", log_path.display());

    Ok(())
}
