//! booksum configuration management.

use anyhow::Result;
use llm_client::ChatMessage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CHUNK_SIZE: usize = 3000;
const DEFAULT_OVERLAP: usize = 400;
const DEFAULT_DELAY_MS: u64 = 1000;
const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BooksumConfig {
    /// Target window size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Extra characters pulled in on each side of a window before clipping
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    /// Target summary length in characters. None means chunk_size / 10.
    #[serde(default)]
    pub summary_size: Option<usize>,

    /// Pause between model calls, in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Additional attempts after a transient model failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sampling temperature passed through to the provider
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Output token cap passed through to the provider
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Messages sent before the per-chunk user message
    #[serde(default = "default_preamble")]
    pub preamble: Vec<ChatMessage>,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

fn default_delay_ms() -> u64 {
    DEFAULT_DELAY_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_preamble() -> Vec<ChatMessage> {
    vec![ChatMessage::system(
        "You are a careful reader summarizing a book one passage at a time.",
    )]
}

impl Default for BooksumConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            summary_size: None,
            delay_ms: default_delay_ms(),
            max_retries: default_max_retries(),
            temperature: None,
            max_tokens: None,
            preamble: default_preamble(),
        }
    }
}

impl BooksumConfig {
    /// Get the config file path: ~/.config/cli-programs/booksum.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cli-programs")
            .join("booksum.toml"))
    }

    /// Load config from the default location, returning defaults if absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: BooksumConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Summary length target, derived from the chunk size when unset
    pub fn effective_summary_size(&self) -> usize {
        self.summary_size.unwrap_or(self.chunk_size / 10)
    }
}
