//! Checkpoint persistence for resumable summarization runs.
//!
//! Each model call is expensive, so an aborted run must not reprocess the
//! whole document. The checkpoint carries the running summary and the next
//! chunk index; a restart with the same book and chunk geometry picks up
//! where the previous run stopped.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

/// Persistent state of one summarization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique session identifier
    pub session_id: String,
    /// Path to the source book file
    pub book_path: PathBuf,
    /// SHA256 hash of the book (first 1MB)
    pub book_hash: String,
    /// Chunk geometry the run was started with
    pub chunk_size: usize,
    pub overlap: usize,
    /// Total number of chunks in the run
    pub total_chunks: usize,
    /// Index of the next chunk to process
    pub next_chunk: usize,
    /// Running summary after the last completed chunk
    pub summary: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session was last updated
    pub updated_at: DateTime<Utc>,
    /// Whether every chunk has been processed
    pub completed: bool,
}

/// Directory-backed store of checkpoint files, one JSON file per session.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Open the store at the default data directory.
    pub fn open_default() -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .map(|d| d.join("booksum").join("sessions"))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(Self::at(data_dir))
    }

    /// Open a store rooted at an explicit directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create and persist a fresh checkpoint for a book.
    pub fn create(
        &self,
        book_path: &Path,
        chunk_size: usize,
        overlap: usize,
        total_chunks: usize,
    ) -> Result<Checkpoint> {
        let book_hash = compute_book_hash(book_path)?;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let session_id = format!("{}_{}", book_hash, timestamp);
        let now = Utc::now();

        let checkpoint = Checkpoint {
            session_id,
            book_path: book_path.to_path_buf(),
            book_hash,
            chunk_size,
            overlap,
            total_chunks,
            next_chunk: 0,
            summary: String::new(),
            created_at: now,
            updated_at: now,
            completed: false,
        };

        self.save(&checkpoint)?;
        Ok(checkpoint)
    }

    /// Save checkpoint state to disk.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let file_path = self.checkpoint_path(checkpoint);

        let mut checkpoint = checkpoint.clone();
        checkpoint.updated_at = Utc::now();

        let file = File::create(&file_path).context("Failed to create checkpoint file")?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &checkpoint)
            .context("Failed to write checkpoint JSON")?;

        Ok(())
    }

    /// Find the most recent incomplete checkpoint for a book.
    ///
    /// Only checkpoints with the same content hash and chunk geometry are
    /// candidates; a different geometry means a different chunk sequence,
    /// which a saved position would not line up with.
    pub fn find_for_book(
        &self,
        book_path: &Path,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Option<Checkpoint>> {
        if !self.root.exists() {
            return Ok(None);
        }
        let book_hash = compute_book_hash(book_path)?;

        let mut matching: Vec<Checkpoint> = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(file) = File::open(&path) {
                    let reader = BufReader::new(file);
                    if let Ok(checkpoint) = serde_json::from_reader::<_, Checkpoint>(reader) {
                        if checkpoint.book_hash == book_hash
                            && checkpoint.chunk_size == chunk_size
                            && checkpoint.overlap == overlap
                            && !checkpoint.completed
                        {
                            matching.push(checkpoint);
                        }
                    }
                }
            }
        }

        if matching.is_empty() {
            return Ok(None);
        }

        // Return the most recent one
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matching.into_iter().next())
    }

    /// Record a completed chunk: the new running summary and the next index.
    pub fn record_progress(
        &self,
        checkpoint: &mut Checkpoint,
        summary: &str,
        next_chunk: usize,
    ) -> Result<()> {
        checkpoint.summary = summary.to_string();
        checkpoint.next_chunk = next_chunk;
        checkpoint.completed = next_chunk >= checkpoint.total_chunks;
        self.save(checkpoint)
    }

    /// Remove a checkpoint file after a successful run.
    pub fn remove(&self, checkpoint: &Checkpoint) -> Result<()> {
        let file_path = self.checkpoint_path(checkpoint);
        if file_path.exists() {
            fs::remove_file(&file_path).context("Failed to remove checkpoint file")?;
        }
        Ok(())
    }

    fn checkpoint_path(&self, checkpoint: &Checkpoint) -> PathBuf {
        self.root.join(format!("{}.json", checkpoint.session_id))
    }
}

/// Compute a hash of the book file for session identification.
///
/// Uses SHA256 of the first 1MB for speed with large files.
pub fn compute_book_hash(book_path: &Path) -> Result<String> {
    let file = File::open(book_path).context("Failed to open book file for hashing")?;
    let mut reader = BufReader::new(file);

    // Read first 1MB
    let mut buffer = vec![0u8; 1024 * 1024];
    let bytes_read = reader.read(&mut buffer)?;
    buffer.truncate(bytes_read);

    let mut hasher = Sha256::new();
    hasher.update(&buffer);
    let result = hasher.finalize();

    // Return first 16 hex characters
    Ok(format!("{:x}", result)[..16].to_string())
}
