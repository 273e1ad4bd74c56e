//! Context-chained summarization: a strict sequential fold over chunks.
//!
//! Each chunk is summarized together with the summary of everything before
//! it. The model's reply replaces the running summary and becomes the
//! preface of the next chunk's prompt, so long-range coherence survives
//! without ever re-sending earlier text. The conversation is rebuilt from
//! scratch for every chunk; only the latest summary crosses iterations.

use anyhow::{Context, Result};
use llm_client::{ChatMessage, LlmError, LlmProvider, LlmRequest, LlmResponse};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::{Checkpoint, SessionStore};
use crate::text::repair;

/// Knobs for one summarization run.
pub struct SummarizeOptions {
    /// Target summary length in characters, mentioned in the instruction
    pub summary_size: usize,
    /// Courtesy pause between model calls
    pub delay: Duration,
    /// Additional attempts after a transient failure
    pub max_retries: u32,
    /// First retry pause; doubles per attempt
    pub retry_backoff: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Messages sent before the per-chunk user message
    pub preamble: Vec<ChatMessage>,
    pub debug: bool,
}

/// Folds a chunk sequence into one running summary.
pub struct Summarizer<'a> {
    provider: &'a dyn LlmProvider,
    store: &'a SessionStore,
    log_path: PathBuf,
    options: SummarizeOptions,
}

impl<'a> Summarizer<'a> {
    pub fn new(
        provider: &'a dyn LlmProvider,
        store: &'a SessionStore,
        log_path: PathBuf,
        options: SummarizeOptions,
    ) -> Self {
        Self {
            provider,
            store,
            log_path,
            options,
        }
    }

    /// Run the fold, starting at `checkpoint.next_chunk`.
    ///
    /// Every intermediate summary is appended to the summary log and saved
    /// to the checkpoint before the next chunk starts, so an abort at chunk
    /// `k` leaves exactly `k` log entries and a resumable position.
    pub async fn run(&self, chunks: &[String], checkpoint: &mut Checkpoint) -> Result<String> {
        let total = chunks.len();
        let mut summary = checkpoint.summary.clone();

        for (n, chunk) in chunks.iter().enumerate().skip(checkpoint.next_chunk) {
            eprintln!("chunk {} of {}", n + 1, total);

            let instruction = build_instruction(n, chunk, &summary, self.options.summary_size);
            if self.options.debug {
                eprintln!("{}", instruction);
            }

            let mut messages = self.options.preamble.clone();
            messages.push(ChatMessage::user(instruction));
            let request = LlmRequest {
                messages,
                max_tokens: self.options.max_tokens,
                temperature: self.options.temperature,
            };

            let response = self.complete_with_retry(request).await?;

            if response.is_truncated() {
                eprintln!(
                    "warning: reply for chunk {} was cut off by the output limit",
                    n + 1
                );
            }
            if self.options.debug {
                if let Some(reason) = &response.stop_reason {
                    eprintln!("stop reason: {}", reason);
                }
                if let Some(usage) = &response.usage {
                    eprintln!(
                        "Tokens: {} in, {} out",
                        usage.input_tokens, usage.output_tokens
                    );
                }
            }

            summary = repair::fix_text(&response.content)
                .with_context(|| format!("Reply for chunk {} failed encoding repair", n + 1))?;

            self.append_to_log(&summary)
                .with_context(|| format!("Failed to append summary for chunk {}", n + 1))?;
            self.store.record_progress(checkpoint, &summary, n + 1)?;

            if n + 1 < total {
                tokio::time::sleep(self.options.delay).await;
            }
        }

        Ok(summary)
    }

    /// Call the provider, retrying transient failures with doubling backoff.
    async fn complete_with_retry(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut attempt: u32 = 0;
        let mut backoff = self.options.retry_backoff;

        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.options.max_retries => {
                    attempt += 1;
                    // Honor a server-provided pause when there is one
                    let pause = match &e {
                        LlmError::RateLimited {
                            retry_after: Some(seconds),
                        } => Duration::from_secs(*seconds),
                        _ => backoff,
                    };
                    eprintln!(
                        "transient error ({}), retry {} of {} in {:.1}s",
                        e,
                        attempt,
                        self.options.max_retries,
                        pause.as_secs_f32()
                    );
                    tokio::time::sleep(pause).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e).context("LLM request failed"),
            }
        }
    }

    /// Append one summary entry to the log, blank-line separated.
    ///
    /// The file handle never outlives the iteration that wrote it.
    fn append_to_log(&self, summary: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.log_path)?;
        file.write_all(summary.as_bytes())?;
        file.write_all(b"\n\n")?;
        Ok(())
    }
}

/// Build the instruction text for chunk `n`.
///
/// From the second chunk on, the previous running summary rides along as a
/// preface and the instruction asks for a seamless continuation of it.
fn build_instruction(n: usize, chunk: &str, summary: &str, summary_size: usize) -> String {
    let mut text = String::new();
    if n >= 1 {
        text.push_str(&format!("Preface:\n{}\n\n", summary));
    }
    text.push_str(&format!("Text passage:\n{}", chunk));
    text.push_str(&format!(
        "\n\nSummarize the interesting, novel, or unique aspects from the above text passage in about {} characters.",
        summary_size
    ));
    if n >= 1 {
        text.push_str(
            " Write the summary as a natural continuation of the preface above. Don't start with the exact same words. When necessary, use terms from the preface instead of introducing new ones.",
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::text::chunk_windows;
    use llm_client::MockProvider;
    use std::path::Path;
    use tempfile::TempDir;

    fn test_options() -> SummarizeOptions {
        SummarizeOptions {
            summary_size: 300,
            delay: Duration::ZERO,
            max_retries: 3,
            retry_backoff: Duration::from_millis(1),
            temperature: None,
            max_tokens: None,
            preamble: vec![ChatMessage::system("You summarize books.")],
            debug: false,
        }
    }

    fn setup(dir: &TempDir, total_chunks: usize) -> (SessionStore, Checkpoint, PathBuf) {
        let book = dir.path().join("book.txt");
        std::fs::write(&book, "Book content for hashing.").unwrap();
        let store = SessionStore::at(dir.path().join("sessions"));
        let checkpoint = store.create(&book, 3000, 400, total_chunks).unwrap();
        let log_path = dir.path().join("summary.txt");
        (store, checkpoint, log_path)
    }

    fn log_entries(path: &Path) -> Vec<String> {
        let content = std::fs::read_to_string(path).unwrap();
        content
            .split("\n\n")
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.to_string())
            .collect()
    }

    #[test]
    fn test_first_instruction_has_no_preface() {
        let instruction = build_instruction(0, "The chunk text.", "", 300);
        assert!(instruction.starts_with("Text passage:\nThe chunk text."));
        assert!(!instruction.contains("Preface:"));
        assert!(instruction.contains("in about 300 characters."));
        assert!(!instruction.contains("natural continuation"));
    }

    #[test]
    fn test_later_instructions_carry_the_preface() {
        let instruction = build_instruction(2, "Chunk three.", "Summary so far.", 300);
        assert!(instruction.starts_with("Preface:\nSummary so far.\n\nText passage:\nChunk three."));
        assert!(instruction.contains("natural continuation of the preface"));
        assert!(instruction.contains("Don't start with the exact same words."));
    }

    #[tokio::test]
    async fn test_end_to_end_with_echo_stub() {
        let dir = TempDir::new().unwrap();

        // Three sentences repeated well past the chunk size
        let document = "One two. Three four. Five six. ".repeat(4);
        let chunks: Vec<String> = chunk_windows(&document, 10, 2).collect();
        assert!(!chunks.is_empty());

        let (store, mut checkpoint, log_path) = setup(&dir, chunks.len());
        let mock = MockProvider::always_succeeds("A fine summary.");
        let summarizer = Summarizer::new(&mock, &store, log_path.clone(), test_options());

        let final_summary = summarizer.run(&chunks, &mut checkpoint).await.unwrap();

        assert_eq!(final_summary, "A fine summary.");
        assert_eq!(mock.call_count(), chunks.len());
        assert!(checkpoint.completed);

        // One log entry per chunk, all equal to the echoed reply
        let entries = log_entries(&log_path);
        assert_eq!(entries.len(), chunks.len());
        assert!(entries.iter().all(|entry| entry == "A fine summary."));
    }

    #[tokio::test]
    async fn test_context_chaining() {
        let dir = TempDir::new().unwrap();
        let chunks = vec![
            "Alpha section text.".to_string(),
            "Beta section text.".to_string(),
            "Gamma section text.".to_string(),
        ];
        let (store, mut checkpoint, log_path) = setup(&dir, chunks.len());
        let mock = MockProvider::with_script(&["summary one", "summary two", "summary three"]);
        let summarizer = Summarizer::new(&mock, &store, log_path, test_options());

        let final_summary = summarizer.run(&chunks, &mut checkpoint).await.unwrap();
        assert_eq!(final_summary, "summary three");

        let requests = mock.requests();
        assert_eq!(requests.len(), 3);

        // Every call sends exactly the preamble plus one user message
        for request in &requests {
            assert_eq!(request.messages.len(), 2);
            assert_eq!(request.messages[0].role, "system");
            assert_eq!(request.messages[1].role, "user");
        }

        let instruction_0 = &requests[0].messages[1].content;
        assert!(!instruction_0.contains("Preface:"));
        assert!(instruction_0.contains("Alpha section text."));

        // Chunk n sees the previous running summary and only its own text
        let instruction_1 = &requests[1].messages[1].content;
        assert!(instruction_1.contains("Preface:\nsummary one\n\n"));
        assert!(instruction_1.contains("Beta section text."));
        assert!(!instruction_1.contains("Alpha section text."));

        let instruction_2 = &requests[2].messages[1].content;
        assert!(instruction_2.contains("Preface:\nsummary two\n\n"));
        assert!(instruction_2.contains("Gamma section text."));
        assert!(!instruction_2.contains("Alpha section text."));
        assert!(!instruction_2.contains("Beta section text."));
        assert!(!instruction_2.contains("summary one"));
    }

    #[tokio::test]
    async fn test_failure_preserves_progress_and_resume_continues() {
        let dir = TempDir::new().unwrap();
        let chunks = vec![
            "First part. More first.".to_string(),
            "Second part. More second.".to_string(),
            "Third part. More third.".to_string(),
        ];
        let (store, mut checkpoint, log_path) = setup(&dir, chunks.len());

        // Two chunks succeed, then a terminal error
        let mock = MockProvider::succeeds_then_fails(
            2,
            LlmError::ApiError {
                message: "bad request".to_string(),
                status_code: Some(400),
            },
            "partial summary",
        );
        let summarizer = Summarizer::new(&mock, &store, log_path.clone(), test_options());

        let result = summarizer.run(&chunks, &mut checkpoint).await;
        assert!(result.is_err());

        // Exactly two entries survive, and the checkpoint points at chunk 3
        assert_eq!(log_entries(&log_path).len(), 2);
        assert_eq!(checkpoint.next_chunk, 2);
        assert!(!checkpoint.completed);

        // A fresh run picks up at the failed chunk only
        let mock = MockProvider::always_succeeds("resumed summary");
        let summarizer = Summarizer::new(&mock, &store, log_path.clone(), test_options());
        let final_summary = summarizer.run(&chunks, &mut checkpoint).await.unwrap();

        assert_eq!(final_summary, "resumed summary");
        assert_eq!(mock.call_count(), 1);
        assert_eq!(log_entries(&log_path).len(), 3);
        assert!(checkpoint.completed);
    }

    #[tokio::test]
    async fn test_resume_feeds_checkpoint_summary_as_preface() {
        let dir = TempDir::new().unwrap();
        let chunks = vec!["First chunk.".to_string(), "Second chunk.".to_string()];
        let (store, mut checkpoint, log_path) = setup(&dir, chunks.len());
        store
            .record_progress(&mut checkpoint, "summary from last run", 1)
            .unwrap();

        let mock = MockProvider::always_succeeds("continued");
        let summarizer = Summarizer::new(&mock, &store, log_path, test_options());
        summarizer.run(&chunks, &mut checkpoint).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(
            requests[0].messages[1]
                .content
                .contains("Preface:\nsummary from last run\n\n")
        );
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let dir = TempDir::new().unwrap();
        let chunks = vec!["Only chunk here.".to_string()];
        let (store, mut checkpoint, log_path) = setup(&dir, chunks.len());

        let mock = MockProvider::fails_then_succeeds(
            1,
            LlmError::ServerOverloaded {
                message: "overloaded".to_string(),
            },
            "recovered summary",
        );
        let summarizer = Summarizer::new(&mock, &store, log_path, test_options());

        let final_summary = summarizer.run(&chunks, &mut checkpoint).await.unwrap();
        assert_eq!(final_summary, "recovered summary");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let dir = TempDir::new().unwrap();
        let chunks = vec!["Only chunk here.".to_string()];
        let (store, mut checkpoint, log_path) = setup(&dir, chunks.len());

        let mock = MockProvider::always_fails(LlmError::ApiError {
            message: "invalid request".to_string(),
            status_code: Some(400),
        });
        let summarizer = Summarizer::new(&mock, &store, log_path.clone(), test_options());

        let result = summarizer.run(&chunks, &mut checkpoint).await;
        assert!(result.is_err());
        assert_eq!(mock.call_count(), 1);
        assert!(!log_path.exists());
    }

    #[tokio::test]
    async fn test_garbled_reply_aborts_without_persisting() {
        let dir = TempDir::new().unwrap();
        let chunks = vec!["Only chunk here.".to_string()];
        let (store, mut checkpoint, log_path) = setup(&dir, chunks.len());

        let mock = MockProvider::always_succeeds("broken \u{fffd} reply");
        let summarizer = Summarizer::new(&mock, &store, log_path.clone(), test_options());

        let result = summarizer.run(&chunks, &mut checkpoint).await;
        assert!(result.is_err());
        assert!(!log_path.exists());
        assert_eq!(checkpoint.next_chunk, 0);
    }

    #[tokio::test]
    async fn test_mojibake_reply_is_repaired_before_chaining() {
        let dir = TempDir::new().unwrap();
        let chunks = vec!["First chunk.".to_string(), "Second chunk.".to_string()];
        let (store, mut checkpoint, log_path) = setup(&dir, chunks.len());

        // First reply is mojibake for "don\u{2019}t stop"
        let mock = MockProvider::with_script(&["donâ\u{20ac}\u{2122}t stop", "done"]);
        let summarizer = Summarizer::new(&mock, &store, log_path.clone(), test_options());

        summarizer.run(&chunks, &mut checkpoint).await.unwrap();

        // The repaired text is what got logged and chained
        let entries = log_entries(&log_path);
        assert_eq!(entries[0], "don\u{2019}t stop");
        let requests = mock.requests();
        assert!(
            requests[1].messages[1]
                .content
                .contains("Preface:\ndon\u{2019}t stop\n\n")
        );
    }

    #[tokio::test]
    async fn test_truncated_reply_is_kept() {
        let dir = TempDir::new().unwrap();
        let chunks = vec!["Only chunk here.".to_string()];
        let (store, mut checkpoint, log_path) = setup(&dir, chunks.len());

        // A cut-off reply is still a valid summary prefix; it is logged
        // with a warning, not rejected
        let mock = MockProvider::always_succeeds("summary that got cut").with_stop_reason("length");
        let summarizer = Summarizer::new(&mock, &store, log_path.clone(), test_options());

        let final_summary = summarizer.run(&chunks, &mut checkpoint).await.unwrap();
        assert_eq!(final_summary, "summary that got cut");
        assert_eq!(log_entries(&log_path).len(), 1);
    }

    #[tokio::test]
    async fn test_zero_chunks_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let (store, mut checkpoint, log_path) = setup(&dir, 0);

        let mock = MockProvider::always_succeeds("never used");
        let summarizer = Summarizer::new(&mock, &store, log_path.clone(), test_options());

        let final_summary = summarizer.run(&[], &mut checkpoint).await.unwrap();
        assert_eq!(final_summary, "");
        assert_eq!(mock.call_count(), 0);
        assert!(!log_path.exists());
    }
}
