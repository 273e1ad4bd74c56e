//! Text processing: window chunking and encoding repair.

pub mod chunker;
pub mod repair;

pub use chunker::{chunk_windows, clip_to_sentences};
