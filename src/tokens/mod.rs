//! Token counting for budget calculations
//!
//! Counting is pluggable through the [`TokenCounter`] trait. The default
//! [`TiktokenCounter`] resolves a model id to a tokenizer family and keeps one
//! loaded BPE per family for the lifetime of the process.

mod registry;

pub use registry::{tokenizer_for, Tokenizer, TokenizerFamily};

/// Counts tokens in text for a given model.
///
/// Implementations must be deterministic: the same `(text, model)` pair
/// always yields the same count.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str, model: &str) -> usize;

    /// Short identifier used in logs and reports
    fn name(&self) -> &str;
}

/// BPE token counter backed by tiktoken-rs
#[derive(Debug, Clone, Copy, Default)]
pub struct TiktokenCounter;

impl TiktokenCounter {
    pub fn new() -> Self {
        Self
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, text: &str, model: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        tokenizer_for(model).count(text)
    }

    fn name(&self) -> &str {
        "tiktoken"
    }
}

/// Character-based estimate (~4 characters per token), model independent
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count_tokens(&self, text: &str, _model: &str) -> usize {
        estimate_chars(text)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// ~4 characters per token, rounded up
pub(crate) fn estimate_chars(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
