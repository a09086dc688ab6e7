//! Process-wide tokenizer registry, one entry per model family

use std::fmt;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use super::estimate_chars;

/// Tokenizer family a model id resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenizerFamily {
    /// GPT-4 class models
    Gpt4,
    /// GPT-3.5 class models
    Gpt35,
    /// Everything else
    Generic,
}

impl TokenizerFamily {
    /// Resolve a model id. Unknown models map to [`TokenizerFamily::Generic`].
    pub fn for_model(model: &str) -> Self {
        if contains_ignore_case(model, "gpt-4") {
            Self::Gpt4
        } else if contains_ignore_case(model, "gpt-3.5") {
            Self::Gpt35
        } else {
            Self::Generic
        }
    }

    /// Model name handed to tiktoken when loading this family
    fn reference_model(self) -> Option<&'static str> {
        match self {
            Self::Gpt4 => Some("gpt-4"),
            Self::Gpt35 => Some("gpt-3.5-turbo"),
            Self::Generic => None,
        }
    }

    fn slot(self) -> &'static OnceLock<Tokenizer> {
        static GPT4: OnceLock<Tokenizer> = OnceLock::new();
        static GPT35: OnceLock<Tokenizer> = OnceLock::new();
        static GENERIC: OnceLock<Tokenizer> = OnceLock::new();

        match self {
            Self::Gpt4 => &GPT4,
            Self::Gpt35 => &GPT35,
            Self::Generic => &GENERIC,
        }
    }
}

/// ASCII case-insensitive substring test, without allocating
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

impl fmt::Display for TokenizerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gpt4 => "gpt-4",
            Self::Gpt35 => "gpt-3.5",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// A loaded tokenizer. Always usable: if no BPE can be loaded the
/// character heuristic stands in.
pub enum Tokenizer {
    Bpe(CoreBPE),
    Heuristic,
}

impl Tokenizer {
    pub fn count(&self, text: &str) -> usize {
        match self {
            Self::Bpe(bpe) => bpe.encode_with_special_tokens(text).len(),
            Self::Heuristic => estimate_chars(text),
        }
    }

    fn load(family: TokenizerFamily) -> Self {
        let resolved = match family.reference_model() {
            Some(model) => tiktoken_rs::get_bpe_from_model(model),
            None => tiktoken_rs::cl100k_base(),
        };

        match resolved.or_else(|e| {
            warn!(family = %family, error = %e, "Tokenizer load failed, using cl100k_base");
            tiktoken_rs::cl100k_base()
        }) {
            Ok(bpe) => {
                debug!(family = %family, "Loaded BPE tokenizer");
                Self::Bpe(bpe)
            }
            Err(e) => {
                warn!(family = %family, error = %e, "No BPE available, using character heuristic");
                Self::Heuristic
            }
        }
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bpe(_) => f.write_str("Tokenizer::Bpe"),
            Self::Heuristic => f.write_str("Tokenizer::Heuristic"),
        }
    }
}

/// Tokenizer for a model, loading its family on first use.
///
/// Concurrent first calls may race to build the entry; only one value is
/// kept and later reads are lock-free.
pub fn tokenizer_for(model: &str) -> &'static Tokenizer {
    let family = TokenizerFamily::for_model(model);
    family.slot().get_or_init(|| Tokenizer::load(family))
}
