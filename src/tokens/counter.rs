//! Token counter implementation
//!
//! Uses tiktoken-rs to count tokens of prompts and completions. The upstream
//! never reports usage, so these counts are what clients see in `usage`.

use std::sync::Arc;

use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};

/// Encoding used when no tokenizer model is requested
pub const DEFAULT_TOKENIZER_MODEL: &str = "gpt-4";

/// Thread-safe token counter
///
/// `CoreBPE` is immutable after construction, so a single encoder is shared
/// across all requests without locking.
#[derive(Clone)]
pub struct TokenCounter {
    encoder: Arc<CoreBPE>,
}

impl TokenCounter {
    /// Create a counter using the default encoding
    pub fn new() -> anyhow::Result<Self> {
        Self::for_model(DEFAULT_TOKENIZER_MODEL)
    }

    /// Create a counter using the encoding of an OpenAI model
    ///
    /// Unknown models fall back to `cl100k_base`.
    pub fn for_model(model: &str) -> anyhow::Result<Self> {
        let encoder = match get_bpe_from_model(model) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(
                    "Unknown tokenizer model '{}', falling back to cl100k_base: {}",
                    model,
                    e
                );
                cl100k_base()?
            }
        };

        Ok(Self {
            encoder: Arc::new(encoder),
        })
    }

    /// Encode a text into token ids
    pub fn encode(&self, text: &str) -> Vec<usize> {
        self.encoder.encode_with_special_tokens(text)
    }

    /// Count tokens in a text string
    pub fn count_tokens(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        self.encode(text).len() as u32
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter").finish_non_exhaustive()
    }
}
