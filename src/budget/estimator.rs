//! Token estimation strategies.
//!
//! Counts are approximations that drive truncation decisions, not billing.
use std::path::Path;
use std::str::FromStr;

use tokenizers::Tokenizer;
use tracing::warn;

use super::BudgetError;

/// Approximate characters per token.
pub const CHARS_PER_TOKEN: usize = 4;

pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;

    /// Byte offset of the end of the longest prefix of `text` covered by
    /// `tokens` tokens. Always a char boundary.
    fn cut_offset(&self, text: &str, tokens: usize) -> usize;
}

/// `ceil(chars / 4)` over Unicode scalar values.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimator;

impl TokenEstimator for CharEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }

    fn cut_offset(&self, text: &str, tokens: usize) -> usize {
        let max_chars = tokens.saturating_mul(CHARS_PER_TOKEN);
        text.char_indices()
            .nth(max_chars)
            .map_or(text.len(), |(offset, _)| offset)
    }
}

/// Counts tokens with a HuggingFace `tokenizer.json`.
pub struct HfTokenEstimator {
    inner: Tokenizer,
}

impl HfTokenEstimator {
    pub fn from_file(path: &Path) -> Result<Self, BudgetError> {
        let inner = Tokenizer::from_file(path).map_err(|e| BudgetError::Tokenizer(format!(
            "failed to load {}: {e}",
            path.display()
        )))?;
        Ok(Self { inner })
    }

    pub fn from_json(json: &str) -> Result<Self, BudgetError> {
        let inner = Tokenizer::from_str(json)
            .map_err(|e| BudgetError::Tokenizer(format!("invalid tokenizer definition: {e}")))?;
        Ok(Self { inner })
    }
}

impl TokenEstimator for HfTokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        match self.inner.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                warn!(error = %e, "Tokenizer failed, using character estimate");
                CharEstimator.estimate(text)
            }
        }
    }

    fn cut_offset(&self, text: &str, tokens: usize) -> usize {
        if tokens == 0 {
            return 0;
        }
        let encoding = match self.inner.encode(text, false) {
            Ok(encoding) => encoding,
            Err(e) => {
                warn!(error = %e, "Tokenizer failed, using character cut");
                return CharEstimator.cut_offset(text, tokens);
            }
        };

        let offsets = encoding.get_offsets();
        if tokens >= offsets.len() {
            return text.len();
        }
        let mut end = offsets[tokens - 1].1.min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        end
    }
}
