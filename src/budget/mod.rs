//! Token budget allocation with change-first priority and line-aware
//! truncation.
//!
//! All token numbers are estimates from a [`TokenEstimator`]. The default
//! [`CharEstimator`] uses `ceil(chars / 4)`, which can drift from a model's
//! real tokenizer in either direction.
pub mod estimator;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub use estimator::{CharEstimator, HfTokenEstimator, TokenEstimator};

#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("invalid token limits: {0}")]
    InvalidLimits(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

// ── Limits ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLimits {
    #[serde(default = "default_max_change_tokens")]
    pub max_change_tokens: usize,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: usize,
    /// Reserved for the fixed instruction preamble.
    #[serde(default = "default_preamble_tokens")]
    pub preamble_tokens: usize,
}

fn default_max_change_tokens() -> usize {
    4000
}
fn default_max_context_tokens() -> usize {
    12000
}
fn default_max_total_tokens() -> usize {
    16000
}
fn default_preamble_tokens() -> usize {
    500
}

impl Default for TokenLimits {
    fn default() -> Self {
        Self {
            max_change_tokens: default_max_change_tokens(),
            max_context_tokens: default_max_context_tokens(),
            max_total_tokens: default_max_total_tokens(),
            preamble_tokens: default_preamble_tokens(),
        }
    }
}

impl TokenLimits {
    pub fn validate(&self) -> Result<(), BudgetError> {
        if self.max_change_tokens == 0 || self.max_context_tokens == 0 || self.max_total_tokens == 0 {
            return Err(BudgetError::InvalidLimits(
                "token ceilings must be greater than 0".to_string(),
            ));
        }
        if self.preamble_tokens >= self.max_total_tokens {
            return Err(BudgetError::InvalidLimits(format!(
                "preamble_tokens ({}) must be less than max_total_tokens ({})",
                self.preamble_tokens, self.max_total_tokens
            )));
        }
        Ok(())
    }
}

// ── Allocation ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub allocated_change: usize,
    pub allocated_context: usize,
    /// `preamble + allocated_change + allocated_context`.
    pub total_input: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetedInputs {
    pub change: String,
    pub context: String,
    pub allocation: Allocation,
    pub change_tokens_removed: usize,
    pub context_tokens_removed: usize,
}

pub struct BudgetAllocator {
    limits: TokenLimits,
    estimator: Arc<dyn TokenEstimator>,
}

impl std::fmt::Debug for BudgetAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetAllocator")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl BudgetAllocator {
    /// Allocator using the character estimator.
    pub fn new(limits: TokenLimits) -> Result<Self, BudgetError> {
        Self::with_estimator(limits, Arc::new(CharEstimator))
    }

    pub fn with_estimator(
        limits: TokenLimits,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self, BudgetError> {
        limits.validate()?;
        Ok(Self { limits, estimator })
    }

    pub fn limits(&self) -> &TokenLimits {
        &self.limits
    }

    pub fn estimate(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }

    /// Splits the budget between two estimated sizes.
    ///
    /// The change gets up to its ceiling first; the context gets what is left
    /// of `total - preamble`, capped at its own ceiling.
    pub fn allocation_for(&self, change_tokens: usize, context_tokens: usize) -> Allocation {
        let limits = &self.limits;
        let available = limits.max_total_tokens - limits.preamble_tokens;

        let allocated_change = change_tokens.min(limits.max_change_tokens).min(available);
        let allocated_context = context_tokens
            .min(available - allocated_change)
            .min(limits.max_context_tokens);

        Allocation {
            allocated_change,
            allocated_context,
            total_input: limits.preamble_tokens + allocated_change + allocated_context,
        }
    }

    /// Allocates and truncates both texts.
    ///
    /// A truncated text carries a trailing marker, so its estimate can exceed
    /// its allocation by the marker's few tokens.
    pub fn allocate(&self, change: &str, context: &str) -> BudgetedInputs {
        let change_tokens = self.estimate(change);
        let context_tokens = self.estimate(context);
        let allocation = self.allocation_for(change_tokens, context_tokens);

        let (change_out, change_removed) =
            self.truncate(change, change_tokens, allocation.allocated_change, "change");
        let (context_out, context_removed) =
            self.truncate(context, context_tokens, allocation.allocated_context, "context");

        info!(
            original_change_tokens = change_tokens,
            original_context_tokens = context_tokens,
            allocated_change = allocation.allocated_change,
            allocated_context = allocation.allocated_context,
            total_input = allocation.total_input,
            "Token budget allocated"
        );

        BudgetedInputs {
            change: change_out,
            context: context_out,
            allocation,
            change_tokens_removed: change_removed,
            context_tokens_removed: context_removed,
        }
    }

    /// Cuts `text` to `max_tokens`, preferring a newline in the last fifth of
    /// the cut. Returns the text and the estimated tokens removed.
    pub fn truncate_to_budget(&self, text: &str, max_tokens: usize, label: &str) -> (String, usize) {
        self.truncate(text, self.estimate(text), max_tokens, label)
    }

    fn truncate(&self, text: &str, estimated: usize, max_tokens: usize, label: &str) -> (String, usize) {
        if estimated <= max_tokens {
            return (text.to_string(), 0);
        }

        let head = &text[..self.estimator.cut_offset(text, max_tokens)];
        let clean = match head.rfind('\n') {
            Some(newline) => {
                let cut_chars = head.chars().count();
                let newline_chars = head[..newline].chars().count();
                // newline strictly past 80% of the cut
                if newline_chars * 5 > cut_chars * 4 {
                    &head[..newline]
                } else {
                    head
                }
            }
            None => head,
        };

        let kept = self.estimate(clean);
        let removed = estimated.saturating_sub(kept);
        warn!(
            label,
            original_tokens = estimated,
            max_tokens,
            truncated_to = kept,
            "Truncated {label} to fit token budget"
        );

        (
            format!("{clean}\n\n... [{label} truncated: {removed} tokens removed]"),
            removed,
        )
    }
}
