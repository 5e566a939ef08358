//! Review gate: diff parsing, change-size limits and prompt assembly.
pub mod diff;
pub mod limits;
pub mod prompt;

pub use diff::{DiffFile, FileStatus, ParsedDiff, parse_unified_diff};
pub use limits::{
    ChangeDetails, LimitCheck, ReviewLimits, check_limits, oversized_message, should_skip_review,
};
pub use prompt::{build_user_prompt, retrieval_query, system_preamble};
