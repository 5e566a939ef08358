use serde::{Deserialize, Serialize};
use tracing::warn;

use super::diff::ParsedDiff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewLimits {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_additions")]
    pub max_additions: usize,
    #[serde(default = "default_max_deletions")]
    pub max_deletions: usize,
    #[serde(default = "default_max_total_changes")]
    pub max_total_changes: usize,
}

fn default_max_files() -> usize {
    50
}
fn default_max_additions() -> usize {
    2000
}
fn default_max_deletions() -> usize {
    1500
}
fn default_max_total_changes() -> usize {
    3000
}

impl Default for ReviewLimits {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_additions: default_max_additions(),
            max_deletions: default_max_deletions(),
            max_total_changes: default_max_total_changes(),
        }
    }
}

impl ReviewLimits {
    pub fn scaled(&self, factor: usize) -> Self {
        Self {
            max_files: self.max_files.saturating_mul(factor),
            max_additions: self.max_additions.saturating_mul(factor),
            max_deletions: self.max_deletions.saturating_mul(factor),
            max_total_changes: self.max_total_changes.saturating_mul(factor),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDetails {
    pub files: usize,
    pub additions: usize,
    pub deletions: usize,
    pub total_changes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitCheck {
    pub passed: bool,
    /// Violations joined by `; `, when any.
    pub reason: Option<String>,
    pub details: ChangeDetails,
    pub limits: ReviewLimits,
}

pub fn check_limits(diff: &ParsedDiff, limits: &ReviewLimits) -> LimitCheck {
    let details = ChangeDetails {
        files: diff.files.len(),
        additions: diff.additions,
        deletions: diff.deletions,
        total_changes: diff.additions + diff.deletions,
    };

    let mut violations = Vec::new();
    if details.files > limits.max_files {
        violations.push(format!("Too many files: {}/{}", details.files, limits.max_files));
    }
    if details.additions > limits.max_additions {
        violations.push(format!(
            "Too many additions: {}/{}",
            details.additions, limits.max_additions
        ));
    }
    if details.deletions > limits.max_deletions {
        violations.push(format!(
            "Too many deletions: {}/{}",
            details.deletions, limits.max_deletions
        ));
    }
    if details.total_changes > limits.max_total_changes {
        violations.push(format!(
            "Too many total changes: {}/{}",
            details.total_changes, limits.max_total_changes
        ));
    }

    let passed = violations.is_empty();
    if !passed {
        warn!(violations = ?violations, "Change exceeds size limits");
    }

    LimitCheck {
        passed,
        reason: (!passed).then(|| violations.join("; ")),
        details,
        limits: *limits,
    }
}

/// True when the change exceeds twice the configured limits.
pub fn should_skip_review(diff: &ParsedDiff, limits: &ReviewLimits) -> bool {
    !check_limits(diff, &limits.scaled(2)).passed
}

/// Markdown notice for a change too large to review in detail.
pub fn oversized_message(check: &LimitCheck) -> String {
    let d = &check.details;
    let l = &check.limits;
    format!(
        "## Change Too Large for Detailed Review

This change exceeds the size limits for automated review:

| Metric | Current | Limit |
|--------|---------|-------|
| Files changed | {} | {} |
| Additions | {} | {} |
| Deletions | {} | {} |
| Total changes | {} | {} |

### Recommendations

1. **Split the change** into smaller, independently reviewable pieces
2. **Separate refactoring** from behavior changes
3. **Merge incrementally** behind feature flags

---
*Automated message. The review was skipped to stay within token limits.*",
        d.files,
        l.max_files,
        d.additions,
        l.max_additions,
        d.deletions,
        l.max_deletions,
        d.total_changes,
        l.max_total_changes
    )
}
