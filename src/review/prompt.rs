//! Prompt assembly for the review model.
use std::fmt::Write as _;

use super::diff::ParsedDiff;
use crate::budget::BudgetedInputs;

const SYSTEM_PREAMBLE: &str = "\
You are an expert code reviewer. Analyze code changes and provide constructive feedback.

Focus on:
- Critical: security vulnerabilities, logic bugs, breaking changes
- Warning: code quality issues, potential bugs, performance concerns
- Suggestion: style improvements, idiomatic alternatives, optimizations

For each issue found, provide:
1. Severity level (critical/warning/suggestion)
2. Confidence score (0-100)
3. Clear explanation
4. Suggested fix when applicable

Repository context, when present, shows the functions touched by the change together \
with their callers and callees. Use it to judge impact beyond the diff, but only \
comment on lines that the diff changes.

Be concise and actionable. Only flag significant issues.";

/// Fixed instructions sent ahead of every review request.
pub fn system_preamble() -> &'static str {
    SYSTEM_PREAMBLE
}

/// Builds the user message from the diff summary and the budgeted inputs.
///
/// `inputs.change` replaces the raw diff body so the prompt stays inside the
/// allocation.
pub fn build_user_prompt(diff: &ParsedDiff, title: &str, inputs: &BudgetedInputs) -> String {
    let has_context = !inputs.context.trim().is_empty();

    let mut prompt = String::new();
    let _ = writeln!(prompt, "Review this change:\n");
    let _ = writeln!(prompt, "**Title**: {title}\n");
    let _ = writeln!(prompt, "**Changes Summary**:");
    let _ = writeln!(
        prompt,
        "- {} additions, {} deletions",
        diff.additions, diff.deletions
    );
    let _ = writeln!(prompt, "- {} files changed\n", diff.files.len());

    if has_context {
        let _ = writeln!(prompt, "**Repository Context**:");
        let _ = writeln!(prompt, "{}\n", inputs.context);
    }

    let _ = writeln!(prompt, "**Diff**:");
    let _ = writeln!(prompt, "```diff\n{}\n```\n", inputs.change);

    prompt.push_str("Provide your review as structured feedback");
    if has_context {
        prompt.push_str(
            ", considering the provided repository context for better understanding of the codebase",
        );
    }
    prompt.push('.');
    prompt
}

/// Free-text retrieval query for a change: the changed paths followed by
/// the added lines, whole lines only, up to `max_chars` characters.
pub fn retrieval_query(diff: &ParsedDiff, max_chars: usize) -> String {
    let candidates = diff
        .files
        .iter()
        .map(|f| f.filename.as_str())
        .chain(diff.added_lines().map(str::trim))
        .filter(|line| !line.is_empty());

    let mut query = String::new();
    let mut used = 0usize;
    for line in candidates {
        let len = line.chars().count();
        let sep = usize::from(!query.is_empty());
        if used + sep + len > max_chars {
            break;
        }
        if sep == 1 {
            query.push('\n');
        }
        query.push_str(line);
        used += sep + len;
    }
    query
}
