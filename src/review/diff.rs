use serde::{Deserialize, Serialize};

/// Files with fewer changed lines than this are treated as trivial.
const MIN_SIGNIFICANT_LINES: usize = 3;
const SKIPPED_EXTENSIONS: &[&str] = &[".md", ".txt", ".json", ".yml", ".yaml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Removed,
    Modified,
    Renamed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFile {
    pub filename: String,
    pub status: FileStatus,
    pub additions: usize,
    pub deletions: usize,
    /// Hunks only, starting at the first `@@`. `None` for binary or
    /// metadata-only changes.
    pub patch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDiff {
    /// The raw diff text.
    pub content: String,
    pub files: Vec<DiffFile>,
    pub additions: usize,
    pub deletions: usize,
}

impl ParsedDiff {
    /// Drops trivial files and docs/config files. Totals still describe the
    /// whole diff.
    pub fn significant_changes(&self) -> ParsedDiff {
        let files = self
            .files
            .iter()
            .filter(|f| f.additions + f.deletions >= MIN_SIGNIFICANT_LINES)
            .filter(|f| !SKIPPED_EXTENSIONS.iter().any(|ext| f.filename.ends_with(ext)))
            .cloned()
            .collect();
        ParsedDiff {
            content: self.content.clone(),
            files,
            additions: self.additions,
            deletions: self.deletions,
        }
    }

    /// Lines added across all files, without the leading `+`.
    pub fn added_lines(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter_map(|f| f.patch.as_deref())
            .flat_map(str::lines)
            .filter(|l| l.starts_with('+'))
            .map(|l| &l[1..])
    }
}

struct FileBuilder {
    file: DiffFile,
    patch: Vec<String>,
}

impl FileBuilder {
    fn new(filename: String) -> Self {
        Self {
            file: DiffFile {
                filename,
                status: FileStatus::Modified,
                additions: 0,
                deletions: 0,
                patch: None,
            },
            patch: Vec::new(),
        }
    }

    fn finish(mut self) -> DiffFile {
        if !self.patch.is_empty() {
            self.file.patch = Some(self.patch.join("\n"));
        }
        self.file
    }
}

/// Parses `git diff` / unified diff output into per-file statistics.
///
/// Hunk bodies are consumed by the line counts in their `@@` headers, so
/// content lines that look like headers (`--- x`) are counted, not parsed.
pub fn parse_unified_diff(text: &str) -> ParsedDiff {
    let mut files = Vec::new();
    let mut current: Option<FileBuilder> = None;
    let mut old_left = 0usize;
    let mut new_left = 0usize;

    for line in text.lines() {
        if old_left > 0 || new_left > 0 {
            if let Some(builder) = current.as_mut() {
                match line.as_bytes().first().copied() {
                    Some(b'+') => {
                        builder.file.additions += 1;
                        new_left = new_left.saturating_sub(1);
                    }
                    Some(b'-') => {
                        builder.file.deletions += 1;
                        old_left = old_left.saturating_sub(1);
                    }
                    Some(b'\\') => {}
                    _ => {
                        old_left = old_left.saturating_sub(1);
                        new_left = new_left.saturating_sub(1);
                    }
                }
                builder.patch.push(line.to_string());
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            files.extend(current.take().map(FileBuilder::finish));
            current = Some(FileBuilder::new(git_header_path(rest)));
        } else if let Some(path) = line.strip_prefix("--- ") {
            // plain unified diff without a git header
            let starts_new = current.as_ref().is_none_or(|b| !b.patch.is_empty());
            if starts_new {
                files.extend(current.take().map(FileBuilder::finish));
                current = Some(FileBuilder::new(strip_side(path, "a/")));
            }
            if path.trim() == "/dev/null" {
                if let Some(builder) = current.as_mut() {
                    builder.file.status = FileStatus::Added;
                }
            }
        } else if let Some(path) = line.strip_prefix("+++ ") {
            if let Some(builder) = current.as_mut() {
                if path.trim() == "/dev/null" {
                    builder.file.status = FileStatus::Removed;
                } else {
                    builder.file.filename = strip_side(path, "b/");
                }
            }
        } else if line.starts_with("new file mode") {
            if let Some(builder) = current.as_mut() {
                builder.file.status = FileStatus::Added;
            }
        } else if line.starts_with("deleted file mode") {
            if let Some(builder) = current.as_mut() {
                builder.file.status = FileStatus::Removed;
            }
        } else if let Some(path) = line.strip_prefix("rename to ") {
            if let Some(builder) = current.as_mut() {
                builder.file.status = FileStatus::Renamed;
                builder.file.filename = path.trim().to_string();
            }
        } else if line.starts_with("@@") {
            if let Some(builder) = current.as_mut() {
                if let Some((old, new)) = hunk_lengths(line) {
                    old_left = old;
                    new_left = new;
                }
                builder.patch.push(line.to_string());
            }
        }
    }
    files.extend(current.take().map(FileBuilder::finish));

    let additions = files.iter().map(|f| f.additions).sum();
    let deletions = files.iter().map(|f| f.deletions).sum();
    ParsedDiff {
        content: text.to_string(),
        files,
        additions,
        deletions,
    }
}

/// `a/src/x.rs b/src/x.rs` -> `src/x.rs`
fn git_header_path(rest: &str) -> String {
    match rest.rsplit_once(" b/") {
        Some((_, path)) => path.trim().to_string(),
        None => rest
            .split_whitespace()
            .last()
            .map(|p| strip_side(p, "b/"))
            .unwrap_or_default(),
    }
}

fn strip_side(path: &str, prefix: &str) -> String {
    // drop a trailing timestamp ("--- a/x\t2024-01-01 ...")
    let path = path.split('\t').next().unwrap_or(path).trim();
    path.strip_prefix(prefix).unwrap_or(path).to_string()
}

/// `@@ -1,3 +1,4 @@` -> `(3, 4)`; a missing count means 1.
fn hunk_lengths(line: &str) -> Option<(usize, usize)> {
    let mut parts = line.split_whitespace();
    parts.next()?;
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;
    Some((range_length(old), range_length(new)))
}

fn range_length(range: &str) -> usize {
    range
        .split_once(',')
        .map_or(1, |(_, len)| len.parse().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIT_DIFF: &str = "\
diff --git a/src/auth.ts b/src/auth.ts
index 83db48f..bf269f4 100644
--- a/src/auth.ts
+++ b/src/auth.ts
@@ -1,4 +1,5 @@
 import { hash } from './hash';
-export function login(user) {
+export function login(user, password) {
+  validate(password);
   return hash(user);
 }
diff --git a/docs/README.md b/docs/README.md
new file mode 100644
--- /dev/null
+++ b/docs/README.md
@@ -0,0 +1,2 @@
+# Title
+--- not a header
diff --git a/old.py b/old.py
deleted file mode 100644
--- a/old.py
+++ /dev/null
@@ -1,3 +0,0 @@
-def gone():
-    pass
-
";

    #[test]
    fn test_parse_git_diff() {
        let diff = parse_unified_diff(GIT_DIFF);
        assert_eq!(diff.files.len(), 3);

        let auth = &diff.files[0];
        assert_eq!(auth.filename, "src/auth.ts");
        assert_eq!(auth.status, FileStatus::Modified);
        assert_eq!(auth.additions, 2);
        assert_eq!(auth.deletions, 1);
        assert!(auth.patch.as_deref().unwrap().starts_with("@@ -1,4 +1,5 @@"));

        let readme = &diff.files[1];
        assert_eq!(readme.filename, "docs/README.md");
        assert_eq!(readme.status, FileStatus::Added);
        assert_eq!(readme.additions, 2);

        let old = &diff.files[2];
        assert_eq!(old.filename, "old.py");
        assert_eq!(old.status, FileStatus::Removed);
        assert_eq!(old.deletions, 3);

        assert_eq!(diff.additions, 4);
        assert_eq!(diff.deletions, 4);
        assert_eq!(diff.content, GIT_DIFF);
    }

    #[test]
    fn test_plain_unified_diff_without_git_header() {
        let text = "\
--- a/one.rs\t2024-01-01 00:00:00
+++ b/one.rs\t2024-01-02 00:00:00
@@ -1 +1 @@
-a
+b
--- a/two.rs
+++ b/two.rs
@@ -1,2 +1,3 @@
 x
+y
 z
";
        let diff = parse_unified_diff(text);
        let names: Vec<_> = diff.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["one.rs", "two.rs"]);
        assert_eq!(diff.files[0].additions, 1);
        assert_eq!(diff.files[0].deletions, 1);
        assert_eq!(diff.files[1].additions, 1);
    }

    #[test]
    fn test_rename() {
        let text = "\
diff --git a/a.rs b/b.rs
similarity index 100%
rename from a.rs
rename to b.rs
";
        let diff = parse_unified_diff(text);
        assert_eq!(diff.files[0].filename, "b.rs");
        assert_eq!(diff.files[0].status, FileStatus::Renamed);
        assert!(diff.files[0].patch.is_none());
    }

    #[test]
    fn test_significant_changes() {
        let diff = parse_unified_diff(GIT_DIFF).significant_changes();
        let names: Vec<_> = diff.files.iter().map(|f| f.filename.as_str()).collect();
        // README is docs, the others have 3 changed lines each
        assert_eq!(names, vec!["src/auth.ts", "old.py"]);
        assert_eq!(diff.additions, 4);
    }

    #[test]
    fn test_added_lines() {
        let diff = parse_unified_diff(GIT_DIFF);
        let added: Vec<_> = diff.added_lines().collect();
        assert_eq!(added[0], "export function login(user, password) {");
        assert!(added.contains(&"--- not a header"));
    }

    #[test]
    fn test_empty_input() {
        let diff = parse_unified_diff("");
        assert!(diff.files.is_empty());
        assert_eq!(diff.additions, 0);
    }

    #[test]
    fn test_hunk_lengths() {
        assert_eq!(hunk_lengths("@@ -1,3 +1,4 @@ fn x()"), Some((3, 4)));
        assert_eq!(hunk_lengths("@@ -1 +1 @@"), Some((1, 1)));
        assert_eq!(hunk_lengths("@@ bogus"), None);
    }
}
