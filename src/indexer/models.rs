//! Normalized per-file extraction records.
//!
//! Every extractor, whatever the grammar, yields this shape. Records are
//! produced fresh per extraction pass and are not mutated afterwards.
use serde::{Deserialize, Serialize};

/// One parsed source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Root-relative path with `/` separators. Unique within one run.
    pub file_path: String,
    /// Language tag (`typescript`, `python`, ...).
    pub language: String,
    pub functions: Vec<FunctionRecord>,
    pub imports: Vec<ImportRecord>,
}

/// A function definition. `name` is only unique within its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub name: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub code: String,
    /// Raw call names referenced in the body, deduplicated.
    pub calls: Vec<String>,
}

/// An import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Module path as written. Paths starting with `.` are relative to the
    /// importing file; everything else is an external dependency.
    pub module: String,
    /// Named imports.
    pub symbols: Vec<String>,
    pub is_default: bool,
    /// Local binding of a default/namespace import, when the parser saw one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
}

impl ImportRecord {
    pub fn is_relative(&self) -> bool {
        self.module.starts_with('.')
    }

    /// Name a default import is expected to be called by.
    ///
    /// Uses the parsed binding when present, otherwise the module basename
    /// without extension (`./utils/login.js` -> `login`).
    pub fn inferred_local_name(&self) -> Option<&str> {
        if !self.is_default {
            return None;
        }
        if let Some(name) = self.local_name.as_deref() {
            return Some(name);
        }
        let base = self
            .module
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.module);
        let stem = match base.rfind('.') {
            Some(idx) if idx > 0 => &base[..idx],
            _ => base,
        };
        if stem.is_empty() || stem.chars().all(|c| c == '.') {
            None
        } else {
            Some(stem)
        }
    }

    /// Whether this import brings `name` into scope.
    pub fn provides(&self, name: &str) -> bool {
        self.symbols.iter().any(|s| s == name) || self.inferred_local_name() == Some(name)
    }
}

impl SourceFile {
    pub fn defines(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name == name)
    }
}
