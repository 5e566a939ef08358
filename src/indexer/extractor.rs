use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};
use tree_sitter::{Node, Parser, Query, QueryCursor, StreamingIterator};

use super::languages::{ImportStyle, LanguageConfig};
use super::models::{FunctionRecord, ImportRecord, SourceFile};

/// Call names never resolved as edges.
const BUILTINS: &[&str] = &[
    "len", "make", "append", "delete", "print", "println", "panic", "recover", "range", "return",
    "break", "continue",
];

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {kind} query for {language}: {message}")]
    Query {
        language: &'static str,
        kind: &'static str,
        message: String,
    },
    #[error("failed to parse {0}")]
    Parse(String),
}

/// Produces normalized [`SourceFile`] records from raw source.
pub trait SymbolExtractor: Send + Sync {
    fn supports(&self, extension: &str) -> bool;

    /// `file_path` is the root-relative path recorded on every output record.
    fn extract(&self, file_path: &str, source: &[u8]) -> Result<SourceFile, ExtractError>;
}

struct CompiledLanguage {
    config: LanguageConfig,
    definitions: Query,
    calls: Query,
    imports: Query,
}

/// Grammar-dispatching extractor backed by tree-sitter.
pub struct TreeSitterExtractor {
    languages: Vec<CompiledLanguage>,
    by_extension: HashMap<&'static str, usize>,
}

impl TreeSitterExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let mut languages = Vec::new();
        let mut by_extension = HashMap::new();

        for config in LanguageConfig::get_all() {
            let compile = |kind: &'static str, source: &str| {
                Query::new(&config.language, source).map_err(|e| ExtractError::Query {
                    language: config.name,
                    kind,
                    message: e.to_string(),
                })
            };
            let definitions = compile("definition", config.definition_query)?;
            let calls = compile("call", config.call_query)?;
            let imports = compile("import", config.import_query)?;

            for ext in config.extensions {
                by_extension.insert(*ext, languages.len());
            }
            languages.push(CompiledLanguage {
                config,
                definitions,
                calls,
                imports,
            });
        }

        Ok(Self {
            languages,
            by_extension,
        })
    }

    fn language_for(&self, ext: &str) -> Option<&CompiledLanguage> {
        self.by_extension.get(ext).map(|idx| &self.languages[*idx])
    }
}

impl SymbolExtractor for TreeSitterExtractor {
    fn supports(&self, extension: &str) -> bool {
        self.by_extension.contains_key(extension)
    }

    fn extract(&self, file_path: &str, source: &[u8]) -> Result<SourceFile, ExtractError> {
        let ext = extension_of(file_path);
        let lang = self
            .language_for(ext)
            .ok_or_else(|| ExtractError::Unsupported(ext.to_string()))?;

        let mut parser = Parser::new();
        parser
            .set_language(&lang.config.language)
            .map_err(|e| ExtractError::Parse(format!("{file_path}: {e}")))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ExtractError::Parse(file_path.to_string()))?;
        let root = tree.root_node();

        Ok(SourceFile {
            file_path: file_path.to_string(),
            language: lang.config.name.to_string(),
            functions: lang.extract_functions(root, source, file_path),
            imports: lang.extract_imports(root, source),
        })
    }
}

impl CompiledLanguage {
    fn extract_functions(&self, root: Node, source: &[u8], file_path: &str) -> Vec<FunctionRecord> {
        let mut functions = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.definitions, root, source);

        while let Some(m) = matches.next() {
            let mut name = None;
            let mut definition = None;
            for cap in m.captures {
                match self.definitions.capture_names()[cap.index as usize] {
                    "name" => name = cap.node.utf8_text(source).ok(),
                    "definition" => definition = Some(cap.node),
                    _ => {}
                }
            }
            let (Some(name), Some(node)) = (name, definition) else {
                continue;
            };

            // First definition of a name wins within a file.
            if !seen.insert(name.to_string()) {
                debug!(file = file_path, name, "Skipping duplicate definition");
                continue;
            }

            functions.push(FunctionRecord {
                name: name.to_string(),
                file_path: file_path.to_string(),
                start_line: node.start_position().row + 1,
                end_line: node.end_position().row + 1,
                code: node.utf8_text(source).unwrap_or_default().to_string(),
                calls: self.extract_calls(node, source),
            });
        }

        functions
    }

    fn extract_calls(&self, node: Node, source: &[u8]) -> Vec<String> {
        let mut calls = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.calls, node, source);

        while let Some(m) = matches.next() {
            for cap in m.captures {
                let Ok(name) = cap.node.utf8_text(source) else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() || BUILTINS.contains(&name) {
                    continue;
                }
                if seen.insert(name.to_string()) {
                    calls.push(name.to_string());
                }
            }
        }

        calls
    }

    fn extract_imports(&self, root: Node, source: &[u8]) -> Vec<ImportRecord> {
        let mut imports = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.imports, root, source);

        while let Some(m) = matches.next() {
            for cap in m.captures {
                let node = cap.node;
                match self.config.import_style {
                    ImportStyle::EcmaScript => imports.extend(ecmascript_import(node, source)),
                    ImportStyle::Python => imports.extend(python_imports(node, source)),
                    ImportStyle::Rust => imports.extend(rust_import(node, source)),
                    ImportStyle::Go => imports.extend(go_import(node, source)),
                }
            }
        }

        imports
    }
}

fn text(node: Node, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or_default().to_string()
}

fn unquote(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

/// `import a, { b, c as d } from './x'` and `import * as ns from './x'`.
fn ecmascript_import(node: Node, source: &[u8]) -> Option<ImportRecord> {
    let module = unquote(&text(node.child_by_field_name("source")?, source));
    let mut record = ImportRecord {
        module,
        symbols: Vec::new(),
        is_default: false,
        local_name: None,
    };

    let mut cursor = node.walk();
    for clause in node.named_children(&mut cursor) {
        if clause.kind() != "import_clause" {
            continue;
        }
        let mut clause_cursor = clause.walk();
        for part in clause.named_children(&mut clause_cursor) {
            match part.kind() {
                "identifier" => {
                    record.is_default = true;
                    record.local_name = Some(text(part, source));
                }
                "namespace_import" => {
                    record.is_default = true;
                    let mut ns_cursor = part.walk();
                    record.local_name = part
                        .named_children(&mut ns_cursor)
                        .find(|n| n.kind() == "identifier")
                        .map(|n| text(n, source));
                }
                "named_imports" => {
                    let mut spec_cursor = part.walk();
                    for spec in part.named_children(&mut spec_cursor) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        if let Some(name) = spec.child_by_field_name("name") {
                            record.symbols.push(text(name, source));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Some(record)
}

/// `import a.b as c` yields one record per module; `from .x import y`
/// yields one record with the relative path rewritten to slash form.
fn python_imports(node: Node, source: &[u8]) -> Vec<ImportRecord> {
    let mut cursor = node.walk();

    if node.kind() == "import_from_statement" {
        let Some(module) = node.child_by_field_name("module_name") else {
            return Vec::new();
        };
        let symbols = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|name| match name.kind() {
                "aliased_import" => name.child_by_field_name("name").map(|n| text(n, source)),
                "wildcard_import" => None,
                _ => Some(text(name, source)),
            })
            .collect();
        return vec![ImportRecord {
            module: python_module_path(&text(module, source)),
            symbols,
            is_default: false,
            local_name: None,
        }];
    }

    node.children_by_field_name("name", &mut cursor)
        .filter_map(|name| {
            let (module, alias) = match name.kind() {
                "aliased_import" => (
                    name.child_by_field_name("name")?,
                    name.child_by_field_name("alias").map(|a| text(a, source)),
                ),
                _ => (name, None),
            };
            let module = text(module, source);
            let local = alias.or_else(|| module.split('.').next().map(str::to_string));
            Some(ImportRecord {
                module,
                symbols: Vec::new(),
                is_default: true,
                local_name: local,
            })
        })
        .collect()
}

/// `.utils` -> `./utils`, `..pkg.mod` -> `../pkg/mod`; absolute names are kept.
fn python_module_path(raw: &str) -> String {
    let dots = raw.chars().take_while(|c| *c == '.').count();
    if dots == 0 {
        return raw.to_string();
    }
    let rest = raw[dots..].replace('.', "/");
    let prefix = if dots == 1 {
        "./".to_string()
    } else {
        "../".repeat(dots - 1)
    };
    if rest.is_empty() {
        prefix.trim_end_matches('/').to_string()
    } else {
        format!("{prefix}{rest}")
    }
}

fn rust_import(node: Node, source: &[u8]) -> Option<ImportRecord> {
    let argument = node.child_by_field_name("argument")?;
    let path = text(argument, source);
    let symbols = match argument.kind() {
        "scoped_identifier" | "identifier" => path
            .rsplit("::")
            .next()
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    Some(ImportRecord {
        module: path,
        symbols,
        is_default: false,
        local_name: None,
    })
}

fn go_import(node: Node, source: &[u8]) -> Option<ImportRecord> {
    let module = unquote(&text(node.child_by_field_name("path")?, source));
    let local_name = node
        .child_by_field_name("name")
        .map(|n| text(n, source))
        .or_else(|| module.rsplit('/').next().map(str::to_string));
    Some(ImportRecord {
        module,
        symbols: Vec::new(),
        is_default: true,
        local_name,
    })
}

fn extension_of(path: &str) -> &str {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
}

/// Walks `root`, extracting every supported file in parallel.
///
/// Files that fail to read or parse are logged and skipped. Output is sorted
/// by path so downstream graph building is deterministic.
pub fn extract_repository<E: SymbolExtractor + ?Sized>(
    extractor: &E,
    root: &Path,
    exclude_dirs: &[String],
) -> Result<Vec<SourceFile>, ExtractError> {
    if !root.is_dir() {
        return Err(ExtractError::Io {
            path: root.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let excluded: HashSet<String> = exclude_dirs.iter().cloned().collect();
    let mut builder = WalkBuilder::new(root);
    builder.hidden(false).filter_entry(move |entry| {
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        !(is_dir && excluded.contains(entry.file_name().to_string_lossy().as_ref()))
    });

    let paths: Vec<PathBuf> = builder
        .build()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extractor.supports(e))
        })
        .collect();

    info!(root = %root.display(), files = paths.len(), "Extracting source files");

    let mut files: Vec<SourceFile> = paths
        .par_iter()
        .filter_map(|path| {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            let result = fs::read(path)
                .map_err(|source| ExtractError::Io {
                    path: rel.clone(),
                    source,
                })
                .and_then(|bytes| extractor.extract(&rel, &bytes));
            match result {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(file = %rel, error = %e, "Skipping file");
                    None
                }
            }
        })
        .collect();

    files.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn extractor() -> TreeSitterExtractor {
        TreeSitterExtractor::new().unwrap()
    }

    #[test]
    fn test_typescript_functions_and_calls() {
        let code = r#"
import { validate } from './validate';
import config from '../config';

export function login(user: string) {
    const ok = validate(user);
    console.log(ok);
    return session.start(user);
}

const logout = (user: string) => {
    login(user);
};
"#;
        let file = extractor().extract("src/auth.ts", code.as_bytes()).unwrap();
        assert_eq!(file.language, "typescript");

        let names: Vec<_> = file.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["login", "logout"]);

        let login = &file.functions[0];
        assert_eq!(login.start_line, 5);
        assert_eq!(login.end_line, 9);
        assert!(login.code.starts_with("function login"));
        assert!(login.calls.contains(&"validate".to_string()));
        assert!(login.calls.contains(&"log".to_string()));
        assert!(login.calls.contains(&"start".to_string()));

        assert_eq!(file.functions[1].calls, vec!["login".to_string()]);

        assert_eq!(file.imports.len(), 2);
        assert_eq!(file.imports[0].module, "./validate");
        assert_eq!(file.imports[0].symbols, vec!["validate".to_string()]);
        assert!(!file.imports[0].is_default);
        assert_eq!(file.imports[1].module, "../config");
        assert!(file.imports[1].is_default);
        assert_eq!(file.imports[1].local_name.as_deref(), Some("config"));
    }

    #[test]
    fn test_javascript_namespace_import() {
        let code = "import * as api from './api';\nfunction run() { api.fetchAll(); }\n";
        let file = extractor().extract("app.js", code.as_bytes()).unwrap();
        assert_eq!(file.imports[0].local_name.as_deref(), Some("api"));
        assert!(file.imports[0].is_default);
        assert_eq!(file.functions[0].calls, vec!["fetchAll".to_string()]);
    }

    #[test]
    fn test_python_relative_imports() {
        let code = r#"
from .utils import helper, other as alias
from ..pkg.mod import thing
import os.path

def main():
    helper()
    print("done")
"#;
        let file = extractor().extract("app/main.py", code.as_bytes()).unwrap();
        assert_eq!(file.imports[0].module, "./utils");
        assert_eq!(
            file.imports[0].symbols,
            vec!["helper".to_string(), "other".to_string()]
        );
        assert_eq!(file.imports[1].module, "../pkg/mod");
        assert_eq!(file.imports[2].module, "os.path");
        assert_eq!(file.imports[2].local_name.as_deref(), Some("os"));

        // builtins are filtered
        assert_eq!(file.functions[0].calls, vec!["helper".to_string()]);
    }

    #[test]
    fn test_python_module_path() {
        assert_eq!(python_module_path(".utils"), "./utils");
        assert_eq!(python_module_path("..pkg.mod"), "../pkg/mod");
        assert_eq!(python_module_path("."), ".");
        assert_eq!(python_module_path("os.path"), "os.path");
    }

    #[test]
    fn test_rust_and_go() {
        let rust = r#"
use crate::store::save;

fn run() {
    let x = helper();
    save(x);
    Store::open();
}

fn helper() -> i32 { 1 }
"#;
        let file = extractor().extract("src/lib.rs", rust.as_bytes()).unwrap();
        let names: Vec<_> = file.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["run", "helper"]);
        assert_eq!(file.functions[0].calls, vec!["helper", "save", "open"]);
        assert_eq!(file.imports[0].symbols, vec!["save".to_string()]);

        let go = r#"
package main

import (
    "fmt"
    str "strings"
)

func main() {
    fmt.Println(str.ToUpper("x"))
    items := make([]int, 0)
    _ = len(items)
}
"#;
        let file = extractor().extract("main.go", go.as_bytes()).unwrap();
        assert_eq!(file.functions[0].name, "main");
        assert_eq!(file.functions[0].calls, vec!["Println", "ToUpper"]);
        assert_eq!(file.imports[0].local_name.as_deref(), Some("fmt"));
        assert_eq!(file.imports[1].local_name.as_deref(), Some("str"));
    }

    #[test]
    fn test_duplicate_names_first_wins() {
        let code = r#"
class A:
    def run(self):
        pass

class B:
    def run(self):
        go()
"#;
        let file = extractor().extract("dup.py", code.as_bytes()).unwrap();
        assert_eq!(file.functions.len(), 1);
        assert_eq!(file.functions[0].start_line, 3);
        assert!(file.functions[0].calls.is_empty());
    }

    #[test]
    fn test_unsupported_extension() {
        let err = extractor().extract("README.md", b"# hi").unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(ext) if ext == "md"));
    }

    #[test]
    fn test_extract_repository_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/util")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("src/z.ts"), "export function z() {}").unwrap();
        fs::write(root.join("src/util/a.py"), "def a():\n    pass\n").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "function hidden() {}").unwrap();
        fs::write(root.join("notes.md"), "# notes").unwrap();

        let files =
            extract_repository(&extractor(), root, &["node_modules".to_string()]).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.file_path.as_str()).collect();
        assert_eq!(paths, vec!["src/util/a.py", "src/z.ts"]);
    }

    #[test]
    fn test_extract_repository_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(extract_repository(&extractor(), &missing, &[]).is_err());
    }
}
