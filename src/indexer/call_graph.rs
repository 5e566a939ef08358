//! Cross-file call graph construction.
//!
//! The graph is an arena keyed by `file_path::function_name`; edges are sets
//! of identities, so cycles (including self-recursion) need no special care.
//!
//! Building runs in two phases separated by a hard barrier: every function is
//! registered before any call is resolved, because a call may target a
//! definition in a file that comes later in iteration order. Resolution of
//! one file's calls is independent of every other file and runs on the rayon
//! pool; the resulting edges are applied in input order afterwards.
//!
//! Call resolution precedence:
//! 1. a function of that name in the same file;
//! 2. an import in the same file providing the name, whose relative module
//!    path resolves to a known file that defines it;
//! 3. the first *other* file, in lexicographic path order, defining a
//!    function with that exact name.
//!
//! Step 3 is a best-effort heuristic. When several files define the same
//! name and no import ties the caller to one of them, it links to the
//! lexicographically first, which may be the wrong one. Calls that match
//! nothing are dropped.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::models::{ImportRecord, SourceFile};

/// Extensions tried, in order, when resolving a relative module path.
pub const RESOLVE_EXTENSIONS: &[&str] = &[".ts", ".js", ".tsx", ".jsx", ".py"];

const ID_SEPARATOR: &str = "::";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate source file record: {0}")]
    DuplicateFile(String),

    #[error("duplicate call graph node: {0}")]
    DuplicateNode(String),
}

/// Identity of the function `name` defined in `file_path`.
#[must_use]
pub fn node_id(file_path: &str, name: &str) -> String {
    format!("{file_path}{ID_SEPARATOR}{name}")
}

/// Function-name portion of a node identity.
pub fn short_name(id: &str) -> &str {
    id.rsplit_once(ID_SEPARATOR).map_or(id, |(_, name)| name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallGraphNode {
    pub id: String,
    pub calls: BTreeSet<String>,
    pub called_by: BTreeSet<String>,
}

impl CallGraphNode {
    fn new(id: String) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn has_neighbors(&self) -> bool {
        !self.calls.is_empty() || !self.called_by.is_empty()
    }
}

/// Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CallGraph {
    nodes: BTreeMap<String, CallGraphNode>,
}

impl CallGraph {
    pub fn get(&self, id: &str) -> Option<&CallGraphNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CallGraphNode> {
        self.nodes.values()
    }

    /// All `(caller, callee)` pairs in identity order.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.nodes
            .values()
            .flat_map(|n| n.calls.iter().map(move |t| (n.id.as_str(), t.as_str())))
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.calls.len()).sum()
    }

    /// Insert `caller -> target` on both endpoints, or nothing at all.
    fn link(&mut self, caller: &str, target: &str) -> bool {
        if !self.nodes.contains_key(caller) || !self.nodes.contains_key(target) {
            return false;
        }
        let inserted = self
            .nodes
            .get_mut(caller)
            .is_some_and(|n| n.calls.insert(target.to_string()));
        if let Some(node) = self.nodes.get_mut(target) {
            node.called_by.insert(caller.to_string());
        }
        inserted
    }
}

/// Builds a [`CallGraph`] from per-file extraction records.
#[derive(Debug, Clone)]
pub struct CallGraphBuilder {
    extensions: Vec<String>,
}

impl Default for CallGraphBuilder {
    fn default() -> Self {
        Self {
            extensions: RESOLVE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl CallGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the extension list used for relative module resolution.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(&self, files: &[SourceFile]) -> Result<CallGraph, GraphError> {
        let files: Vec<&SourceFile> = files
            .iter()
            .filter(|f| {
                let ok = !f.file_path.trim().is_empty();
                if !ok {
                    warn!("Skipping source file record with empty path");
                }
                ok
            })
            .collect();

        let mut file_index: HashMap<String, &SourceFile> = HashMap::with_capacity(files.len());
        for file in &files {
            if file_index
                .insert(normalize_path(&file.file_path), file)
                .is_some()
            {
                return Err(GraphError::DuplicateFile(file.file_path.clone()));
            }
        }

        // Phase 1: registration.
        let mut graph = CallGraph::default();
        let mut definitions: HashMap<&str, Vec<&str>> = HashMap::new();
        for file in &files {
            for func in file.functions.iter().filter(|f| !f.name.is_empty()) {
                let id = node_id(&file.file_path, &func.name);
                if graph.nodes.contains_key(&id) {
                    return Err(GraphError::DuplicateNode(id));
                }
                graph.nodes.insert(id.clone(), CallGraphNode::new(id));
                definitions
                    .entry(func.name.as_str())
                    .or_default()
                    .push(file.file_path.as_str());
            }
        }
        for paths in definitions.values_mut() {
            paths.sort_unstable();
            paths.dedup();
        }

        // Phase 2: linking.
        let resolver = Resolver {
            file_index,
            definitions,
            extensions: &self.extensions,
        };
        let edges: Vec<(String, String)> = files
            .par_iter()
            .flat_map_iter(|file| resolver.resolve_file(file))
            .collect();

        let candidate_edges = edges.len();
        for (caller, target) in edges {
            graph.link(&caller, &target);
        }

        info!(
            files = files.len(),
            nodes = graph.len(),
            edges = graph.edge_count(),
            candidate_edges,
            "Built call graph"
        );

        Ok(graph)
    }
}

struct Resolver<'a> {
    file_index: HashMap<String, &'a SourceFile>,
    /// Function name -> defining file paths, sorted.
    definitions: HashMap<&'a str, Vec<&'a str>>,
    extensions: &'a [String],
}

impl Resolver<'_> {
    fn resolve_file(&self, file: &SourceFile) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        for func in file.functions.iter().filter(|f| !f.name.is_empty()) {
            let caller = node_id(&file.file_path, &func.name);
            for call in &func.calls {
                match self.resolve_call(call, file) {
                    Some(target) => edges.push((caller.clone(), target)),
                    None => debug!(caller = %caller, call = %call, "Unresolved call"),
                }
            }
        }
        edges
    }

    fn resolve_call(&self, call: &str, file: &SourceFile) -> Option<String> {
        if file.defines(call) {
            return Some(node_id(&file.file_path, call));
        }

        for import in file.imports.iter().filter(|i| i.provides(call)) {
            let Some(target) = self.resolve_module(&file.file_path, import) else {
                continue;
            };
            if target.defines(call) {
                return Some(node_id(&target.file_path, call));
            }
        }

        self.definitions
            .get(call)?
            .iter()
            .find(|path| **path != file.file_path)
            .map(|path| node_id(path, call))
    }

    /// Exact path, then each extension, then `/index` plus each extension.
    /// Non-relative (package) imports never resolve.
    fn resolve_module(&self, importer: &str, import: &ImportRecord) -> Option<&SourceFile> {
        if !import.is_relative() {
            return None;
        }
        let base = join_relative(importer, &import.module);

        if let Some(file) = self.file_index.get(&base) {
            return Some(file);
        }
        for ext in self.extensions {
            if let Some(file) = self.file_index.get(&format!("{base}{ext}")) {
                return Some(file);
            }
        }
        for ext in self.extensions {
            if let Some(file) = self.file_index.get(&format!("{base}/index{ext}")) {
                return Some(file);
            }
        }
        None
    }
}

/// Lexically normalize a `/`-separated path (drops `.` and empty segments,
/// folds `..`).
fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    push_segments(&mut parts, path, absolute);
    let joined = parts.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

/// Resolve `module` against the directory of `importer`.
fn join_relative(importer: &str, module: &str) -> String {
    let absolute = importer.starts_with('/');
    let dir = importer.rsplit_once('/').map_or("", |(dir, _)| dir);
    let mut parts: Vec<&str> = Vec::new();
    push_segments(&mut parts, dir, absolute);
    push_segments(&mut parts, module, absolute);
    let joined = parts.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

fn push_segments<'a>(parts: &mut Vec<&'a str>, path: &'a str, absolute: bool) {
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::models::{FunctionRecord, ImportRecord};

    fn func(file: &str, name: &str, calls: &[&str]) -> FunctionRecord {
        FunctionRecord {
            name: name.to_string(),
            file_path: file.to_string(),
            start_line: 1,
            end_line: 3,
            code: format!("function {name}() {{}}"),
            calls: calls.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn file(path: &str, functions: Vec<FunctionRecord>, imports: Vec<ImportRecord>) -> SourceFile {
        SourceFile {
            file_path: path.to_string(),
            language: "ts".to_string(),
            functions,
            imports,
        }
    }

    fn named(module: &str, symbols: &[&str]) -> ImportRecord {
        ImportRecord {
            module: module.to_string(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            is_default: false,
            local_name: None,
        }
    }

    fn default_import(module: &str) -> ImportRecord {
        ImportRecord {
            module: module.to_string(),
            symbols: Vec::new(),
            is_default: true,
            local_name: None,
        }
    }

    fn assert_symmetric(graph: &CallGraph) {
        for node in graph.nodes() {
            for target in &node.calls {
                assert!(
                    graph.get(target).unwrap().called_by.contains(&node.id),
                    "{} -> {target} missing reverse edge",
                    node.id
                );
            }
            for caller in &node.called_by {
                assert!(
                    graph.get(caller).unwrap().calls.contains(&node.id),
                    "{caller} -> {} missing forward edge",
                    node.id
                );
            }
        }
    }

    #[test]
    fn test_node_id_and_short_name() {
        let id = node_id("src/a.ts", "run");
        assert_eq!(id, "src/a.ts::run");
        assert_eq!(short_name(&id), "run");
        assert_eq!(short_name("plain"), "plain");
    }

    #[test]
    fn test_named_import_resolution_with_extension() {
        let files = vec![
            file(
                "src/app.ts",
                vec![func("src/app.ts", "main", &["login"])],
                vec![named("./auth", &["login"])],
            ),
            file("src/auth.ts", vec![func("src/auth.ts", "login", &[])], vec![]),
        ];
        let graph = CallGraphBuilder::new().build(&files).unwrap();

        let main = graph.get("src/app.ts::main").unwrap();
        assert!(main.calls.contains("src/auth.ts::login"));
        let login = graph.get("src/auth.ts::login").unwrap();
        assert!(login.called_by.contains("src/app.ts::main"));
        assert_symmetric(&graph);
    }

    #[test]
    fn test_default_import_resolves_index_file() {
        let files = vec![
            file(
                "src/pages/home.js",
                vec![func("src/pages/home.js", "render", &["format"])],
                vec![default_import("../format")],
            ),
            file(
                "src/format/index.js",
                vec![func("src/format/index.js", "format", &[])],
                vec![],
            ),
        ];
        let graph = CallGraphBuilder::new().build(&files).unwrap();
        assert_eq!(
            graph.edges(),
            vec![("src/pages/home.js::render", "src/format/index.js::format")]
        );
    }

    #[test]
    fn test_local_definition_wins_over_import() {
        let files = vec![
            file(
                "src/a.ts",
                vec![func("src/a.ts", "f", &["g"]), func("src/a.ts", "g", &[])],
                vec![named("./b", &["g"])],
            ),
            file("src/b.ts", vec![func("src/b.ts", "g", &[])], vec![]),
        ];
        let graph = CallGraphBuilder::new().build(&files).unwrap();

        let f = graph.get("src/a.ts::f").unwrap();
        assert_eq!(f.calls.iter().collect::<Vec<_>>(), vec!["src/a.ts::g"]);
        assert!(graph.get("src/b.ts::g").unwrap().called_by.is_empty());
    }

    #[test]
    fn test_import_beats_global_fallback() {
        // Without the import, fallback would pick "src/a/util.ts" (sorts first).
        let files = vec![
            file(
                "src/main.ts",
                vec![func("src/main.ts", "main", &["helper"])],
                vec![named("./z/util", &["helper"])],
            ),
            file("src/a/util.ts", vec![func("src/a/util.ts", "helper", &[])], vec![]),
            file("src/z/util.ts", vec![func("src/z/util.ts", "helper", &[])], vec![]),
        ];
        let graph = CallGraphBuilder::new().build(&files).unwrap();
        assert_eq!(
            graph.edges(),
            vec![("src/main.ts::main", "src/z/util.ts::helper")]
        );
    }

    #[test]
    fn test_global_fallback_is_lexicographic() {
        // Heuristic: with no import tying main to either definition, the
        // first path in lexicographic order wins even if it is not the
        // intended target.
        let files = vec![
            file("src/z.ts", vec![func("src/z.ts", "shared", &[])], vec![]),
            file("src/main.ts", vec![func("src/main.ts", "main", &["shared"])], vec![]),
            file("src/b.ts", vec![func("src/b.ts", "shared", &[])], vec![]),
        ];
        let graph = CallGraphBuilder::new().build(&files).unwrap();
        assert_eq!(graph.edges(), vec![("src/main.ts::main", "src/b.ts::shared")]);
    }

    #[test]
    fn test_definition_in_later_file_is_resolved() {
        let files = vec![
            file("a.py", vec![func("a.py", "first", &["second"])], vec![]),
            file("b.py", vec![func("b.py", "second", &[])], vec![]),
        ];
        let graph = CallGraphBuilder::new().build(&files).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_external_imports_never_resolve() {
        // "lodash" is a package; the call falls through to the global scan,
        // which finds nothing, so the call is dropped.
        let files = vec![file(
            "src/a.ts",
            vec![func("src/a.ts", "run", &["map", "console"])],
            vec![named("lodash", &["map"])],
        )];
        let graph = CallGraphBuilder::new().build(&files).unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_external_import_falls_back_to_global() {
        let files = vec![
            file(
                "src/a.ts",
                vec![func("src/a.ts", "run", &["map"])],
                vec![named("lodash", &["map"])],
            ),
            file("src/map.ts", vec![func("src/map.ts", "map", &[])], vec![]),
        ];
        let graph = CallGraphBuilder::new().build(&files).unwrap();
        assert_eq!(graph.edges(), vec![("src/a.ts::run", "src/map.ts::map")]);
    }

    #[test]
    fn test_bare_module_is_not_a_sibling_path() {
        // "lib" would join to src/lib.ts, but only relative modules are paths.
        let files = vec![
            file("a/helper.ts", vec![func("a/helper.ts", "helper", &[])], vec![]),
            file("src/lib.ts", vec![func("src/lib.ts", "helper", &[])], vec![]),
            file(
                "src/main.ts",
                vec![func("src/main.ts", "run", &["helper"])],
                vec![named("lib", &["helper"])],
            ),
        ];
        let graph = CallGraphBuilder::new().build(&files).unwrap();
        let run = graph.get("src/main.ts::run").unwrap();
        assert!(run.calls.contains("a/helper.ts::helper"));
        assert!(!run.calls.contains("src/lib.ts::helper"));
    }

    #[test]
    fn test_duplicate_calls_add_one_edge() {
        let files = vec![file(
            "a.ts",
            vec![func("a.ts", "f", &["g", "g"]), func("a.ts", "g", &["f"])],
            vec![],
        )];
        let graph = CallGraphBuilder::new().build(&files).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.get("a.ts::g").unwrap().called_by.len(), 1);
        assert_symmetric(&graph);
    }

    #[test]
    fn test_self_recursion() {
        let files = vec![file("a.ts", vec![func("a.ts", "fact", &["fact"])], vec![])];
        let graph = CallGraphBuilder::new().build(&files).unwrap();
        let node = graph.get("a.ts::fact").unwrap();
        assert!(node.calls.contains("a.ts::fact"));
        assert!(node.called_by.contains("a.ts::fact"));
    }

    #[test]
    fn test_deterministic_across_runs() {
        let make = |order: &[usize]| {
            let all = vec![
                file("c.ts", vec![func("c.ts", "x", &["y", "z"])], vec![]),
                file("a.ts", vec![func("a.ts", "y", &["z"])], vec![]),
                file("b.ts", vec![func("b.ts", "z", &[]), func("b.ts", "y", &[])], vec![]),
            ];
            order.iter().map(|i| all[*i].clone()).collect::<Vec<_>>()
        };
        let g1 = CallGraphBuilder::new().build(&make(&[0, 1, 2])).unwrap();
        let g2 = CallGraphBuilder::new().build(&make(&[2, 1, 0])).unwrap();
        let g3 = CallGraphBuilder::new().build(&make(&[0, 1, 2])).unwrap();
        assert_eq!(g1, g2);
        assert_eq!(g1, g3);
    }

    #[test]
    fn test_duplicate_node_is_error() {
        let files = vec![file(
            "a.ts",
            vec![func("a.ts", "f", &[]), func("a.ts", "f", &[])],
            vec![],
        )];
        assert_eq!(
            CallGraphBuilder::new().build(&files),
            Err(GraphError::DuplicateNode("a.ts::f".to_string()))
        );
    }

    #[test]
    fn test_duplicate_file_is_error() {
        let files = vec![
            file("src/a.ts", vec![], vec![]),
            file("src/./a.ts", vec![], vec![]),
        ];
        assert!(matches!(
            CallGraphBuilder::new().build(&files),
            Err(GraphError::DuplicateFile(_))
        ));
    }

    #[test]
    fn test_malformed_records_are_excluded() {
        let files = vec![
            file("", vec![func("", "ghost", &[])], vec![]),
            file("a.ts", vec![func("a.ts", "", &[]), func("a.ts", "f", &["ghost"])], vec![]),
        ];
        let graph = CallGraphBuilder::new().build(&files).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_custom_extensions() {
        let files = vec![
            file(
                "a.mjs",
                vec![func("a.mjs", "f", &["g"])],
                vec![named("./b", &["g"])],
            ),
            file("b.mjs", vec![func("b.mjs", "g", &[])], vec![]),
            file("c.mjs", vec![func("c.mjs", "other", &[])], vec![]),
        ];
        let graph = CallGraphBuilder::new()
            .with_extensions([".mjs"])
            .build(&files)
            .unwrap();
        assert_eq!(graph.edges(), vec![("a.mjs::f", "b.mjs::g")]);
    }

    #[test]
    fn test_join_relative() {
        assert_eq!(join_relative("src/app/main.ts", "./util"), "src/app/util");
        assert_eq!(join_relative("src/app/main.ts", "../lib/x"), "src/lib/x");
        assert_eq!(join_relative("main.ts", "./util"), "util");
        assert_eq!(join_relative("main.ts", "../up"), "../up");
        assert_eq!(join_relative("/repo/src/a.ts", "../../b"), "/b");
        assert_eq!(normalize_path("./src//a.ts"), "src/a.ts");
    }
}
