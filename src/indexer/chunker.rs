use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use super::call_graph::{CallGraph, node_id, short_name};
use super::models::SourceFile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub function_name: String,
    pub call_count: usize,
    pub incoming_count: usize,
}

/// One retrievable function plus its graph-derived context header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    pub id: String,
    /// Raw function source.
    pub text: String,
    /// Header describing where the function lives and who it talks to.
    pub context: String,
    pub file_path: String,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
    pub metadata: ChunkMetadata,
}

impl CodeChunk {
    /// Text handed to the embedder: header first, then the code.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.context, self.text)
    }
}

/// Stable chunk identity derived from location, never from content.
///
/// Re-indexing unchanged `(file, name, start, end)` yields the same id, so
/// index writes overwrite instead of duplicating.
#[must_use]
pub fn chunk_id(file_path: &str, function_name: &str, start_line: usize, end_line: usize) -> String {
    let key = format!("{file_path}::{function_name}::{start_line}::{end_line}");
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Turns extraction records plus the call graph into [`CodeChunk`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkEnricher;

impl ChunkEnricher {
    /// One chunk per function, in record order.
    pub fn chunk(&self, files: &[SourceFile], graph: &CallGraph) -> Vec<CodeChunk> {
        let mut chunks = Vec::new();

        for file in files {
            for func in &file.functions {
                let node = graph.get(&node_id(&file.file_path, &func.name));

                let mut context = vec![
                    format!("File: {}", file.file_path),
                    format!("Language: {}", file.language),
                ];
                if let Some(node) = node {
                    if !node.called_by.is_empty() {
                        context.push(format!(
                            "This function is called by: {}",
                            join_short_names(node.called_by.iter())
                        ));
                    }
                    if !node.calls.is_empty() {
                        context.push(format!(
                            "This function calls: {}",
                            join_short_names(node.calls.iter())
                        ));
                    }
                }

                chunks.push(CodeChunk {
                    id: chunk_id(&file.file_path, &func.name, func.start_line, func.end_line),
                    text: func.code.clone(),
                    context: context.join("\n"),
                    file_path: file.file_path.clone(),
                    language: file.language.clone(),
                    start_line: func.start_line,
                    end_line: func.end_line,
                    metadata: ChunkMetadata {
                        function_name: func.name.clone(),
                        call_count: node.map_or(0, |n| n.calls.len()),
                        incoming_count: node.map_or(0, |n| n.called_by.len()),
                    },
                });
            }
        }

        info!(chunks = chunks.len(), "Generated chunks");
        chunks
    }
}

fn join_short_names<'a>(ids: impl Iterator<Item = &'a String>) -> String {
    ids.map(|id| short_name(id)).collect::<Vec<_>>().join(", ")
}
