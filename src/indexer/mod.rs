//! Extraction, call-graph construction, chunk enrichment and the indexing
//! pipeline that writes both retrieval indexes.
pub mod call_graph;
pub mod chunker;
pub mod core;
pub mod extractor;
pub mod languages;
pub mod models;

pub use call_graph::{CallGraph, CallGraphBuilder, CallGraphNode, GraphError};
pub use chunker::{ChunkEnricher, ChunkMetadata, CodeChunk, chunk_id};
pub use self::core::{IndexReport, Indexer};
pub use extractor::{ExtractError, SymbolExtractor, TreeSitterExtractor, extract_repository};
pub use models::{FunctionRecord, ImportRecord, SourceFile};
