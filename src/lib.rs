//! # reviewrag: code intelligence for automated review
//!
//! Indexes a repository into call-graph-enriched function chunks, retrieves
//! the chunks relevant to a change through hybrid (semantic + keyword)
//! search, and fits the change plus its context into a model token budget.
//!
//! ## Architecture
//!
//! - **[`indexer`]**: Tree-sitter extraction, call graph, chunk enrichment, indexing pipeline
//! - **[`embedder`]**: Embedding trait and a deterministic feature-hashing embedder
//! - **[`db`]**: SQLite + sqlite-vec + FTS5 store behind both indexes
//! - **[`retrieval`]**: Index service traits, Reciprocal Rank Fusion, `HybridRetriever`
//! - **[`budget`]**: Token estimation, budget allocation, line-aware truncation
//! - **[`review`]**: Unified diff parsing, change-size limits, prompt assembly
//! - **[`config`]**: Configuration loading and validation

pub mod budget;
pub mod config;
pub mod db;
pub mod embedder;
pub mod indexer;
pub mod retrieval;
pub mod review;
