/// End-to-end integration tests for the reviewrag pipeline.
///
/// Tests the complete flow:
///   Repository → Indexer → HybridRetriever → BudgetAllocator → Prompt
use std::fs;
use std::path::Path;
use std::sync::Arc;

use reviewrag::budget::{BudgetAllocator, TokenLimits};
use reviewrag::db::Db;
use reviewrag::embedder::{Embedder, HashingEmbedder};
use reviewrag::indexer::{CodeChunk, Indexer, TreeSitterExtractor};
use reviewrag::retrieval::hybrid::render;
use reviewrag::retrieval::{
    HybridRetriever, IndexError, SqliteKeywordIndex, SqliteVectorIndex, Source, VectorHit,
    VectorIndex,
};
use reviewrag::review::{build_user_prompt, check_limits, parse_unified_diff, retrieval_query};
use tempfile::{TempDir, tempdir};
use tokio::sync::Mutex as TokioMutex;

const DIMS: usize = 64;

const CHANGE: &str = "\
diff --git a/src/auth.ts b/src/auth.ts
--- a/src/auth.ts
+++ b/src/auth.ts
@@ -3,3 +3,4 @@ import { verifySignature } from './crypto';
 export function validateToken(token) {
-  return verifySignature(token);
+  const ok = verifySignature(token);
+  return ok && token.length < 4096;
 }
";

fn write_repo(root: &Path) {
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("app")).unwrap();

    fs::write(
        root.join("src/auth.ts"),
        "import { verifySignature } from './crypto';\n\
         \n\
         export function validateToken(token) {\n\
         \x20 return verifySignature(token);\n\
         }\n\
         \n\
         export function login(user, token) {\n\
         \x20 return validateToken(token);\n\
         }\n",
    )
    .unwrap();
    fs::write(
        root.join("src/crypto.ts"),
        "export function verifySignature(token) {\n  return token.length > 0;\n}\n",
    )
    .unwrap();
    fs::write(
        root.join("app/utils.py"),
        "def slugify(text):\n    return text.lower()\n",
    )
    .unwrap();
    fs::write(
        root.join("app/main.py"),
        "from .utils import slugify\n\ndef handler(title):\n    return slugify(title)\n",
    )
    .unwrap();
}

struct Fixture {
    _dir: TempDir,
    db: Arc<TokioMutex<Db>>,
    vector: Arc<SqliteVectorIndex>,
    keyword: Arc<SqliteKeywordIndex>,
}

async fn indexed_repo() -> Fixture {
    let dir = tempdir().unwrap();
    let repo = dir.path().join("repo");
    write_repo(&repo);

    let db = Db::open(dir.path().join("index.db"), DIMS).unwrap();
    let db = Arc::new(TokioMutex::new(db));
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIMS).unwrap());
    let vector = Arc::new(SqliteVectorIndex::new(db.clone(), embedder));
    let keyword = Arc::new(SqliteKeywordIndex::new(db.clone(), 64));

    let report = Indexer::new(
        db.clone(),
        Arc::new(TreeSitterExtractor::new().unwrap()),
        vector.clone(),
        keyword.clone(),
    )
    .run(&repo)
    .await
    .unwrap();

    assert_eq!(report.files, 4, "Should extract 4 source files");
    assert_eq!(report.functions, 5, "Should find 5 functions");
    assert_eq!(report.edges, 3, "Should resolve 3 call edges");
    assert_eq!(report.vector_written, Some(5));
    assert_eq!(report.keyword_written, Some(5));

    Fixture {
        _dir: dir,
        db,
        vector,
        keyword,
    }
}

/// Full pipeline: index → retrieve → budget → prompt
#[tokio::test]
async fn test_full_pipeline() {
    let fx = indexed_repo().await;
    let retriever = HybridRetriever::new(fx.vector.clone(), fx.keyword.clone());

    // 1. Retrieval fuses both lists; hits found by both rank above the rest
    let results = retriever.retrieve_chunks("validateToken", 10, 10).await;
    assert_eq!(results.len(), 5, "Every chunk is a vector candidate");
    let top: Vec<&str> = results[..2]
        .iter()
        .filter_map(|r| r.function_name.as_deref())
        .collect();
    assert!(top.contains(&"validateToken"), "got: {top:?}");
    assert!(top.contains(&"login"), "got: {top:?}");
    assert!(results[..2].iter().all(|r| r.source == Source::Both));
    assert!(results[2..].iter().all(|r| r.source == Source::Vector));

    // 2. Rendered context carries headers
    let context = render(&results);
    assert!(context.contains("File: src/auth.ts | Function: validateToken | Lines: 3-5 | Source: both"));

    // 3. Budget and prompt
    let diff = parse_unified_diff(CHANGE);
    assert!(check_limits(&diff, &Default::default()).passed);

    let allocator = BudgetAllocator::new(TokenLimits::default()).unwrap();
    let inputs = allocator.allocate(&diff.content, &context);
    assert_eq!(inputs.change, CHANGE);
    assert_eq!(inputs.context, context);
    assert_eq!(inputs.change_tokens_removed, 0);
    assert_eq!(inputs.context_tokens_removed, 0);

    let prompt = build_user_prompt(&diff, "Bound token length", &inputs);
    assert!(prompt.contains("**Repository Context**"));
    assert!(prompt.contains("Function: validateToken"));
    assert!(prompt.contains("- 2 additions, 1 deletions"));
}

/// A query derived from a diff reaches the functions the change touches
#[tokio::test]
async fn test_query_derived_from_diff() {
    let fx = indexed_repo().await;
    let retriever = HybridRetriever::new(fx.vector.clone(), fx.keyword.clone());

    let diff = parse_unified_diff(CHANGE);
    let query = retrieval_query(&diff, 500);
    assert!(query.starts_with("src/auth.ts\n"));

    let results = retriever.retrieve_chunks(&query, 10, 10).await;
    assert!(
        results
            .iter()
            .any(|r| r.function_name.as_deref() == Some("verifySignature")
                && r.source == Source::Both)
    );
}

struct OfflineVector;

impl VectorIndex for OfflineVector {
    fn upsert(&self, _chunks: &[CodeChunk]) -> Result<usize, IndexError> {
        Err(IndexError::Unavailable("offline".to_string()))
    }

    fn query(&self, _text: &str, _k: usize) -> Result<Vec<VectorHit>, IndexError> {
        Err(IndexError::Unavailable("offline".to_string()))
    }
}

/// Vector outage degrades to keyword-only results
#[tokio::test]
async fn test_keyword_only_when_vector_offline() {
    let fx = indexed_repo().await;
    let retriever = HybridRetriever::new(Arc::new(OfflineVector), fx.keyword.clone());

    let results = retriever.retrieve_chunks("slugify", 10, 10).await;
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.source == Source::Keyword));
    assert_eq!(results[0].function_name.as_deref(), Some("slugify"));
}

/// Oversized context is cut with a marker while the change stays intact
#[tokio::test]
async fn test_context_truncated_under_tight_budget() {
    let fx = indexed_repo().await;
    let retriever = HybridRetriever::new(fx.vector.clone(), fx.keyword.clone());
    let context = retriever.retrieve("validateToken", 10, 10).await;

    let allocator = BudgetAllocator::new(TokenLimits {
        max_context_tokens: 20,
        ..TokenLimits::default()
    })
    .unwrap();
    let inputs = allocator.allocate(CHANGE, &context);
    assert_eq!(inputs.change, CHANGE);
    assert_eq!(inputs.allocation.allocated_context, 20);
    assert!(inputs.context_tokens_removed > 0);
    assert!(inputs.context.contains("[context truncated:"));

    let run = fx.db.lock().await.last_run().unwrap().unwrap();
    assert_eq!(run.chunks, 5);
}
