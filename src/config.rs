/// Configuration module for reviewrag.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::budget::TokenLimits;
use crate::review::ReviewLimits;

pub const DEFAULT_CONFIG_PATH: &str = "reviewrag.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./.reviewrag/index.db".to_string()
}

fn default_exclude_dirs() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "target",
        "dist",
        "build",
        "vendor",
        "__pycache__",
        ".venv",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_top_k() -> usize {
    10
}

fn default_max_query_terms() -> usize {
    64
}

fn default_dimensions() -> usize {
    384
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory names skipped while walking a repository.
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub review: ReviewLimits,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub vector_k: usize,

    #[serde(default = "default_top_k")]
    pub keyword_k: usize,

    /// Upper bound on OR-ed terms in a keyword query.
    #[serde(default = "default_max_query_terms")]
    pub max_query_terms: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct BudgetConfig {
    #[serde(flatten)]
    pub limits: TokenLimits,

    /// HuggingFace `tokenizer.json`; the character estimate is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            exclude_dirs: default_exclude_dirs(),
            retrieval: RetrievalConfig::default(),
            budget: BudgetConfig::default(),
            review: ReviewLimits::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_k: default_top_k(),
            keyword_k: default_top_k(),
            max_query_terms: default_max_query_terms(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_PATH`].
    /// If the file does not exist, returns a default config and generates a
    /// template for the default path only.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.db_path.is_empty(), "db_path must not be empty");
        anyhow::ensure!(
            self.retrieval.vector_k > 0,
            "retrieval.vector_k must be positive"
        );
        anyhow::ensure!(
            self.retrieval.keyword_k > 0,
            "retrieval.keyword_k must be positive"
        );
        anyhow::ensure!(
            self.retrieval.max_query_terms > 0,
            "retrieval.max_query_terms must be positive"
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        self.budget
            .limits
            .validate()
            .context("invalid budget section")?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
