use std::path::{Path, PathBuf};
use std::time::Duration;

use pl_retrieval::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Service configuration. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory holding `documents.sqlite`, `tantivy/`, `vectors.usearch`
    /// and `meta.json`.
    pub storage_root: PathBuf,
    pub embedding_dim: usize,
    pub default_k: usize,
    pub max_k: usize,
    /// Upper bound on `k` for method comparisons.
    pub max_compare_k: usize,
    pub overfetch_factor: usize,
    pub rerank_pool_size: usize,
    pub rrf_k: f64,
    pub search_timeout_ms: u64,
    pub rerank_timeout_ms: u64,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            storage_root: PathBuf::from("data"),
            embedding_dim: pl_storage::DEFAULT_VECTOR_DIMENSION,
            default_k: 3,
            max_k: 20,
            max_compare_k: 10,
            overfetch_factor: engine.overfetch_factor,
            rerank_pool_size: engine.rerank_pool_size,
            rrf_k: engine.rrf_k,
            search_timeout_ms: engine.search_timeout.as_millis() as u64,
            rerank_timeout_ms: engine.rerank_timeout.as_millis() as u64,
            log_format: LogFormat::Plain,
        }
    }
}

impl ServiceConfig {
    /// Load from a JSON file and validate.
    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ServiceError::Config {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ServiceError> {
        let config: Self = serde_json::from_str(raw).map_err(|e| ServiceError::Config {
            reason: format!("invalid config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        let fail = |reason: &str| {
            Err(ServiceError::Config {
                reason: reason.to_string(),
            })
        };
        if self.embedding_dim == 0 {
            return fail("embedding_dim must be positive");
        }
        if self.max_k == 0 || self.default_k == 0 || self.default_k > self.max_k {
            return fail("default_k must be within 1..=max_k");
        }
        if self.max_compare_k == 0 {
            return fail("max_compare_k must be positive");
        }
        if self.overfetch_factor == 0 {
            return fail("overfetch_factor must be positive");
        }
        if !self.rrf_k.is_finite() || self.rrf_k < 0.0 {
            return fail("rrf_k must be finite and non-negative");
        }
        if self.search_timeout_ms == 0 || self.rerank_timeout_ms == 0 {
            return fail("timeouts must be positive");
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            overfetch_factor: self.overfetch_factor,
            rerank_pool_size: self.rerank_pool_size,
            rrf_k: self.rrf_k,
            search_timeout: Duration::from_millis(self.search_timeout_ms),
            rerank_timeout: Duration::from_millis(self.rerank_timeout_ms),
        }
    }
}
