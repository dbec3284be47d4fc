//! Tuning knobs for extraction and index building.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Boosts and fuzzy parameters for the composed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryWeights {
    /// All tokens present. Rewards full coverage, used as a tie-break.
    pub conjunction_boost: f32,
    /// Any token present. Must not exceed the conjunction boost.
    pub disjunction_boost: f32,
    pub fuzzy_boost: f32,
    pub bigram_boost: f32,
    /// Any token present in an entry outside the dominant category.
    pub specific_boost: f32,
    /// Coordination scale for disjunctions, `None` disables it.
    pub coordination: Option<f32>,
    pub min_fuzzy_token_len: usize,
    pub fuzzy_prefix_len: usize,
}

impl Default for QueryWeights {
    fn default() -> Self {
        Self {
            conjunction_boost: 0.45,
            disjunction_boost: 0.45,
            fuzzy_boost: 0.1,
            bigram_boost: 0.3,
            specific_boost: 0.15,
            coordination: Some(0.9),
            min_fuzzy_token_len: crate::text::MIN_FUZZY_TOKEN_LEN,
            fuzzy_prefix_len: 2,
        }
    }
}

/// Trust-score adjustments applied by the reranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub base_bonus: f64,
    /// Per attribute code multiplier, replaces `base_bonus` for that category.
    pub category_bonus: HashMap<String, f64>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            base_bonus: 1.0,
            category_bonus: HashMap::new(),
        }
    }
}

impl RerankConfig {
    pub fn bonus_for(&self, attribute_code: &str) -> f64 {
        self.category_bonus
            .get(attribute_code)
            .copied()
            .unwrap_or(self.base_bonus)
    }
}

/// Configuration for [`crate::AttributeExtractor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Hits requested from the index per iteration.
    pub result_limit: usize,
    /// Minimum similarity (percent, exclusive) for fuzzy span removal.
    pub similarity_threshold: f64,
    /// Fail with `UnlocatedSpan` instead of stopping when nothing can be erased.
    pub strict_spans: bool,
    pub query: QueryWeights,
    pub rerank: RerankConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            result_limit: 16,
            similarity_threshold: 74.0,
            strict_spans: false,
            query: QueryWeights::default(),
            rerank: RerankConfig::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.result_limit == 0 {
            return Err(ConfigError::Invalid("result_limit must be greater than 0".into()));
        }
        if !(0.0..100.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "similarity_threshold must be in [0, 100)".into(),
            ));
        }
        let q = &self.query;
        let boosts = [
            q.conjunction_boost,
            q.disjunction_boost,
            q.fuzzy_boost,
            q.bigram_boost,
            q.specific_boost,
        ];
        if boosts.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err(ConfigError::Invalid("query boosts must be positive".into()));
        }
        if q.disjunction_boost > q.conjunction_boost {
            return Err(ConfigError::Invalid(
                "disjunction_boost cannot exceed conjunction_boost".into(),
            ));
        }
        if q.fuzzy_boost >= q.disjunction_boost {
            return Err(ConfigError::Invalid(
                "fuzzy_boost must be below disjunction_boost".into(),
            ));
        }
        if let Some(scale) = q.coordination {
            if !(scale > 0.0 && scale <= 1.0) {
                return Err(ConfigError::Invalid("coordination must be in (0, 1]".into()));
            }
        }
        if q.min_fuzzy_token_len == 0 {
            return Err(ConfigError::Invalid("min_fuzzy_token_len must be greater than 0".into()));
        }
        if !self.rerank.base_bonus.is_finite() {
            return Err(ConfigError::Invalid("base_bonus must be finite".into()));
        }
        Ok(())
    }
}

/// Settings used when an index has to be built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub writer_heap_bytes: usize,
    /// Category treated as dominant. Computed from the entries when unset.
    pub dominant_category: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            writer_heap_bytes: 50_000_000,
            dominant_category: None,
        }
    }
}
