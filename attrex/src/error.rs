use crate::config::ConfigError;
use crate::indexer::IndexerError;
use thiserror::Error;

/// Error type for attribute extraction
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Index error: {0}")]
    Index(#[from] IndexerError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// None of the matched terms of the chosen attribute could be located in
    /// the remaining utterance. The index tokenization and the utterance state
    /// disagree.
    #[error("Matched terms {terms:?} of {attribute:?} not found in {remaining:?}")]
    UnlocatedSpan {
        attribute: String,
        terms: Vec<String>,
        remaining: String,
    },
}

pub type ExtractResult<T> = Result<T, ExtractError>;
