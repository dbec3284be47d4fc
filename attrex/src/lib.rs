//! attrex - iterative fuzzy attribute extraction
//!
//! Recovers canonical dictionary phrases (brands, varietals, regions) from
//! noisy free text. A tantivy dictionary index is queried with a weighted
//! exact/fuzzy/bigram query, hits are reranked by how completely they were
//! matched, and the matched span is erased from the utterance before the next
//! round.

pub mod backend;
pub mod config;
pub mod eraser;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod query;
pub mod rerank;
pub mod source;
pub mod text;
pub mod utterance;

pub use backend::{Hit, SearchBackend, SearchSession};
pub use config::{ConfigError, ExtractorConfig, IndexConfig, QueryWeights, RerankConfig};
pub use error::{ExtractError, ExtractResult};
pub use extractor::{drop_contained, AttributeExtractor};
pub use indexer::{DictionaryIndex, IndexerError, IndexerResult};
pub use source::{DictionaryEntry, DictionarySource, SourceError};
