//! Search backend abstraction
//!
//! The extraction loop only talks to these traits, so it runs the same way
//! against the tantivy dictionary index and against scripted test doubles.

use crate::indexer::IndexerResult;
use crate::query::{ComposedQuery, QueryField};

/// A dictionary entry retrieved for a composed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Stored display text of the entry (the attribute string).
    pub text: String,
    pub attribute_code: String,
    pub node_id: Option<String>,
    /// Boosted engine score
    pub score: f32,
    /// Document-side terms that satisfied the query: words, or bigram keys
    /// joined with [`crate::text::BIGRAM_JOINER`].
    pub matched_terms: Vec<String>,
}

impl Hit {
    pub fn new(text: impl Into<String>, attribute_code: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            attribute_code: attribute_code.into(),
            node_id: None,
            score,
            matched_terms: Vec::new(),
        }
    }

    pub fn with_matched_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matched_terms = terms.into_iter().map(Into::into).collect();
        self
    }
}

/// A read handle on the dictionary, held for one search iteration.
///
/// Resources behind the session are released when it is dropped.
pub trait SearchSession {
    /// Up to `limit` hits, best first.
    fn search(&self, query: &ComposedQuery, limit: usize) -> IndexerResult<Vec<Hit>>;

    /// Number of documents containing `term` in `field`.
    fn doc_frequency(&self, field: QueryField, term: &str) -> IndexerResult<u64>;

    /// Number of documents in the dictionary.
    fn doc_count(&self) -> u64;
}

/// Shared, read-only dictionary that hands out search sessions.
pub trait SearchBackend: Send + Sync {
    type Session<'a>: SearchSession
    where
        Self: 'a;

    fn session(&self) -> IndexerResult<Self::Session<'_>>;
}
