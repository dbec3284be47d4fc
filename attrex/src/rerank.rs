//! Trust-score reranking of search hits.
//!
//! The engine score reflects query boosts, not how completely a hit was
//! matched. Each hit keeps its boosted score, minus a TF×IDF penalty for every
//! distinct word of its own text that no matched term covers:
//!
//! `trust = score × bonus − Σ tf(w) × idf(w)` over unmatched words `w`, where
//! `tf(w) = count(w) / len(tokens)` within the hit text and
//! `idf(w) = ln(doc_count / (doc_freq(w) + 1)) + 1`.
//!
//! Leaving "latour" unmatched therefore costs more than leaving a common word
//! unmatched, and a fully covered hit ranks on its boosted score alone.

use crate::backend::{Hit, SearchSession};
use crate::config::RerankConfig;
use crate::indexer::IndexerResult;
use crate::query::QueryField;
use crate::text;
use std::collections::{HashMap, HashSet};

/// A hit with its recomputed trust score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub hit: Hit,
    pub trust: f64,
    /// Distinct words of the hit text not covered by a matched term, in text order.
    pub unmatched: Vec<String>,
}

/// Self-normalized frequency of each token within one token list.
pub fn term_frequencies<S: AsRef<str>>(tokens: &[S]) -> HashMap<&str, f64> {
    let mut counts: HashMap<&str, f64> = HashMap::new();
    if tokens.is_empty() {
        return counts;
    }
    for token in tokens {
        *counts.entry(token.as_ref()).or_default() += 1.0;
    }
    let len = tokens.len() as f64;
    for freq in counts.values_mut() {
        *freq /= len;
    }
    counts
}

/// `ln(doc_count / (doc_freq + 1)) + 1`
pub fn inverse_document_frequency(doc_count: u64, doc_freq: u64) -> f64 {
    (doc_count.max(1) as f64 / (doc_freq + 1) as f64).ln() + 1.0
}

#[derive(Debug, Clone, Default)]
pub struct Reranker {
    config: RerankConfig,
}

impl Reranker {
    pub fn new(config: RerankConfig) -> Self {
        Self { config }
    }

    /// Rescore `hits` and sort them by trust, best first. Equal trust keeps
    /// the incoming order.
    pub fn rerank<S: SearchSession + ?Sized>(
        &self,
        hits: Vec<Hit>,
        session: &S,
    ) -> IndexerResult<Vec<ScoredCandidate>> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        let doc_count = session.doc_count();
        let mut idf_cache: HashMap<String, f64> = HashMap::new();

        let mut scored = Vec::with_capacity(hits.len());
        for hit in hits {
            let tokens = text::tokenize(&hit.text);
            let tf = term_frequencies(&tokens);
            let covered: HashSet<&str> = hit
                .matched_terms
                .iter()
                .flat_map(|term| text::split_term(term))
                .collect();

            let mut unmatched: Vec<String> = Vec::new();
            let mut penalty = 0.0;
            for token in &tokens {
                if covered.contains(token.as_str()) || unmatched.contains(token) {
                    continue;
                }
                let idf = match idf_cache.get(token) {
                    Some(idf) => *idf,
                    None => {
                        let df = session.doc_frequency(QueryField::TextValue, token)?;
                        let idf = inverse_document_frequency(doc_count, df);
                        idf_cache.insert(token.clone(), idf);
                        idf
                    }
                };
                penalty += tf.get(token.as_str()).copied().unwrap_or(0.0) * idf;
                unmatched.push(token.clone());
            }

            let bonus = self.config.bonus_for(&hit.attribute_code);
            let trust = hit.score as f64 * bonus - penalty;
            tracing::trace!(text = %hit.text, score = hit.score, trust, ?unmatched, "rescored");
            scored.push(ScoredCandidate { hit, trust, unmatched });
        }

        scored.sort_by(|a, b| b.trust.total_cmp(&a.trust));
        Ok(scored)
    }
}
