//! Extraction loop
//!
//! Each iteration composes a query from the words still unconsumed, takes the
//! best reranked hit as the next attribute and erases the span its matched
//! terms came from. The loop stops when the utterance is exhausted, nothing is
//! found, the best hit was already extracted, or an iteration erases nothing.
//! Attributes contained in a longer extracted attribute are dropped at the end.

use crate::backend::{SearchBackend, SearchSession};
use crate::config::ExtractorConfig;
use crate::eraser::SpanEraser;
use crate::error::{ExtractError, ExtractResult};
use crate::query::QueryComposer;
use crate::rerank::{Reranker, ScoredCandidate};
use crate::text;
use crate::utterance::Utterance;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Exhausted,
    NoHits,
    AlreadyExtracted,
    NoProgress,
    IterationBudget,
}

enum LoopState {
    Searching,
    Extracted(ScoredCandidate),
    Done(StopReason),
}

/// Extracts known dictionary attributes from free text.
///
/// The backend is shared read-only; every call keeps its own utterance state,
/// so one extractor can serve concurrent callers.
pub struct AttributeExtractor<B> {
    backend: B,
    composer: QueryComposer,
    reranker: Reranker,
    eraser: SpanEraser,
    config: ExtractorConfig,
}

impl<B: SearchBackend> AttributeExtractor<B> {
    pub fn new(backend: B, config: ExtractorConfig) -> ExtractResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            composer: QueryComposer::new(config.query.clone()),
            reranker: Reranker::new(config.rerank.clone()),
            eraser: SpanEraser::new(config.similarity_threshold),
            config,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Attributes found in `utterance`, none of them a substring of another.
    ///
    /// Nonsense input yields an empty set; blank input never reaches the index.
    pub fn extract_attributes(&self, utterance: &str) -> ExtractResult<BTreeSet<String>> {
        let mut utterance = Utterance::new(utterance);
        let budget = utterance.word_count();
        let mut extracted: Vec<String> = Vec::new();
        let mut iterations = 0usize;

        let mut state = if utterance.is_exhausted() {
            LoopState::Done(StopReason::Exhausted)
        } else {
            LoopState::Searching
        };

        loop {
            state = match state {
                LoopState::Searching if iterations >= budget => {
                    LoopState::Done(StopReason::IterationBudget)
                }
                LoopState::Searching => {
                    iterations += 1;
                    match self.best_candidate(&utterance)? {
                        None => LoopState::Done(StopReason::NoHits),
                        Some(best) if extracted.iter().any(|a| *a == best.hit.text) => {
                            LoopState::Done(StopReason::AlreadyExtracted)
                        }
                        Some(best) => LoopState::Extracted(best),
                    }
                }
                LoopState::Extracted(candidate) => {
                    let erased = self.erase_matched(&mut utterance, &candidate);
                    tracing::debug!(
                        iteration = iterations,
                        attribute = %candidate.hit.text,
                        trust = candidate.trust,
                        erased,
                        remaining = %utterance,
                        "extracted attribute"
                    );

                    if erased == 0 {
                        if self.config.strict_spans {
                            return Err(ExtractError::UnlocatedSpan {
                                attribute: candidate.hit.text,
                                terms: candidate.hit.matched_terms,
                                remaining: utterance.to_string(),
                            });
                        }
                        tracing::warn!(
                            attribute = %candidate.hit.text,
                            terms = ?candidate.hit.matched_terms,
                            remaining = %utterance,
                            "matched terms not found in utterance, stopping"
                        );
                        extracted.push(candidate.hit.text);
                        LoopState::Done(StopReason::NoProgress)
                    } else {
                        extracted.push(candidate.hit.text);
                        if utterance.is_exhausted() {
                            LoopState::Done(StopReason::Exhausted)
                        } else {
                            LoopState::Searching
                        }
                    }
                }
                LoopState::Done(reason) => {
                    tracing::debug!(?reason, iterations, ?extracted, "extraction finished");
                    break;
                }
            };
        }

        Ok(drop_contained(extracted))
    }

    /// Run independent utterances in parallel. Results keep the input order.
    pub fn extract_batch<S>(&self, utterances: &[S]) -> Vec<ExtractResult<BTreeSet<String>>>
    where
        S: AsRef<str> + Sync,
    {
        utterances
            .par_iter()
            .map(|utterance| self.extract_attributes(utterance.as_ref()))
            .collect()
    }

    /// Query, rerank and return the top candidate. The session is released on return.
    fn best_candidate(&self, utterance: &Utterance) -> ExtractResult<Option<ScoredCandidate>> {
        let remaining = utterance.remaining();
        let Some(query) = self.composer.compose(&remaining) else {
            return Ok(None);
        };
        tracing::trace!(%query, "composed query");

        let session = self.backend.session()?;
        let hits = session.search(&query, self.config.result_limit)?;
        let ranked = self.reranker.rerank(hits, &session)?;
        Ok(ranked.into_iter().next())
    }

    /// Erase the spans of a candidate's matched terms. Phrases go first; a
    /// single word already covered by an erased phrase is skipped.
    /// Returns the number of slots consumed.
    fn erase_matched(&self, utterance: &mut Utterance, candidate: &ScoredCandidate) -> usize {
        let (phrases, words): (Vec<&String>, Vec<&String>) = candidate
            .hit
            .matched_terms
            .iter()
            .partition(|term| text::split_term(term).len() > 1);

        let mut covered: HashSet<&str> = HashSet::new();
        let mut erased = 0;
        for term in phrases {
            let erasure = self.eraser.erase(utterance, term);
            tracing::trace!(term = %term, ?erasure, "erase phrase");
            if erasure.is_erased() {
                erased += erasure.positions().len();
                covered.extend(text::split_term(term));
            }
        }
        for word in words {
            if covered.contains(word.as_str()) {
                continue;
            }
            let erasure = self.eraser.erase(utterance, word);
            tracing::trace!(term = %word, ?erasure, "erase word");
            erased += erasure.positions().len();
        }
        erased
    }
}

/// Keep only attributes that are not a substring of another extracted attribute.
pub fn drop_contained<I>(attributes: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
{
    let unique: BTreeSet<String> = attributes.into_iter().collect();
    unique
        .iter()
        .filter(|a| !unique.iter().any(|b| b != *a && b.contains(a.as_str())))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Hit;
    use crate::indexer::IndexerResult;
    use crate::query::{ComposedQuery, QueryField};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays one hit list per search call, then returns nothing.
    struct Scripted {
        responses: Mutex<Vec<Vec<Hit>>>,
        searches: AtomicUsize,
    }

    impl Scripted {
        fn new(responses: Vec<Vec<Hit>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                searches: AtomicUsize::new(0),
            }
        }

        /// Answers every search with the same hits.
        fn repeating(hits: Vec<Hit>) -> Self {
            Self::new(vec![hits; 16])
        }

        fn searches(&self) -> usize {
            self.searches.load(Ordering::SeqCst)
        }
    }

    struct ScriptedSession<'a> {
        backend: &'a Scripted,
    }

    impl SearchSession for ScriptedSession<'_> {
        fn search(&self, _: &ComposedQuery, limit: usize) -> IndexerResult<Vec<Hit>> {
            self.backend.searches.fetch_add(1, Ordering::SeqCst);
            let mut hits = self.backend.responses.lock().unwrap().pop().unwrap_or_default();
            hits.truncate(limit);
            Ok(hits)
        }

        fn doc_frequency(&self, _: QueryField, _: &str) -> IndexerResult<u64> {
            Ok(1)
        }

        fn doc_count(&self) -> u64 {
            10
        }
    }

    impl SearchBackend for Scripted {
        type Session<'a> = ScriptedSession<'a>;

        fn session(&self) -> IndexerResult<ScriptedSession<'_>> {
            Ok(ScriptedSession { backend: self })
        }
    }

    fn hit(text: &str, terms: &[&str]) -> Hit {
        Hit::new(text, "varietal", 1.0).with_matched_terms(terms.iter().copied())
    }

    fn extractor(backend: Scripted) -> AttributeExtractor<Scripted> {
        AttributeExtractor::new(backend, ExtractorConfig::default()).unwrap()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_blank_input_never_searches() {
        let extractor = extractor(Scripted::repeating(vec![hit("merlot", &["merlot"])]));
        assert!(extractor.extract_attributes("").unwrap().is_empty());
        assert!(extractor.extract_attributes("   ").unwrap().is_empty());
        assert!(extractor.extract_attributes(" ,. ").unwrap().is_empty());
        assert_eq!(extractor.backend().searches(), 0);
    }

    #[test]
    fn test_no_hits_ends_after_one_search() {
        let extractor = extractor(Scripted::new(Vec::new()));
        assert!(extractor.extract_attributes("how are you").unwrap().is_empty());
        assert_eq!(extractor.backend().searches(), 1);
    }

    #[test]
    fn test_already_extracted_hit_ends_loop() {
        let extractor = extractor(Scripted::repeating(vec![hit("merlot", &["merlot"])]));
        let found = extractor.extract_attributes("merlot merlot").unwrap();
        assert_eq!(found, set(&["merlot"]));
        assert_eq!(extractor.backend().searches(), 2);
    }

    #[test]
    fn test_iterations_bounded_by_word_count() {
        let extractor = extractor(Scripted::new(vec![
            vec![hit("alpha", &["alpha"])],
            vec![hit("beta", &["beta"])],
            vec![hit("gamma", &["gamma"])],
            vec![hit("delta", &["delta"])],
        ]));
        let found = extractor.extract_attributes("alpha beta gamma").unwrap();
        assert_eq!(found, set(&["alpha", "beta", "gamma"]));
        assert_eq!(extractor.backend().searches(), 3);
    }

    #[test]
    fn test_unlocated_span_stops_with_attribute_kept() {
        let extractor = extractor(Scripted::repeating(vec![hit("chateau latour", &["xyzzy"])]));
        let found = extractor.extract_attributes("hello world").unwrap();
        assert_eq!(found, set(&["chateau latour"]));
        assert_eq!(extractor.backend().searches(), 1);
    }

    #[test]
    fn test_unlocated_span_is_an_error_in_strict_mode() {
        let config = ExtractorConfig {
            strict_spans: true,
            ..ExtractorConfig::default()
        };
        let backend = Scripted::repeating(vec![hit("chateau latour", &["xyzzy"])]);
        let extractor = AttributeExtractor::new(backend, config).unwrap();
        match extractor.extract_attributes("hello world") {
            Err(ExtractError::UnlocatedSpan { attribute, terms, remaining }) => {
                assert_eq!(attribute, "chateau latour");
                assert_eq!(terms, vec!["xyzzy"]);
                assert_eq!(remaining, "hello world");
            }
            other => panic!("expected UnlocatedSpan, got {:?}", other),
        }
    }

    #[test]
    fn test_contained_attribute_is_dropped() {
        let extractor = extractor(Scripted::new(vec![
            vec![hit("chateau latour", &["chateau", "latour", "chateau_latour"])],
            vec![hit("chateau", &["chateau"])],
        ]));
        let found = extractor.extract_attributes("chateau latour chateau").unwrap();
        assert_eq!(found, set(&["chateau latour"]));
        assert_eq!(extractor.backend().searches(), 2);
    }

    #[test]
    fn test_phrase_erased_before_words() {
        let extractor = extractor(Scripted::new(Vec::new()));
        let mut utterance = Utterance::new("chateau latour chateau");
        let candidate = ScoredCandidate {
            hit: hit("chateau latour", &["chateau", "latour", "chateau_latour"]),
            trust: 1.0,
            unmatched: Vec::new(),
        };
        let erased = extractor.erase_matched(&mut utterance, &candidate);
        assert_eq!(erased, 2);
        assert_eq!(utterance.remaining(), vec!["chateau"]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ExtractorConfig {
            result_limit: 0,
            ..ExtractorConfig::default()
        };
        let result = AttributeExtractor::new(Scripted::new(Vec::new()), config);
        assert!(matches!(result, Err(ExtractError::Config(_))));
    }

    #[test]
    fn test_extract_batch_keeps_order() {
        let extractor = extractor(Scripted::repeating(vec![hit("merlot", &["merlot"])]));
        let results = extractor.extract_batch(&["merlot", "", "a merlot"]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &set(&["merlot"]));
        assert!(results[1].as_ref().unwrap().is_empty());
        assert_eq!(results[2].as_ref().unwrap(), &set(&["merlot"]));
    }

    #[test]
    fn test_drop_contained() {
        let raw = vec![
            "chateau latour".to_string(),
            "chateau".to_string(),
            "red".to_string(),
            "red".to_string(),
        ];
        assert_eq!(drop_contained(raw), set(&["chateau latour", "red"]));
        assert!(drop_contained(Vec::new()).is_empty());
        assert_eq!(drop_contained(vec!["opus one".to_string()]), set(&["opus one"]));
    }
}
