//! Query composition: turns the remaining utterance tokens into one weighted,
//! multi-clause query.
//!
//! Clauses are OR-ed at the top level:
//! - exact conjunction on `text_value` (full coverage tie-break)
//! - exact disjunction on `text_value` (coordination scaled)
//! - fuzzy disjunction on `text_value`, tokens of 4+ chars only
//! - fuzzy disjunction of adjacent-pair keys on `word_bigrams` (2+ tokens)
//! - exact disjunction on `specific_text`, which only entries outside the
//!   dominant category carry
//!
//! Clauses whose operand list is empty are never emitted.

use crate::config::QueryWeights;
use crate::text;
use std::collections::HashSet;
use std::fmt;

/// Index fields a query term can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryField {
    TextValue,
    WordBigrams,
    SpecificText,
}

impl QueryField {
    pub fn name(self) -> &'static str {
        match self {
            QueryField::TextValue => "text_value",
            QueryField::WordBigrams => "word_bigrams",
            QueryField::SpecificText => "specific_text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermMatch {
    Exact,
    /// Within `distance` edits, sharing the first `prefix_len` characters.
    Fuzzy { distance: u8, prefix_len: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryTerm {
    pub field: QueryField,
    pub text: String,
    pub matching: TermMatch,
}

impl QueryTerm {
    fn exact(field: QueryField, text: &str) -> Self {
        Self { field, text: text.to_string(), matching: TermMatch::Exact }
    }

    fn fuzzy(field: QueryField, text: &str, distance: u8, prefix_len: usize) -> Self {
        Self {
            field,
            text: text.to_string(),
            matching: TermMatch::Fuzzy { distance, prefix_len },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Combinator {
    /// Every operand must match.
    All,
    /// Any operand may match. With a coordination scale `s` the clause score is
    /// multiplied by `(1 - s) + s * matched / total`.
    Any { coordination: Option<f32> },
}

impl Combinator {
    /// Multiplier for a clause where `matched` of `total` operands hit the document.
    pub fn factor(self, matched: usize, total: usize) -> f32 {
        if matched == 0 || total == 0 {
            return 0.0;
        }
        match self {
            Combinator::All => {
                if matched == total {
                    1.0
                } else {
                    0.0
                }
            }
            Combinator::Any { coordination: None } => 1.0,
            Combinator::Any { coordination: Some(scale) } => {
                (1.0 - scale) + scale * matched as f32 / total as f32
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    ExactAll,
    ExactAny,
    FuzzyAny,
    BigramAny,
    SpecificAny,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub kind: ClauseKind,
    pub combinator: Combinator,
    pub boost: f32,
    pub terms: Vec<QueryTerm>,
}

/// Immutable composite query handed to the search backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedQuery {
    clauses: Vec<Clause>,
}

impl ComposedQuery {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn clause(&self, kind: ClauseKind) -> Option<&Clause> {
        self.clauses.iter().find(|c| c.kind == kind)
    }

    pub fn terms(&self) -> impl Iterator<Item = &QueryTerm> {
        self.clauses.iter().flat_map(|c| c.terms.iter())
    }
}

impl fmt::Display for ComposedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            let joiner = match clause.combinator {
                Combinator::All => " AND ",
                Combinator::Any { .. } => " OR ",
            };
            f.write_str("(")?;
            for (j, term) in clause.terms.iter().enumerate() {
                if j > 0 {
                    f.write_str(joiner)?;
                }
                write!(f, "{}:{}", term.field.name(), term.text)?;
                if let TermMatch::Fuzzy { distance, .. } = term.matching {
                    write!(f, "~{distance}")?;
                }
            }
            write!(f, ")^{}", clause.boost)?;
        }
        Ok(())
    }
}

/// Builds [`ComposedQuery`] values from utterance tokens.
#[derive(Debug, Clone, Default)]
pub struct QueryComposer {
    weights: QueryWeights,
}

impl QueryComposer {
    pub fn new(weights: QueryWeights) -> Self {
        Self { weights }
    }

    /// Compose a query over the remaining tokens. `None` when no token is left.
    pub fn compose<S: AsRef<str>>(&self, tokens: &[S]) -> Option<ComposedQuery> {
        let tokens: Vec<&str> = tokens
            .iter()
            .map(|t| t.as_ref())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return None;
        }
        let unique = dedup(tokens.iter().copied());
        let w = &self.weights;
        let any = Combinator::Any { coordination: w.coordination };

        let mut clauses = Vec::with_capacity(5);
        let mut push = |kind, combinator, boost, terms: Vec<QueryTerm>| {
            if !terms.is_empty() {
                clauses.push(Clause { kind, combinator, boost, terms });
            }
        };

        let exact: Vec<QueryTerm> = unique
            .iter()
            .map(|t| QueryTerm::exact(QueryField::TextValue, t))
            .collect();
        push(ClauseKind::ExactAll, Combinator::All, w.conjunction_boost, exact.clone());
        push(ClauseKind::ExactAny, any, w.disjunction_boost, exact);

        let fuzzy = unique
            .iter()
            .filter_map(|t| {
                let len = t.chars().count();
                if len < w.min_fuzzy_token_len {
                    return None;
                }
                let distance = text::max_edit_distance(len).min(text::MAX_AUTOMATON_DISTANCE);
                (distance > 0).then(|| {
                    QueryTerm::fuzzy(QueryField::TextValue, t, distance, w.fuzzy_prefix_len)
                })
            })
            .collect();
        push(ClauseKind::FuzzyAny, any, w.fuzzy_boost, fuzzy);

        if tokens.len() >= 2 {
            let keys = text::bigram_keys(&tokens);
            let bigrams = dedup(keys.iter().map(String::as_str))
                .into_iter()
                .map(|key| {
                    let distance = text::max_bigram_distance(key.chars().count())
                        .min(text::MAX_AUTOMATON_DISTANCE);
                    QueryTerm::fuzzy(QueryField::WordBigrams, key, distance, w.fuzzy_prefix_len)
                })
                .collect();
            push(ClauseKind::BigramAny, any, w.bigram_boost, bigrams);
        }

        let specific = unique
            .iter()
            .map(|t| QueryTerm::exact(QueryField::SpecificText, t))
            .collect();
        push(ClauseKind::SpecificAny, any, w.specific_boost, specific);

        Some(ComposedQuery { clauses })
    }
}

fn dedup<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(*item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer() -> QueryComposer {
        QueryComposer::default()
    }

    fn texts(clause: &Clause) -> Vec<&str> {
        clause.terms.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_no_tokens_no_query() {
        let empty: [&str; 0] = [];
        assert!(composer().compose(&empty).is_none());
        assert!(composer().compose(&[""]).is_none());
    }

    #[test]
    fn test_single_token_omits_bigram_clause() {
        let query = composer().compose(&["merlot"]).unwrap();
        assert!(query.clause(ClauseKind::BigramAny).is_none());
        assert!(query.clause(ClauseKind::ExactAll).is_some());
        assert!(query.clause(ClauseKind::ExactAny).is_some());
        assert!(query.clause(ClauseKind::FuzzyAny).is_some());
        assert!(query.clause(ClauseKind::SpecificAny).is_some());
    }

    #[test]
    fn test_short_tokens_excluded_from_fuzzy() {
        let query = composer().compose(&["red", "chateau", "lator"]).unwrap();
        let fuzzy = query.clause(ClauseKind::FuzzyAny).unwrap();
        assert_eq!(texts(fuzzy), vec!["chateau", "lator"]);

        let exact = query.clause(ClauseKind::ExactAny).unwrap();
        assert_eq!(texts(exact), vec!["red", "chateau", "lator"]);
    }

    #[test]
    fn test_fuzzy_clause_omitted_when_all_tokens_short() {
        let query = composer().compose(&["how", "are", "you"]).unwrap();
        assert!(query.clause(ClauseKind::FuzzyAny).is_none());
        assert_eq!(query.clauses().len(), 4);
    }

    #[test]
    fn test_fuzzy_distance_scales_with_length() {
        let query = composer().compose(&["lator", "caubernet"]).unwrap();
        let fuzzy = query.clause(ClauseKind::FuzzyAny).unwrap();
        let distances: Vec<TermMatch> = fuzzy.terms.iter().map(|t| t.matching).collect();
        assert_eq!(
            distances,
            vec![
                TermMatch::Fuzzy { distance: 1, prefix_len: 2 },
                TermMatch::Fuzzy { distance: 2, prefix_len: 2 },
            ]
        );
    }

    #[test]
    fn test_bigram_keys_target_bigram_field() {
        let query = composer().compose(&["red", "chateau", "lator"]).unwrap();
        let bigrams = query.clause(ClauseKind::BigramAny).unwrap();
        assert_eq!(texts(bigrams), vec!["red_chateau", "chateau_lator"]);
        assert!(bigrams.terms.iter().all(|t| t.field == QueryField::WordBigrams));
        assert_eq!(bigrams.boost, 0.3);
    }

    #[test]
    fn test_duplicate_tokens_are_deduplicated_per_clause() {
        let query = composer().compose(&["chateau", "latour", "chateau"]).unwrap();
        let all = query.clause(ClauseKind::ExactAll).unwrap();
        assert_eq!(texts(all), vec!["chateau", "latour"]);
        let bigrams = query.clause(ClauseKind::BigramAny).unwrap();
        assert_eq!(texts(bigrams), vec!["chateau_latour", "latour_chateau"]);
    }

    #[test]
    fn test_conjunction_boost_is_not_below_disjunction() {
        let query = composer().compose(&["opus", "one"]).unwrap();
        let all = query.clause(ClauseKind::ExactAll).unwrap();
        let any = query.clause(ClauseKind::ExactAny).unwrap();
        let fuzzy = query.clause(ClauseKind::FuzzyAny).unwrap();
        assert!(any.boost <= all.boost);
        assert!(fuzzy.boost < any.boost);
    }

    #[test]
    fn test_coordination_factor() {
        let any = Combinator::Any { coordination: Some(0.9) };
        assert!((any.factor(1, 3) - 0.4).abs() < 1e-6);
        assert_eq!(any.factor(3, 3), 1.0);
        assert_eq!(any.factor(0, 3), 0.0);
        assert_eq!(Combinator::Any { coordination: None }.factor(1, 4), 1.0);
        assert_eq!(Combinator::All.factor(1, 2), 0.0);
        assert_eq!(Combinator::All.factor(2, 2), 1.0);
    }

    #[test]
    fn test_display_renders_clauses() {
        let query = composer().compose(&["merlot"]).unwrap();
        let rendered = query.to_string();
        assert!(rendered.starts_with("(text_value:merlot)^0.45"));
        assert!(rendered.contains("text_value:merlot~1"));
    }
}
