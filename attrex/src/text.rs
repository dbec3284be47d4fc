//! Text normalization shared by the index, the utterance state and the reranker.
//!
//! Every component tokenizes through the same tantivy analyzer so token counts
//! and matched terms stay comparable across indexing and extraction.

use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer, TokenStream};

/// Name under which the analyzer is registered on the dictionary index.
pub const DICTIONARY_TOKENIZER: &str = "dictionary";

/// Joins the two words of a bigram key. The analyzer never emits it inside a token.
pub const BIGRAM_JOINER: char = '_';

/// Tokens shorter than this never take part in fuzzy matching.
pub const MIN_FUZZY_TOKEN_LEN: usize = 4;

/// Largest edit distance tantivy builds a Levenshtein automaton for.
pub const MAX_AUTOMATON_DISTANCE: u8 = 2;

/// Lowercased runs of alphanumeric characters.
pub(crate) fn build_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .build()
}

/// Tokenize text exactly as the dictionary index does.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut analyzer = build_analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while let Some(token) = stream.next() {
        tokens.push(token.text.clone());
    }
    tokens
}

/// Join a word pair into a bigram key (`"chateau_latour"`).
pub fn bigram_key(first: &str, second: &str) -> String {
    let mut key = String::with_capacity(first.len() + second.len() + 1);
    key.push_str(first);
    key.push(BIGRAM_JOINER);
    key.push_str(second);
    key
}

/// Bigram keys for every adjacent token pair, in order.
pub fn bigram_keys<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens
        .windows(2)
        .map(|pair| bigram_key(pair[0].as_ref(), pair[1].as_ref()))
        .collect()
}

/// Split a matched term into its words: bigram keys on the joiner, phrases on whitespace.
pub fn split_term(term: &str) -> Vec<&str> {
    term.split(|c: char| c == BIGRAM_JOINER || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Fuzzy budget for a single token, graduated by length.
pub fn max_edit_distance(token_len: usize) -> u8 {
    if token_len < MIN_FUZZY_TOKEN_LEN {
        0
    } else if token_len <= 6 {
        1
    } else {
        2
    }
}

/// Fuzzy budget for a bigram key (two words plus the joiner).
pub fn max_bigram_distance(key_len: usize) -> u8 {
    if key_len <= 9 {
        1
    } else {
        MAX_AUTOMATON_DISTANCE
    }
}

/// Optimal string alignment distance, or `None` when it exceeds `max_dist`.
/// Insertions, deletions, substitutions and adjacent transpositions each cost 1.
pub fn edit_distance_within(a: &str, b: &str, max_dist: u8) -> Option<u8> {
    if a.chars().count().abs_diff(b.chars().count()) > max_dist as usize {
        return None;
    }
    let distance = strsim::osa_distance(a, b);
    (distance <= max_dist as usize).then_some(distance as u8)
}

/// Whether `candidate` is an acceptable fuzzy expansion of `query`: both share
/// the first `prefix_len` characters and lie within `max_dist` edits.
pub fn fuzzy_match(query: &str, candidate: &str, max_dist: u8, prefix_len: usize) -> bool {
    let shared = query
        .chars()
        .zip(candidate.chars())
        .take_while(|(q, c)| q == c)
        .count();
    let required = prefix_len
        .min(query.chars().count())
        .min(candidate.chars().count());
    shared >= required && edit_distance_within(query, candidate, max_dist).is_some()
}

/// String similarity in percent (0 = unrelated, 100 = identical).
///
/// Edits are counted the way fuzzy queries count them, so a transposed pair of
/// letters costs one edit here as it does when the term is recalled.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 100.0;
    }
    (1.0 - strsim::osa_distance(a, b) as f64 / longest as f64) * 100.0
}
