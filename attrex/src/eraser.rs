//! Span eraser: consumes the utterance words a matched term came from.

use crate::text;
use crate::utterance::Utterance;

/// Similarity (percent, exclusive) a window needs to be consumed.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 74.0;

/// Outcome of one erase attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Erasure {
    /// A single word found verbatim.
    Exact { position: usize },
    /// The first window of remaining words similar enough to the term.
    Fuzzy { positions: Vec<usize>, ratio: f64 },
    /// Nothing consumed; the utterance is unchanged.
    Missed,
}

impl Erasure {
    pub fn is_erased(&self) -> bool {
        !matches!(self, Erasure::Missed)
    }

    pub fn positions(&self) -> Vec<usize> {
        match self {
            Erasure::Exact { position } => vec![*position],
            Erasure::Fuzzy { positions, .. } => positions.clone(),
            Erasure::Missed => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpanEraser {
    threshold: f64,
}

impl Default for SpanEraser {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl SpanEraser {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Consume one occurrence of `term` (a word, a phrase, or a bigram key).
    ///
    /// A single word present verbatim consumes its first occurrence. Otherwise
    /// a window as wide as the term slides over the remaining words, skipping
    /// consumed ones, and the first window whose similarity ratio exceeds the
    /// threshold is consumed.
    pub fn erase(&self, utterance: &mut Utterance, term: &str) -> Erasure {
        let words = text::split_term(term);
        if words.is_empty() {
            return Erasure::Missed;
        }

        if let [word] = words.as_slice() {
            if let Some(position) = utterance.find_word(word) {
                utterance.consume(&[position]);
                return Erasure::Exact { position };
            }
        }

        let phrase = words.join(" ");
        let remaining = utterance.remaining_positions();
        let width = words.len();
        if remaining.len() < width {
            return Erasure::Missed;
        }

        let found = remaining.windows(width).find_map(|window| {
            let candidate = window
                .iter()
                .map(|(_, w)| *w)
                .collect::<Vec<_>>()
                .join(" ");
            let ratio = text::similarity_ratio(&phrase, &candidate);
            (ratio > self.threshold)
                .then(|| (window.iter().map(|(i, _)| *i).collect::<Vec<_>>(), ratio))
        });

        match found {
            Some((positions, ratio)) => {
                utterance.consume(&positions);
                Erasure::Fuzzy { positions, ratio }
            }
            None => Erasure::Missed,
        }
    }
}
