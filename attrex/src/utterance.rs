//! Per-call utterance state.
//!
//! The utterance is tokenized once into word slots. Erasing a span marks its
//! slots consumed; the text itself is never rewritten, so positions stay valid
//! for the whole extraction.

use crate::text;
use std::fmt;

/// Rendering of a consumed slot.
pub const PLACEHOLDER: &str = "------";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Word(String),
    Consumed,
}

impl Slot {
    pub fn word(&self) -> Option<&str> {
        match self {
            Slot::Word(word) => Some(word),
            Slot::Consumed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    slots: Vec<Slot>,
}

impl Utterance {
    /// Normalize and split `text` with the dictionary analyzer.
    pub fn new(text: &str) -> Self {
        Self {
            slots: text::tokenize(text).into_iter().map(Slot::Word).collect(),
        }
    }

    /// Total number of words, consumed or not.
    pub fn word_count(&self) -> usize {
        self.slots.len()
    }

    /// Words not yet consumed, in order.
    pub fn remaining(&self) -> Vec<&str> {
        self.slots.iter().filter_map(Slot::word).collect()
    }

    /// Remaining words with their slot positions.
    pub fn remaining_positions(&self) -> Vec<(usize, &str)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.word().map(|w| (i, w)))
            .collect()
    }

    pub fn is_exhausted(&self) -> bool {
        self.slots.iter().all(|slot| slot.word().is_none())
    }

    /// First remaining slot holding exactly `word`.
    pub fn find_word(&self, word: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.word() == Some(word))
    }

    /// Mark `positions` consumed. Returns how many were still unconsumed.
    pub fn consume(&mut self, positions: &[usize]) -> usize {
        let mut consumed = 0;
        for &i in positions {
            match self.slots.get_mut(i) {
                Some(slot) if matches!(slot, Slot::Word(_)) => {
                    *slot = Slot::Consumed;
                    consumed += 1;
                }
                _ => {}
            }
        }
        consumed
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(slot.word().unwrap_or(PLACEHOLDER))?;
        }
        Ok(())
    }
}
