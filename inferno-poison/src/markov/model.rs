//! Word-level Markov chain
//!
//! Each state is the `state_size` words preceding a transition, padded with a begin
//! marker at the start of a sentence. Models over the same state size combine by
//! adding transition counts, so one model per corpus fragment can be folded into a
//! running model in any order.

use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};

const BEGIN: &str = "___BEGIN__";
const END: &str = "___END__";

/// Attempts per sentence before giving up on a walk
const MAX_TRIES: usize = 10;

/// Characters that make a corpus sentence unusable as training input
const REJECT_CHARS: [char; 5] = ['"', '(', ')', '[', ']'];

type State = Vec<String>;

/// An additive word-transition model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkovModel {
    state_size: usize,
    chain: HashMap<State, BTreeMap<String, u64>>,
}

impl MarkovModel {
    /// An empty model; `state_size` is clamped to at least 1
    pub fn new(state_size: usize) -> Self {
        Self {
            state_size: state_size.max(1),
            chain: HashMap::new(),
        }
    }

    /// Train a model on free text
    pub fn from_text(text: &str, state_size: usize) -> Self {
        let mut model = Self::new(state_size);
        for sentence in split_sentences(text) {
            model.train(&sentence);
        }
        model
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    /// Whether the model has no transitions at all
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Number of distinct states
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    fn begin_state(&self) -> State {
        vec![BEGIN.to_string(); self.state_size]
    }

    fn train(&mut self, words: &[String]) {
        let mut state = self.begin_state();
        for word in words.iter().map(String::as_str).chain(std::iter::once(END)) {
            *self
                .chain
                .entry(state.clone())
                .or_default()
                .entry(word.to_string())
                .or_insert(0) += 1;
            state.remove(0);
            state.push(word.to_string());
        }
    }

    /// Fold `other` into this model
    pub fn combine(&mut self, other: &MarkovModel) -> Result<()> {
        if other.state_size != self.state_size {
            return Err(Error::Internal(format!(
                "Cannot combine models with state sizes {} and {}",
                self.state_size, other.state_size
            )));
        }

        for (state, followers) in &other.chain {
            let entry = self.chain.entry(state.clone()).or_default();
            for (word, weight) in followers {
                *entry.entry(word.clone()).or_insert(0) += weight;
            }
        }
        Ok(())
    }

    fn walk<R: Rng + ?Sized>(&self, rng: &mut R, max_words: usize) -> Option<Vec<String>> {
        let mut state = self.begin_state();
        let mut words = Vec::new();

        loop {
            let followers: Vec<(&String, &u64)> = self.chain.get(&state)?.iter().collect();
            let (next, _) = followers.choose_weighted(rng, |(_, weight)| **weight).ok()?;
            if next.as_str() == END {
                break;
            }
            if words.len() >= max_words {
                return None;
            }
            words.push((*next).clone());
            state.remove(0);
            state.push((*next).clone());
        }

        Some(words)
    }

    /// Generate one sentence of at most `max_words` words
    ///
    /// Returns `None` when the model is empty or every attempt ran too long.
    pub fn make_sentence<R: Rng + ?Sized>(&self, rng: &mut R, max_words: usize) -> Option<String> {
        (0..MAX_TRIES)
            .filter_map(|_| self.walk(rng, max_words))
            .find(|words| !words.is_empty())
            .map(|words| words.join(" "))
    }
}

/// Split text into word lists, one per sentence
///
/// Sentences end at a word finishing with `.`, `!` or `?`. Sentences containing
/// quotes, parentheses or brackets are dropped.
pub fn split_sentences(text: &str) -> Vec<Vec<String>> {
    let mut sentences = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for word in text.split_whitespace() {
        current.push(word.to_string());
        if word.ends_with(['.', '!', '?']) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }

    sentences.retain(|words| words.iter().all(|w| is_usable_word(w)));
    sentences
}

fn is_usable_word(word: &str) -> bool {
    !word.contains(REJECT_CHARS) && !word.starts_with('\'') && !word.ends_with('\'')
}
