//! Keyword matcher
//!
//! Turns a stream of key events into flagged/unflagged counts. The current
//! word lives only until the next boundary and is dropped there, matched or not.

use std::collections::HashSet;

/// A single captured key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Char(char),
    Space,
    Enter,
    /// Any key that neither extends nor ends a word
    Other,
}

impl InputEvent {
    pub fn from_char(c: char) -> Self {
        match c {
            ' ' => Self::Space,
            '\n' | '\r' => Self::Enter,
            c if c.is_alphanumeric() => Self::Char(c),
            _ => Self::Other,
        }
    }

    fn is_boundary(&self) -> bool {
        matches!(self, Self::Space | Self::Enter)
    }
}

pub struct KeywordMatcher {
    keywords: HashSet<String>,
    word: String,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            word: String::new(),
        }
    }

    /// Feed one event. Returns true when a boundary closes a flagged word.
    pub fn feed(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::Char(c) => {
                self.word.extend(c.to_lowercase());
                false
            }
            e if e.is_boundary() => {
                let flagged = !self.word.is_empty() && self.keywords.contains(&self.word);
                self.word.clear();
                flagged
            }
            _ => false,
        }
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.word.len()
    }
}
