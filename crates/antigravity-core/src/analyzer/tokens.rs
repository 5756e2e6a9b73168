//! Word index over one text, built in a single pass.
//!
//! Terms are looked up in the index instead of compiling a matcher per term.
//! A term is a sequence of words joined by spaces, which match any run of
//! whitespace, or by hyphens, which match exactly one `-`. Acronym-style
//! terms compare case-sensitively, everything else case-insensitively.
//! Occurrences never overlap.

use std::collections::HashMap;
use std::ops::Range;

use super::is_acronym_like;
use super::patterns::WORD_PATTERN;

/// Longest concept context kept, in characters.
pub const CONTEXT_CHARS: usize = 200;

const SENTENCE_END: &[char] = &['.', '!', '?', '\n'];

#[derive(Debug)]
struct Token {
    span: Range<usize>,
    folded: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Joint {
    Space,
    Hyphen,
}

/// A term split into words and the joints between them.
#[derive(Debug)]
struct TermPattern {
    words: Vec<String>,
    folded: Vec<String>,
    joints: Vec<Joint>,
    exact: bool,
}

impl TermPattern {
    fn parse(term: &str) -> Option<Self> {
        let mut words = Vec::new();
        let mut joints = Vec::new();
        let mut word = String::new();

        for c in term.chars() {
            let joint = match c {
                ' ' => Joint::Space,
                '-' => Joint::Hyphen,
                _ => {
                    word.push(c);
                    continue;
                }
            };
            if word.is_empty() {
                return None;
            }
            words.push(std::mem::take(&mut word));
            joints.push(joint);
        }
        if word.is_empty() {
            return None;
        }
        words.push(word);

        Some(Self {
            folded: words.iter().map(|w| w.to_lowercase()).collect(),
            words,
            joints,
            exact: is_acronym_like(term),
        })
    }
}

/// Positions of every word in a text.
#[derive(Debug)]
pub struct TokenIndex<'a> {
    text: &'a str,
    tokens: Vec<Token>,

    /// Lowercased word -> token positions, ascending
    positions: HashMap<String, Vec<usize>>,
}

impl<'a> TokenIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut tokens = Vec::new();
        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();

        for (i, m) in WORD_PATTERN.find_iter(text).enumerate() {
            let folded = m.as_str().to_lowercase();
            positions.entry(folded.clone()).or_default().push(i);
            tokens.push(Token {
                span: m.range(),
                folded,
            });
        }

        Self {
            text,
            tokens,
            positions,
        }
    }

    /// Byte ranges of the occurrences of `term`, in text order.
    pub fn occurrences(&self, term: &str) -> impl Iterator<Item = Range<usize>> + '_ {
        let pattern = TermPattern::parse(term);
        let starts: &[usize] = pattern
            .as_ref()
            .and_then(|p| self.positions.get(&p.folded[0]))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut next_free = 0;
        starts.iter().filter_map(move |&start| {
            let pattern = pattern.as_ref()?;
            if start < next_free || !self.matches_at(start, pattern) {
                return None;
            }
            let last = start + pattern.words.len() - 1;
            next_free = last + 1;
            Some(self.tokens[start].span.start..self.tokens[last].span.end)
        })
    }

    pub fn contains(&self, term: &str) -> bool {
        self.occurrences(term).next().is_some()
    }

    /// The sentence around byte `offset`, trimmed and cut to [`CONTEXT_CHARS`].
    pub fn sentence_at(&self, offset: usize) -> String {
        let text = self.text;
        let start = text[..offset].rfind(SENTENCE_END).map_or(0, |i| i + 1);
        let end = text[offset..]
            .find(SENTENCE_END)
            .map_or(text.len(), |i| offset + i + 1);
        text[start..end].trim().chars().take(CONTEXT_CHARS).collect()
    }

    fn matches_at(&self, start: usize, pattern: &TermPattern) -> bool {
        let count = pattern.words.len();
        if start + count > self.tokens.len() {
            return false;
        }

        (0..count).all(|k| {
            let token = &self.tokens[start + k];
            let same_word = if pattern.exact {
                self.text[token.span.clone()] == pattern.words[k]
            } else {
                token.folded == pattern.folded[k]
            };
            same_word && (k == 0 || self.joined(start + k - 1, pattern.joints[k - 1]))
        })
    }

    /// Whether token `i` and the token after it are joined by `joint`.
    fn joined(&self, i: usize, joint: Joint) -> bool {
        let gap = &self.text[self.tokens[i].span.end..self.tokens[i + 1].span.start];
        match joint {
            Joint::Space => !gap.is_empty() && gap.chars().all(char::is_whitespace),
            Joint::Hyphen => gap == "-",
        }
    }
}
