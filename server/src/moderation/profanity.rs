//! Profanity Filter
//!
//! Multi-pattern word matching with `aho-corasick`. A match only counts when
//! it is a whole word: the characters on either side must not be
//! alphanumeric. Redaction replaces every character of a matched word with
//! `*`, so filtering filtered text is a no-op.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use tracing::info;

/// Built-in English word list.
const DEFAULT_WORDS: &[&str] = &[
    "arse", "arsehole", "ass", "asshole", "bastard", "bitch", "bitches", "bollocks",
    "bullshit", "crap", "cunt", "damn", "dick", "dickhead", "dipshit", "douche",
    "douchebag", "fuck", "fucked", "fucker", "fucking", "goddamn", "jackass", "motherfucker",
    "piss", "pissed", "prick", "pussy", "shit", "shitty", "slut", "twat", "wanker", "whore",
];

/// Compiled profanity matcher.
pub struct ProfanityFilter {
    matcher: Option<AhoCorasick>,
    word_count: usize,
}

impl ProfanityFilter {
    /// Build a filter from the built-in list plus `extra` words.
    pub fn new(extra: &[String]) -> Result<Self, aho_corasick::BuildError> {
        let mut words: Vec<String> = DEFAULT_WORDS.iter().map(|w| (*w).to_string()).collect();
        words.extend(
            extra
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty()),
        );
        words.sort_unstable();
        words.dedup();
        Self::from_words(words)
    }

    /// Build a filter from exactly `words`.
    pub fn from_words(words: Vec<String>) -> Result<Self, aho_corasick::BuildError> {
        let word_count = words.len();
        let matcher = if words.is_empty() {
            None
        } else {
            Some(
                AhoCorasickBuilder::new()
                    .ascii_case_insensitive(true)
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&words)?,
            )
        };

        info!(words = word_count, "Profanity filter compiled");
        Ok(Self {
            matcher,
            word_count,
        })
    }

    /// Number of words in the list.
    #[must_use]
    pub const fn word_count(&self) -> usize {
        self.word_count
    }

    /// Whether `text` contains a listed word.
    #[must_use]
    pub fn is_profane(&self, text: &str) -> bool {
        self.word_spans(text).next().is_some()
    }

    /// Replace every listed word in `text` with asterisks.
    #[must_use]
    pub fn clean(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for (start, end) in self.word_spans(text) {
            out.push_str(&text[last..start]);
            out.extend(std::iter::repeat('*').take(text[start..end].chars().count()));
            last = end;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Byte spans of whole-word matches, in order.
    fn word_spans<'a>(&'a self, text: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
        self.matcher
            .iter()
            .flat_map(move |m| m.find_iter(text))
            .map(|m| (m.start(), m.end()))
            .filter(move |&(start, end)| is_word_boundary(text, start, end))
    }
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}
