//! Profanity detection and masking.

use regex::{Regex, RegexSet};
use std::borrow::Cow;

/// Character used to mask matched words.
pub const MASK_CHAR: char = '*';

/// Built-in word list. Matching is case-insensitive and substring-based.
pub const PROFANITY_WORDS: &[&str] = &[
    "fuck", "shit", "bitch", "bastard", "asshole", "damn", "crap", "dick", "piss", "cunt",
    "slut", "whore", "wanker", "twat",
];

/// Result of scanning text for profanity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfanityReport {
    /// Distinct matched words, in word-list order.
    pub words: Vec<String>,
}

impl ProfanityReport {
    /// Whether any word matched.
    #[must_use]
    pub fn found(&self) -> bool {
        !self.words.is_empty()
    }
}

#[derive(Debug)]
pub(crate) struct ProfanityMatcher {
    words: Vec<String>,
    set: RegexSet,
    masker: Regex,
}

impl ProfanityMatcher {
    pub(crate) fn new(extra: &[String]) -> Result<Self, regex::Error> {
        let mut words: Vec<String> = PROFANITY_WORDS.iter().map(|w| w.to_string()).collect();
        for word in extra {
            let word = word.trim().to_lowercase();
            if !word.is_empty() && !words.contains(&word) {
                words.push(word);
            }
        }

        let set = RegexSet::new(words.iter().map(|w| format!("(?i){}", regex::escape(w))))?;

        // Longest first so overlapping entries mask the whole match.
        let mut by_length: Vec<&String> = words.iter().collect();
        by_length.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
        let alternation = by_length
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        let masker = Regex::new(&format!("(?i)(?:{})", alternation))?;

        Ok(Self {
            words,
            set,
            masker,
        })
    }

    pub(crate) fn detect(&self, text: &str) -> ProfanityReport {
        let words = self
            .set
            .matches(text)
            .into_iter()
            .map(|idx| self.words[idx].clone())
            .collect();
        ProfanityReport { words }
    }

    /// Replace every match with a run of [`MASK_CHAR`] of the same length.
    pub(crate) fn mask<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.masker.replace_all(text, |caps: &regex::Captures<'_>| {
            MASK_CHAR.to_string().repeat(caps[0].chars().count())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> ProfanityMatcher {
        ProfanityMatcher::new(&[]).unwrap()
    }

    #[test]
    fn test_detect_case_insensitive_distinct() {
        let report = matcher().detect("Damn it, DAMN this crap");
        assert!(report.found());
        assert_eq!(report.words, vec!["damn".to_string(), "crap".to_string()]);

        assert!(!matcher().detect("a perfectly polite sentence").found());
    }

    #[test]
    fn test_substring_match() {
        let report = matcher().detect("that's shitty");
        assert_eq!(report.words, vec!["shit".to_string()]);
    }

    #[test]
    fn test_mask_preserves_length() {
        let m = matcher();
        assert_eq!(m.mask("oh Damn!"), "oh ****!");
        assert_eq!(m.mask("shitty"), "****ty");
        assert_eq!(m.mask("clean"), "clean");

        let text = "crap and more CRAP";
        assert_eq!(m.mask(text).chars().count(), text.chars().count());
    }

    #[test]
    fn test_extra_words() {
        let m = ProfanityMatcher::new(&["  Frak ".to_string(), "damn".to_string()]).unwrap();
        assert_eq!(m.detect("frakking damn").words, vec!["damn", "frak"]);
        assert_eq!(m.mask("FRAK"), "****");
    }
}
