//! Masking rules.
//!
//! A [`Rule`] is the matching configuration shared by one or more
//! [`MaskedWriter`]s: an ordered set of keywords, the mask token that replaces
//! them, and an automaton compiled from the two. The automaton is rebuilt on
//! every mutation and swapped in under the rule's write lock, so a masking
//! call always sees a keyword set and token that belong together.
//!
//! # Example
//!
//! ```rust
//! use masked_io::Rule;
//!
//! let rule = Rule::new().with_keywords(["secret", "passw0rd"]);
//! assert_eq!(rule.mask_str("password: passw0rd or secret"), "password: ***** or *****");
//!
//! rule.set_mask_token("[REDACTED]");
//! assert_eq!(rule.mask_str("secret"), "[REDACTED]");
//! ```
//!
//! # Overlapping keywords
//!
//! Matching is leftmost-longest: the match that starts first wins, and among
//! matches starting at the same byte the longest keyword wins. Registration
//! order never affects the result, and replaced spans are not scanned again.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use aho_corasick::{AhoCorasick, MatchKind};

use crate::writer::MaskedWriter;

/// Default replacement text for masked keywords.
pub const DEFAULT_MASK_TOKEN: &str = "*****";

/// A keyword set and mask token compiled into a single-pass replacer.
///
/// All methods take `&self`; share a rule between writers by wrapping it in
/// an [`Arc`]. Mutations take the write side of an internal lock, masking and
/// partial-match queries take the read side.
pub struct Rule {
    state: RwLock<RuleState>,
}

#[derive(Clone)]
struct RuleState {
    /// Keywords in registration order, without duplicates or empty strings.
    keywords: Vec<String>,
    mask_token: String,
    matcher: Matcher,
}

/// Compiled form of the keyword set.
#[derive(Clone)]
enum Matcher {
    /// No keywords: masking is the identity.
    Identity,
    /// Leftmost-longest Aho-Corasick automaton over all keywords.
    Automaton(AhoCorasick),
    /// Linear scan used only if the automaton could not be built.
    Scan(Vec<Vec<u8>>),
}

impl Matcher {
    fn build(keywords: &[String]) -> Self {
        if keywords.is_empty() {
            return Self::Identity;
        }

        match AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(keywords)
        {
            Ok(automaton) => Self::Automaton(automaton),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    keywords = keywords.len(),
                    "failed to build masking automaton, falling back to linear scan"
                );
                let mut patterns: Vec<Vec<u8>> =
                    keywords.iter().map(|k| k.as_bytes().to_vec()).collect();
                // Longest first so the first hit at a position is the longest one.
                patterns.sort_by_key(|p| std::cmp::Reverse(p.len()));
                Self::Scan(patterns)
            }
        }
    }

    fn replace(&self, input: &[u8], token: &[u8]) -> Vec<u8> {
        match self {
            Self::Identity => input.to_vec(),
            Self::Automaton(automaton) => {
                let mut out = Vec::with_capacity(input.len());
                automaton.replace_all_with_bytes(input, &mut out, |_, _, dst| {
                    dst.extend_from_slice(token);
                    true
                });
                out
            }
            Self::Scan(patterns) => {
                let mut out = Vec::with_capacity(input.len());
                let mut pos = 0;
                while pos < input.len() {
                    let rest = &input[pos..];
                    if let Some(p) = patterns.iter().find(|p| rest.starts_with(p)) {
                        out.extend_from_slice(token);
                        pos += p.len();
                    } else {
                        out.push(input[pos]);
                        pos += 1;
                    }
                }
                out
            }
        }
    }
}

impl RuleState {
    fn rebuild(&mut self) {
        self.matcher = Matcher::build(&self.keywords);
        tracing::debug!(
            keywords = self.keywords.len(),
            token_len = self.mask_token.len(),
            "rebuilt masking rule"
        );
    }

    fn mask(&self, input: &[u8]) -> Vec<u8> {
        self.matcher.replace(input, self.mask_token.as_bytes())
    }

    /// True if some strict, non-empty prefix of a keyword ends `buf`.
    fn has_partial_match(&self, buf: &[u8]) -> bool {
        self.keywords.iter().any(|keyword| {
            let keyword = keyword.as_bytes();
            (1..keyword.len()).any(|n| buf.ends_with(&keyword[..n]))
        })
    }
}

impl Default for Rule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule {
    /// Create an empty rule with the default mask token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RuleState {
                keywords: Vec::new(),
                mask_token: DEFAULT_MASK_TOKEN.to_string(),
                matcher: Matcher::Identity,
            }),
        }
    }

    /// Set the mask token.
    #[must_use]
    pub fn with_mask_token(self, token: impl Into<String>) -> Self {
        self.set_mask_token(token);
        self
    }

    /// Add keywords.
    #[must_use]
    pub fn with_keywords<I, S>(self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_keywords(words);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, RuleState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RuleState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add keywords to mask. Empty strings and duplicates are ignored.
    pub fn add_keywords<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.write();
        for word in words {
            let word = word.into();
            if !word.is_empty() && !state.keywords.contains(&word) {
                state.keywords.push(word);
            }
        }
        state.rebuild();
    }

    /// Stop masking the given keywords.
    pub fn remove_keywords<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.write();
        for word in words {
            let word = word.as_ref();
            state.keywords.retain(|k| k != word);
        }
        state.rebuild();
    }

    /// Remove every keyword.
    pub fn reset_keywords(&self) {
        let mut state = self.write();
        state.keywords.clear();
        state.rebuild();
    }

    /// Replace the mask token.
    pub fn set_mask_token(&self, token: impl Into<String>) {
        let mut state = self.write();
        state.mask_token = token.into();
        state.rebuild();
    }

    /// Get the keywords in registration order.
    #[must_use]
    pub fn keywords(&self) -> Vec<String> {
        self.read().keywords.clone()
    }

    /// Get the mask token.
    #[must_use]
    pub fn mask_token(&self) -> String {
        self.read().mask_token.clone()
    }

    /// Get the number of keywords.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().keywords.len()
    }

    /// Check if the rule has no keywords.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().keywords.is_empty()
    }

    /// Mask every keyword occurrence in a complete chunk.
    #[must_use]
    pub fn mask(&self, input: &[u8]) -> Vec<u8> {
        self.read().mask(input)
    }

    /// Mask every keyword occurrence in a string.
    #[must_use]
    pub fn mask_str(&self, input: &str) -> String {
        String::from_utf8_lossy(&self.mask(input.as_bytes())).into_owned()
    }

    /// Check whether the end of `buf` could be the start of a keyword.
    ///
    /// Returns true if a strict prefix of some keyword is a suffix of `buf`,
    /// meaning more input could complete a match.
    #[must_use]
    pub fn has_partial_match(&self, buf: &[u8]) -> bool {
        self.read().has_partial_match(buf)
    }

    /// Mask `buf` unless its tail is a live partial match.
    ///
    /// Both checks run under one read lock, so a concurrent mutation cannot
    /// slip in between the decision and the masking.
    #[must_use]
    pub fn mask_if_complete(&self, buf: &[u8]) -> Option<Vec<u8>> {
        let state = self.read();
        if state.has_partial_match(buf) {
            None
        } else {
            Some(state.mask(buf))
        }
    }

    /// Take an independent copy of the current keywords and mask token.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self {
            state: RwLock::new(self.read().clone()),
        }
    }

    /// Create a writer bound to this rule.
    pub fn writer<W>(self: &Arc<Self>, sink: W) -> MaskedWriter<W>
    where
        W: Write + Send + 'static,
    {
        MaskedWriter::with_rule(sink, Arc::clone(self))
    }
}

impl Clone for Rule {
    fn clone(&self) -> Self {
        self.snapshot()
    }
}

impl fmt::Debug for Rule {
    // Keywords are secrets; only their count is printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Rule")
            .field("keywords", &state.keywords.len())
            .field("mask_token", &state.mask_token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rule_is_identity() {
        let rule = Rule::new();
        assert!(rule.is_empty());
        assert_eq!(rule.mask(b"nothing to hide"), b"nothing to hide");
        assert!(!rule.has_partial_match(b"anything"));
    }

    #[test]
    fn masks_multiple_keywords() {
        let rule = Rule::new().with_keywords(["secret", "passw0rd"]);
        assert_eq!(
            rule.mask_str("password: passw0rd or secret"),
            "password: ***** or *****"
        );
    }

    #[test]
    fn empty_keywords_are_ignored() {
        let rule = Rule::new().with_keywords(["", "passw0rd"]);
        assert_eq!(rule.keywords(), vec!["passw0rd".to_string()]);
        assert_eq!(rule.mask_str("a  b"), "a  b");
    }

    #[test]
    fn duplicate_keywords_collapse() {
        let rule = Rule::new().with_keywords(["token", "token"]);
        rule.add_keywords(["token"]);
        assert_eq!(rule.len(), 1);
    }

    #[test]
    fn longest_match_wins() {
        let rule = Rule::new()
            .with_mask_token("#")
            .with_keywords(["pass", "passw0rd"]);
        assert_eq!(rule.mask_str("passw0rd pass"), "# #");

        let reversed = Rule::new()
            .with_mask_token("#")
            .with_keywords(["passw0rd", "pass"]);
        assert_eq!(reversed.mask_str("passw0rd pass"), "# #");
    }

    #[test]
    fn replacement_is_not_rescanned() {
        // The token itself contains a keyword.
        let rule = Rule::new()
            .with_mask_token("[secret]")
            .with_keywords(["secret", "cret]"]);
        assert_eq!(rule.mask_str("a secret b"), "a [secret] b");
    }

    #[test]
    fn remove_and_reset() {
        let rule = Rule::new().with_keywords(["alpha", "beta"]);
        rule.remove_keywords(["alpha"]);
        assert_eq!(rule.mask_str("alpha beta"), "alpha *****");

        rule.reset_keywords();
        assert!(rule.is_empty());
        assert_eq!(rule.mask_str("alpha beta"), "alpha beta");
    }

    #[test]
    fn set_mask_token_rebuilds() {
        let rule = Rule::new().with_keywords(["key"]);
        rule.set_mask_token("<hidden>");
        assert_eq!(rule.mask_token(), "<hidden>");
        assert_eq!(rule.mask_str("key=1"), "<hidden>=1");
    }

    #[test]
    fn partial_match_detection() {
        let rule = Rule::new().with_keywords(["passw0rd"]);
        assert!(rule.has_partial_match(b"password: pass"));
        assert!(rule.has_partial_match(b"p"));
        // A complete keyword is not a live partial match.
        assert!(!rule.has_partial_match(b"passw0rd"));
        assert!(!rule.has_partial_match(b"password: "));
    }

    #[test]
    fn mask_if_complete_holds_partials() {
        let rule = Rule::new().with_keywords(["secret"]);
        assert_eq!(rule.mask_if_complete(b"my sec"), None);
        assert_eq!(
            rule.mask_if_complete(b"my secret"),
            Some(b"my *****".to_vec())
        );
    }

    #[test]
    fn snapshot_is_independent() {
        let rule = Rule::new().with_keywords(["one"]);
        let copy = rule.snapshot();
        rule.add_keywords(["two"]);
        copy.set_mask_token("X");

        assert_eq!(copy.keywords(), vec!["one".to_string()]);
        assert_eq!(rule.mask_token(), DEFAULT_MASK_TOKEN);
        assert_eq!(copy.mask_str("one two"), "X two");
    }

    #[test]
    fn scan_fallback_matches_automaton() {
        let keywords = vec!["ab".to_string(), "abcd".to_string(), "cd".to_string()];
        let automaton = Matcher::build(&keywords);
        let mut patterns: Vec<Vec<u8>> = keywords.iter().map(|k| k.as_bytes().to_vec()).collect();
        patterns.sort_by_key(|p| std::cmp::Reverse(p.len()));
        let scan = Matcher::Scan(patterns);

        for input in ["abcd", "abc", "xxabcdcd", "cdab", ""] {
            assert_eq!(
                automaton.replace(input.as_bytes(), b"*"),
                scan.replace(input.as_bytes(), b"*"),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn debug_hides_keywords() {
        let rule = Rule::new().with_keywords(["hunter2"]);
        let debug = format!("{rule:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("keywords: 1"));
    }
}
