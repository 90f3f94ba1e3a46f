//! Message sanitizer
//!
//! Turns raw chat text into something safe to hand to a speech engine:
//! links and @-mentions are dropped, anything outside ASCII word characters,
//! whitespace and a little punctuation is stripped, whitespace is normalized and
//! the result is cut to a maximum length.
//!
//! Sanitizing never fails and never returns an empty string. Applying it twice
//! gives the same result as applying it once.

use crate::config::DEFAULT_MAX_MESSAGE_LENGTH;
use std::sync::LazyLock;

use regex::Regex;

/// Spoken instead of an empty message
pub const PLACEHOLDER: &str = "No message provided";

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9+.\-]*://\S*").unwrap());
// Word characters are ASCII only; accented letters and other scripts are stripped.
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@[A-Za-z0-9_]+").unwrap());
static UNSAFE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s.,!?'\-]").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Length-bounded message sanitizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sanitizer {
    max_len: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_LENGTH)
    }
}

impl Sanitizer {
    /// Create a sanitizer that keeps at most `max_len` characters.
    ///
    /// A `max_len` of zero is treated as one so the output can never be empty.
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
        }
    }

    /// Maximum number of characters in the output
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Clean `raw` for speech
    pub fn sanitize(&self, raw: &str) -> String {
        let cleaned = URL_RE.replace_all(raw, "");
        let cleaned = MENTION_RE.replace_all(&cleaned, "");
        let cleaned = UNSAFE_RE.replace_all(&cleaned, "");
        let cleaned = WHITESPACE_RE.replace_all(&cleaned, " ");

        let bounded = self.truncate(cleaned.trim());
        if bounded.is_empty() {
            self.truncate(PLACEHOLDER)
        } else {
            bounded
        }
    }

    // Hard cutoff on char boundaries; the cut may expose a trailing space.
    fn truncate(&self, text: &str) -> String {
        match text.char_indices().nth(self.max_len) {
            Some((end, _)) => text[..end].trim_end().to_string(),
            None => text.to_string(),
        }
    }
}

/// Sanitize with the default maximum length
pub fn sanitize(raw: &str) -> String {
    Sanitizer::default().sanitize(raw)
}
