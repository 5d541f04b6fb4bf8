//! Guarded regex scanning
//!
//! The `regex` crate has no look-around, so patterns that need to inspect
//! their surroundings pair a plain regex with a context check. A rejected
//! match is retried one character further on, which gives the same matches
//! a look-behind or look-ahead would.

use std::ops::Range;

use regex::{Captures, Regex};

use cathode_core::{CathodeError, Result};

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| CathodeError::Pattern(e.to_string()))
}

/// Context check run on a candidate match
pub(crate) type Guard = fn(&str, &Captures<'_>) -> bool;

/// A regex plus the context it must appear in
#[derive(Debug, Clone)]
pub(crate) struct Guarded {
    pub regex: Regex,
    pub accept: Guard,
}

impl Guarded {
    pub fn new(pattern: &str, accept: Guard) -> Result<Self> {
        Ok(Self {
            regex: compile(pattern)?,
            accept,
        })
    }

    /// First accepted match starting at or after `from`
    pub fn captures_from<'t>(&self, text: &'t str, mut from: usize) -> Option<Captures<'t>> {
        while from <= text.len() {
            let caps = self.regex.captures_at(text, from)?;
            if (self.accept)(text, &caps) {
                return Some(caps);
            }
            from = next_char(text, caps.get(0)?.start());
        }
        None
    }

    /// All accepted, non-overlapping matches
    pub fn captures_all<'t>(&self, text: &'t str) -> Vec<Captures<'t>> {
        let mut found = Vec::new();
        let mut from = 0;
        while let Some(caps) = self.captures_from(text, from) {
            let Some(whole) = caps.get(0) else { break };
            from = if whole.is_empty() {
                next_char(text, whole.end())
            } else {
                whole.end()
            };
            found.push(caps);
        }
        found
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.captures_from(text, 0).is_some()
    }

    /// Spans reported by all accepted matches; see [`reported`]
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        self.captures_all(text).iter().map(reported).collect()
    }
}

/// The span a match reports: the first participating capture group, or the
/// whole match when the pattern has none.
pub(crate) fn reported(caps: &Captures<'_>) -> Range<usize> {
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .or_else(|| caps.get(0))
        .map(|m| m.range())
        .unwrap_or(0..0)
}

/// Byte offset of the character after the one at `at`
pub(crate) fn next_char(text: &str, at: usize) -> usize {
    text.get(at..)
        .and_then(|rest| rest.chars().next())
        .map(|c| at + c.len_utf8())
        .unwrap_or(text.len() + 1)
}

/// Character right before byte offset `at`
pub(crate) fn char_before(text: &str, at: usize) -> Option<char> {
    text.get(..at).and_then(|head| head.chars().next_back())
}

/// Character starting at byte offset `at`
pub(crate) fn char_at(text: &str, at: usize) -> Option<char> {
    text.get(at..).and_then(|tail| tail.chars().next())
}

/// True when the character before `at` is one of `set`
pub(crate) fn preceded_by(text: &str, at: usize, set: &str) -> bool {
    char_before(text, at).is_some_and(|c| set.contains(c))
}

/// Start and end of the whole match
pub(crate) fn bounds(caps: &Captures<'_>) -> (usize, usize) {
    caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0))
}

/// Replace every accepted match, expanding `$n` references in `replacement`
pub(crate) fn replace_guarded(guarded: &Guarded, text: &str, replacement: &str) -> String {
    let matches = guarded.captures_all(text);
    if matches.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in &matches {
        let (start, end) = bounds(caps);
        out.push_str(&text[last..start]);
        caps.expand(replacement, &mut out);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_after_dash(text: &str, caps: &Captures<'_>) -> bool {
        !preceded_by(text, bounds(caps).0, "-")
    }

    #[test]
    fn test_guard_retries_inside_rejected_match() {
        let guarded = Guarded::new(r"\d+", not_after_dash).unwrap();
        let spans = guarded.spans("-12 and 34");
        // "12" is rejected, its tail "2" is not preceded by a dash
        assert_eq!(spans, vec![2..3, 8..10]);
    }

    #[test]
    fn test_reported_prefers_group() {
        let guarded = Guarded::new(r"(\d+) cycles|(first)", |_, _| true).unwrap();
        assert_eq!(guarded.spans("after 100 cycles"), vec![6..9]);
        assert_eq!(guarded.spans("the first one"), vec![4..9]);
    }

    #[test]
    fn test_replace_guarded() {
        let guarded = Guarded::new(r"(\d)\s?V", not_after_dash).unwrap();
        assert_eq!(replace_guarded(&guarded, "2 V and -4 V", "${1}V"), "2V and -4 V");
    }

    #[test]
    fn test_char_helpers() {
        assert_eq!(char_before("a°C", 3), Some('°'));
        assert_eq!(char_at("a°C", 1), Some('°'));
        assert_eq!(next_char("a°C", 1), 3);
        assert!(preceded_by("x=5", 2, "=-"));
        assert!(!preceded_by("5", 0, "="));
    }
}
