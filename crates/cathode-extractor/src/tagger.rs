//! Rule-based reference tagger
//!
//! Splits text into sentences on terminal punctuation and tags each
//! whitespace token that the chemistry engine recognizes as a formula or an
//! abbreviation. Production deployments plug in a statistical tagger through
//! [`SentenceTagger`]; this one keeps the pipeline usable on its own.

use cathode_chem::{bracket_level, ChemEngine, EntityTag};
use cathode_core::{EntitySpan, Result, TaggedSentence};

use crate::SentenceTagger;

/// Words whose trailing period does not end a sentence
const NON_TERMINAL: [&str; 12] = [
    "Fig", "Figs", "e.g", "i.e", "al", "ca", "vs", "No", "Ref", "Refs", "Eq", "approx",
];

/// Tagger driven by [`ChemEngine::classify`]
#[derive(Debug, Clone)]
pub struct RuleTagger {
    engine: ChemEngine,
}

impl RuleTagger {
    pub fn new(engine: ChemEngine) -> Self {
        Self { engine }
    }

    /// Sentence byte ranges of `text`, trimmed of surrounding whitespace
    pub fn sentence_bounds(text: &str) -> Vec<(usize, usize)> {
        let mut bounds = Vec::new();
        let mut start = 0;
        let mut chars = text.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            let end = i + c.len_utf8();
            let terminal = match c {
                '\n' => true,
                '.' | '!' | '?' => {
                    let next = chars.peek().map(|&(_, n)| n);
                    matches!(next, None | Some(' ' | '\n'))
                        && !ends_with_abbreviation(&text[start..i])
                }
                _ => false,
            };
            if terminal {
                push_trimmed(text, start, end, &mut bounds);
                start = end;
            }
        }
        push_trimmed(text, start, text.len(), &mut bounds);
        bounds
    }

    fn keep(&self, token: &str) -> bool {
        let tag = self.engine.classify(token);
        if tag.is_formula() || tag == EntityTag::Abbreviation {
            return true;
        }
        let normalized = self.engine.normalize(token);
        normalized != token && self.engine.classify(&normalized).is_formula()
    }

    fn tag_sentence(&self, text: &str, start: usize) -> TaggedSentence {
        let mut spans = Vec::new();
        let mut offset = 0;
        for word in text.split(' ') {
            let word_start = offset;
            offset += word.len() + 1;
            let (lead, token) = trim_token(word);
            if token.is_empty() || !self.keep(token) {
                continue;
            }
            spans.push(EntitySpan::new(token, start + word_start + lead));
        }
        TaggedSentence::new(text, start, spans)
    }
}

impl SentenceTagger for RuleTagger {
    fn tag(&self, text: &str) -> Result<Vec<TaggedSentence>> {
        Ok(Self::sentence_bounds(text)
            .into_iter()
            .map(|(start, end)| self.tag_sentence(&text[start..end], start))
            .collect())
    }
}

fn ends_with_abbreviation(head: &str) -> bool {
    let word = head.rsplit([' ', '(']).next().unwrap_or("");
    NON_TERMINAL.contains(&word) || (word.len() == 1 && word.chars().all(|c| c.is_ascii_uppercase()))
}

fn push_trimmed(text: &str, start: usize, end: usize, bounds: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if !trimmed.is_empty() {
        bounds.push((start + lead, start + lead + trimmed.len()));
    }
}

/// Strip punctuation around a word, returning the offset of what is left.
///
/// Brackets are only stripped when unbalanced within the token, so
/// `Na(Mn)O2` keeps its group while `(NM),` loses its wrapping.
fn trim_token(word: &str) -> (usize, &str) {
    let mut token = word;
    let mut lead = 0;
    loop {
        let before = token.len();
        token = token.trim_end_matches([',', ';', ':', '.', '"', '\'']);
        if let Some(rest) = token.strip_prefix(['"', '\'']) {
            lead += 1;
            token = rest;
        }
        if token.starts_with('(') && bracket_level(token) > 0 {
            lead += 1;
            token = &token[1..];
        }
        if token.ends_with(')') && bracket_level(token) < 0 {
            token = &token[..token.len() - 1];
        }
        if token.starts_with('(') && token.ends_with(')') && token.len() > 2 {
            let inner = &token[1..token.len() - 1];
            if bracket_level(inner) == 0 && !inner.contains(['(', ')']) {
                lead += 1;
                token = inner;
            }
        }
        if token.len() == before {
            return (lead, token);
        }
    }
}
