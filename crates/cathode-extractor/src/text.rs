//! Text harmonization and formula rewriting
//!
//! Papers spell the same unit a dozen ways (`mA h g−1`, `mAh/g`, `mAhg-1`)
//! and write ordinals in words. Harmonization rewrites them to one spelling
//! so the property patterns only need to know that one. Formula rewriting
//! then replaces each tagged formula with its normalized form.

use regex::Regex;

use cathode_chem::elements::ELEMENT_NAMES;
use cathode_chem::ChemEngine;
use cathode_core::{Result, TaggedSentence};

use crate::scan::{bounds, char_at, char_before, compile, replace_guarded, Guard, Guarded};

/// Glyph replacements applied before any pattern
const REPLACE: [(&str, &str); 7] = [
    ("•", "·"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("∕", "/"),
    ("~", " ~ "),
    ("≈", " ≈ "),
    ("。", ". "),
];

const NUMBER_WORDS: [(&str, &str); 19] = [
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("ten", "10"),
    ("eleven", "11"),
    ("twelve", "12"),
    ("thirteen", "13"),
    ("fourteen", "14"),
    ("fifteen", "15"),
    ("sixteen", "16"),
    ("seventeen", "17"),
    ("eighteen", "18"),
    ("nineteen", "19"),
    ("twenty", "20"),
    ("thirty", "30"),
];

const TENS_WORDS: [(&str, &str); 7] = [
    ("forty", "40"),
    ("fifty", "50"),
    ("sixty", "60"),
    ("seventy", "70"),
    ("eighty", "80"),
    ("ninety", "90"),
    ("hundred", "100"),
];

fn always(_: &str, _: &regex::Captures<'_>) -> bool {
    true
}

fn not_after_m(text: &str, caps: &regex::Captures<'_>) -> bool {
    char_before(text, bounds(caps).0) != Some('m')
}

fn not_before_dot(text: &str, caps: &regex::Captures<'_>) -> bool {
    char_at(text, bounds(caps).1) != Some('.')
}

fn not_before_cycle(text: &str, caps: &regex::Captures<'_>) -> bool {
    let rest = &text[bounds(caps).1..];
    let rest = rest.strip_prefix(char::is_whitespace).unwrap_or(rest);
    !rest.starts_with("cycle")
}

fn before_cycle(text: &str, caps: &regex::Captures<'_>) -> bool {
    !not_before_cycle(text, caps)
}

fn not_after_dash_or_digit(text: &str, caps: &regex::Captures<'_>) -> bool {
    !char_before(text, bounds(caps).0).is_some_and(|c| c == '-' || c.is_ascii_digit())
}

fn before_sodium(text: &str, caps: &regex::Captures<'_>) -> bool {
    text[bounds(caps).1..].starts_with("Na")
}

/// Rewrites unit spellings, ordinals and number words to one canonical form
#[derive(Debug, Clone)]
pub struct Harmonizer {
    substitutions: Vec<(Guarded, &'static str)>,
    valence: Regex,
}

impl Harmonizer {
    pub fn new() -> Result<Self> {
        let rules: &[(&str, Guard, &'static str)] = &[
            (r"\b(to|and|or)(\d)", always, "$1 $2"),
            (r"with×=", always, "with x="),
            (r"m[\s.·/]?A[\s.·/]?h[\s.·/]?g(?:[-\s1]*1)?", always, "mAhg-1"),
            (
                r"m\s?A\s?g\s?-\s?1|m\s?A\s?/\s?g|m\s?A\s?·\s?g\s?-\s?1",
                always,
                "mAg-1",
            ),
            (r"A[\s.·/]?g[\s.·/]?-[\s.·/]?1", not_after_m, "Ag-1"),
            (r"◦\s?C|℃|°\s?C", always, "°C"),
            (
                r"(\d+(\.\d+)?)[ V]+-\s?(\d+(\.\d+)?)\s?V\b",
                always,
                "$1-$3 V",
            ),
            (r"(\d)\s?V\b", not_before_dot, "${1}V"),
            (r"(\d)\s?V\s?\.", always, "${1}V."),
            (r"cycled for (\d+) times", always, "$1 cycles"),
            (
                r"\b(\d+)[ ]*(?:st|rd|nd|th|times)?[ ]*(cycles?)\b",
                always,
                " $1 $2",
            ),
            (r"( \d+)(?:th|nd|st)", not_before_cycle, "$1"),
            (
                r"(?:first|all) three cycles|first, second and third cycle",
                always,
                "1, 2, and 3 cycle",
            ),
            (r"first-?", before_cycle, "1"),
            (r"second", before_cycle, "2"),
            (r"third", before_cycle, "3"),
            (r"fiftieth\b", always, "50"),
            (r"(\d)\s?,\s?(0\d+\s?[c°])", always, "$1$2"),
            (r"(\d),(\d+\s?mA)", not_after_dash_or_digit, "$1$2"),
            (r"([PO][23]-)type ", before_sodium, "$1"),
            (r"\s{2,3}", always, " "),
        ];

        let mut substitutions = Vec::with_capacity(rules.len() + 26);
        for &(pattern, accept, replacement) in rules {
            substitutions.push((Guarded::new(pattern, accept)?, replacement));
        }
        for (word, digits) in NUMBER_WORDS.iter().chain(TENS_WORDS.iter()) {
            substitutions.push((Guarded::new(&format!(r"\b{word}\b"), always)?, *digits));
        }

        let names: Vec<String> = ELEMENT_NAMES
            .iter()
            .flat_map(|name| [name.to_string(), capitalize(name)])
            .collect();
        let valence = compile(&format!(
            r"({})\s*(\(([Ii]?[Vv]?[Ii]{{0,2}})\))",
            names.join("|")
        ))?;

        Ok(Self {
            substitutions,
            valence,
        })
    }

    /// Harmonize a raw document block
    pub fn harmonize(&self, text: &str) -> String {
        let mut text = remove_unprintable(text);
        for (from, to) in REPLACE {
            text = text.replace(from, to);
        }
        for (pattern, replacement) in &self.substitutions {
            text = replace_guarded(pattern, &text, replacement);
        }
        self.strip_name_valences(&text)
    }

    /// Drop `(IV)` after element names such as `manganese(IV)`
    fn strip_name_valences(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in self.valence.captures_iter(text) {
            let Some(valence) = caps.get(2) else { continue };
            out.push_str(&text[last..valence.start()]);
            last = valence.end();
        }
        out.push_str(&text[last..]);
        out
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Keep printable characters, spaces and line breaks
pub fn remove_unprintable(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            c == '\n'
                || c == ' '
                || !(c.is_control()
                    || c.is_whitespace()
                    || matches!(c, '\u{200b}'..='\u{200f}' | '\u{2060}' | '\u{feff}'))
        })
        .collect()
}

/// Sentence text with every tagged span replaced by its normalized form
pub fn rewrite_formulas(sentence: &TaggedSentence, engine: &ChemEngine) -> String {
    let mut out = String::with_capacity(sentence.text.len());
    let mut last = 0;
    for span in &sentence.spans {
        let start = sentence.local(span.start);
        let end = sentence.local(span.end);
        let (Some(before), Some(original)) =
            (sentence.text.get(last..start), sentence.text.get(start..end))
        else {
            continue;
        };
        out.push_str(before);
        out.push_str(&engine.normalize(original));
        last = end;
    }
    out.push_str(sentence.tail(last));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cathode_chem::{ChemProfile, NoCache};

    fn harmonize(text: &str) -> String {
        Harmonizer::new().unwrap().harmonize(text)
    }

    #[test]
    fn test_units_unified() {
        assert_eq!(harmonize("150 mA h g-1"), "150 mAhg-1");
        assert_eq!(harmonize("150 mAh/g"), "150 mAhg-1");
        assert_eq!(harmonize("at 100 mA/g"), "at 100 mAg-1");
        assert_eq!(harmonize("at 1 A g-1"), "at 1 Ag-1");
        assert_eq!(harmonize("at 900 ℃"), "at 900 °C");
        assert_eq!(harmonize("at 900 ° C"), "at 900 °C");
    }

    #[test]
    fn test_voltage_spacing() {
        assert_eq!(harmonize("between 2.0 V-4.0 V"), "between 2.0-4.0V");
        assert_eq!(harmonize("up to 4.2 V."), "up to 4.2V.");
    }

    #[test]
    fn test_cycle_phrasing() {
        assert_eq!(harmonize("after 100th cycle"), "after 100 cycle");
        assert_eq!(harmonize("the first cycle"), "the 1 cycle");
        assert_eq!(harmonize("were cycled for 50 times"), "were 50 cycles");
        assert_eq!(harmonize("after fifty cycles"), "after 50 cycles");
    }

    #[test]
    fn test_phase_type_and_valence() {
        assert_eq!(harmonize("P2-type Na0.67MnO2"), "P2-Na0.67MnO2");
        assert_eq!(harmonize("manganese(IV) oxide"), "manganese oxide");
    }

    #[test]
    fn test_unprintable_removed() {
        assert_eq!(remove_unprintable("a\u{200b}b\tc\nd"), "abc\nd");
    }

    #[test]
    fn test_rewrite_formulas() {
        let engine = ChemEngine::new(ChemProfile::default(), Arc::new(NoCache)).unwrap();
        let sentence = TaggedSentence::with_entities(
            "Na2/3MnO2 and Na0.67Ni0.33Mn0.67O2 (NM) were made.",
            &["Na2/3MnO2", "Na0.67Ni0.33Mn0.67O2", "NM"],
        );
        assert_eq!(
            rewrite_formulas(&sentence, &engine),
            "Na0.67MnO2 and Na0.67Mn0.67Ni0.33O2 (NM) were made."
        );
    }
}
