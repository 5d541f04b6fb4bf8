//! Material name resolution for bound properties
//!
//! Turns what a sentence calls a material (an abbreviation, a concrete
//! formula, a templated formula) into the abbreviation and full name a
//! record is filed under.

use std::collections::HashMap;

use regex::Regex;

use cathode_chem::expr::format_number;
use cathode_chem::{end_parentheses, ChemEngine, EntityTag};
use cathode_core::{Result, TaggedSentence};

use crate::abbreviation::AbbreviationTable;
use crate::scan::compile;

const LOOKUP_TRIM: &[char] = &['(', ',', '.', ';', ')'];

#[derive(Debug, Clone)]
pub(crate) struct ResolvePatterns {
    variant_prefix: Regex,
    xyz_values: Regex,
}

impl ResolvePatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            variant_prefix: compile(r"[iboh]-")?,
            xyz_values: compile(r"(\b[Xxyz]\b)\s*=([0-9.,and\s%]+)")?,
        })
    }
}

pub(crate) fn has_variable(name: &str) -> bool {
    name.contains(['x', 'y', 'z'])
}

/// Same letters in a different order, e.g. `NaNMF` and `NaNFM`
pub(crate) fn is_same_abbreviation(a: &str, b: &str) -> bool {
    let alphabetic = |s: &str| !s.is_empty() && s.chars().all(char::is_alphabetic);
    if !(alphabetic(a) && alphabetic(b) && a.chars().count() == b.chars().count()) {
        return false;
    }
    let mut balance: HashMap<char, i32> = HashMap::new();
    for (x, y) in a.chars().zip(b.chars()) {
        if x != y {
            *balance.entry(x).or_default() += 1;
            *balance.entry(y).or_default() -= 1;
        }
    }
    balance.values().all(|&v| v == 0)
}

pub(crate) struct Resolver<'a> {
    pub engine: &'a ChemEngine,
    pub table: &'a AbbreviationTable,
    pub patterns: &'a ResolvePatterns,
}

impl Resolver<'_> {
    /// Abbreviation and full name for a material mention.
    ///
    /// Both are empty when the mention is an abbreviation nobody defined; a
    /// formula without a defined abbreviation resolves to itself.
    pub fn full_name(&self, mention: &str) -> (String, String) {
        let tag = self.engine.classify(mention);
        let stripped = self.patterns.variant_prefix.replace_all(mention, "");
        let (mention_phase, body) = self.engine.separate_phase(&stripped);

        for pair in &self.table.abbreviations {
            let abbreviation = self.patterns.variant_prefix.replace_all(&pair.abbreviation, "");
            let pair_phase = match self.engine.separate_phase(&abbreviation).0 {
                "" => self.engine.separate_phase(&pair.formula).0,
                phase => phase,
            };
            let short = self.engine.separate_phase(&pair.abbreviation).1;
            let full = self.engine.separate_phase(&pair.formula).1;

            if body == short
                || body == full
                || (tag == EntityTag::Abbreviation && is_same_abbreviation(body, short))
            {
                if pair_phase.is_empty() {
                    return (short.to_string(), full.to_string());
                }
                let phase = if mention_phase.is_empty() {
                    pair_phase
                } else {
                    mention_phase
                };
                return (short.to_string(), format!("{phase}-{full}"));
            }
        }

        if tag == EntityTag::Synthetic {
            (String::new(), mention.to_string())
        } else {
            (String::new(), String::new())
        }
    }

    /// Materials named in running text, token by token
    pub fn entity_lookup(&self, text: &str) -> Vec<String> {
        text.replace("//", " // ")
            .split(' ')
            .map(|token| token.trim_matches(LOOKUP_TRIM))
            .filter(|token| {
                matches!(
                    self.engine.classify(token),
                    EntityTag::Abbreviation | EntityTag::Synthetic
                )
            })
            .map(str::to_string)
            .collect()
    }

    /// First material mentioned in an earlier sentence
    pub fn detect_above(&self, sentence: &TaggedSentence) -> (String, String) {
        let named: Vec<&str> = sentence
            .spans
            .iter()
            .filter(|span| {
                matches!(
                    self.engine.classify(&span.text),
                    EntityTag::Abbreviation | EntityTag::Synthetic
                )
            })
            .filter_map(|span| {
                if span.text.matches(' ').count() <= 1 {
                    span.text.split(' ').next()
                } else {
                    span.text.rsplit(' ').next()
                }
            })
            .collect();

        if let Some(first) = named.first() {
            return self.full_name(first);
        }
        sentence
            .text
            .split(' ')
            .find(|token| self.engine.classify(token) == EntityTag::Abbreviation)
            .map(|token| self.full_name(token))
            .unwrap_or_default()
    }

    /// Values written as `x = 0.1, 0.2` or `x = 5%` in a sentence, as the
    /// text of a supplementary bracket per variable.
    pub fn written_values(&self, text: &str) -> Vec<(char, String)> {
        let mut found: Vec<(char, String)> = Vec::new();
        for caps in self.patterns.xyz_values.captures_iter(text) {
            let variable = caps[1].chars().next().map_or('x', |c| c.to_ascii_lowercase());
            let raw = &caps[2];
            let values: Vec<String> = if raw.contains('%') {
                raw.split('%')
                    .filter_map(|part| part.trim_matches([' ', ',']).rsplit(' ').next())
                    .filter_map(|token| token.parse::<f64>().ok())
                    .map(|v| format_number(v / 100.0))
                    .collect()
            } else {
                raw.split([' ', ','])
                    .filter(|token| token.starts_with('0'))
                    .filter(|token| token.parse::<f64>().is_ok_and(|v| v < 10.0))
                    .map(|token| {
                        if token.starts_with("0.") {
                            token.to_string()
                        } else {
                            format!("0.{}", token.get(2..).unwrap_or(""))
                        }
                    })
                    .collect()
            };

            let joined = values.join(", ");
            match found.iter_mut().find(|(v, _)| *v == variable) {
                Some((_, existing)) => {
                    existing.push_str(", ");
                    existing.push_str(&joined);
                }
                None if joined.is_empty() => found.push((variable, String::new())),
                None => found.push((variable, format!(" {joined}"))),
            }
        }
        found
    }

    /// Expand a templated `name` with values written in another sentence
    pub fn expand_with_written(&self, name: &str, written: &[(char, String)]) -> Vec<String> {
        let bracket = written
            .iter()
            .map(|(variable, values)| format!("{variable}={values}"))
            .collect::<Vec<_>>()
            .join(" ");
        let head = match end_parentheses(name) {
            Some((end, _)) if end > 0 => &name[..end],
            _ => name,
        };
        let composition = self.engine.parse(&format!("{head} ({bracket})"));
        self.engine.expand(&composition)
    }

    /// Concrete formulas for a templated formula, from the values written in
    /// `sentence` or else the values bound to it earlier in the document.
    pub fn expand_templated(&self, formula: &str, sentence: &str) -> Vec<String> {
        let head = match end_parentheses(formula) {
            Some((end, _)) if end > 0 => formula[..end].trim_end(),
            _ => formula,
        };
        let Some(variable) = head.chars().find(|c| matches!(c, 'x' | 'y' | 'z')) else {
            return Vec::new();
        };
        if self.engine.variable_values(variable, sentence).values.is_empty() {
            let phase_split = self.engine.separate_phase(head);
            let bound = self.table.stoichiometric_variables.iter().find(|binding| {
                binding.formula == head || self.engine.separate_phase(&binding.formula) == phase_split
            });
            return match bound {
                Some(binding) => {
                    let values: Vec<String> =
                        binding.values.iter().map(|&v| format_number(v)).collect();
                    let text = format!("{} ({variable}={})", binding.formula, values.join(","));
                    self.engine.expand(&self.engine.parse(&text))
                }
                None => Vec::new(),
            };
        }
        self.engine.expand_in_context(head, sentence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cathode_chem::{ChemProfile, NoCache};
    use cathode_core::AbbreviationPair;

    use crate::abbreviation::VariableBinding;

    fn engine() -> ChemEngine {
        ChemEngine::new(ChemProfile::default(), Arc::new(NoCache)).unwrap()
    }

    fn table() -> AbbreviationTable {
        AbbreviationTable {
            abbreviations: vec![
                AbbreviationPair::new("NM", "Na0.67Mn0.67Ni0.33O2"),
                AbbreviationPair::new("NMF", "P2-Na0.67Mn0.5Fe0.5O2"),
            ],
            custom_abbreviations: Vec::new(),
            stoichiometric_variables: vec![VariableBinding {
                formula: "Na0.67Mn1-xTixO2".to_string(),
                values: vec![0.1, 0.2],
            }],
        }
    }

    fn with_resolver<T>(f: impl FnOnce(&Resolver<'_>) -> T) -> T {
        let engine = engine();
        let table = table();
        let patterns = ResolvePatterns::new().unwrap();
        f(&Resolver {
            engine: &engine,
            table: &table,
            patterns: &patterns,
        })
    }

    #[test]
    fn test_same_abbreviation() {
        assert!(is_same_abbreviation("NaNMF", "NaNFM"));
        assert!(!is_same_abbreviation("NaNMF", "NaNMC"));
        assert!(!is_same_abbreviation("NM1", "NM1"));
        assert!(!is_same_abbreviation("NMF", "NM"));
    }

    #[test]
    fn test_full_name() {
        with_resolver(|r| {
            assert_eq!(
                r.full_name("NM"),
                ("NM".to_string(), "Na0.67Mn0.67Ni0.33O2".to_string())
            );
            assert_eq!(
                r.full_name("NFM"),
                ("NMF".to_string(), "P2-Na0.67Mn0.5Fe0.5O2".to_string())
            );
            assert_eq!(r.full_name("NCF"), (String::new(), String::new()));
            assert_eq!(
                r.full_name("Na0.67Ni0.33Mn0.67O2"),
                (String::new(), "Na0.67Ni0.33Mn0.67O2".to_string())
            );
        });
    }

    #[test]
    fn test_entity_lookup() {
        with_resolver(|r| {
            assert_eq!(
                r.entity_lookup("NM and NMF deliver 120 and 110 mAhg-1, respectively."),
                vec!["NM", "NMF"]
            );
        });
    }

    #[test]
    fn test_detect_above() {
        with_resolver(|r| {
            let sentence = TaggedSentence::with_entities("The NM electrode was tested.", &["NM"]);
            assert_eq!(r.detect_above(&sentence).0, "NM");
            let untagged = TaggedSentence::new("The NM electrode was tested.", 0, vec![]);
            assert_eq!(r.detect_above(&untagged).0, "NM");
            let plain = TaggedSentence::new("Nothing here.", 0, vec![]);
            assert_eq!(r.detect_above(&plain), (String::new(), String::new()));
        });
    }

    #[test]
    fn test_written_values() {
        with_resolver(|r| {
            assert_eq!(
                r.written_values("samples with x = 0.1, 0.2 and 0.3 were"),
                vec![('x', " 0.1, 0.2, 0.3".to_string())]
            );
            assert_eq!(
                r.written_values("doped with X = 5% and 10%"),
                vec![('x', " 0.05, 0.1".to_string())]
            );
        });
    }

    #[test]
    fn test_expand_templated() {
        with_resolver(|r| {
            let in_sentence = r.expand_templated("Na0.67Mn1-xTixO2", "samples (x = 0.1 and 0.3) were");
            assert_eq!(in_sentence.len(), 2);

            let from_binding = r.expand_templated("Na0.67Mn1-xTixO2", "no values here");
            assert_eq!(from_binding, r.expand_templated("Na0.67Mn1-xTixO2", "(x = 0.1, 0.2)"));
            assert_eq!(from_binding.len(), 2);

            assert!(r.expand_templated("Na0.67MnO2", "x = 0.1").is_empty());
        });
    }
}
