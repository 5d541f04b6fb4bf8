//! Compiled pattern table, built once per engine and shared by reference

use regex::Regex;

use cathode_core::{CathodeError, Result};

use crate::elements::ELEMENTS;

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| CathodeError::Pattern(e.to_string()))
}

/// Immutable set of regular expressions used by the formula operations
#[derive(Debug, Clone)]
pub(crate) struct Patterns {
    /// Phase tag in front of a material name (`P2-`, `O3-`, `P2/O3-`)
    pub phase: Regex,
    /// Looser phase tag accepted while parsing a formula body
    pub formula_phase: Regex,
    /// Sign and variable attached to the trailing oxygen count
    pub oxygen_deficiency: Regex,
    /// `a(b+x)/c` fragments
    pub fraction: Regex,
    /// `(A,B)` or `(A/B)` element placeholder groups
    pub placeholder_group: Regex,
    /// Element-like token plus its stoichiometric suffix
    pub element_token: Regex,
    /// Numeric-only element token
    pub strict_token: Regex,
    /// Innermost numeric bracket group
    pub strict_group: Regex,
    /// `Mn(IV)` style valence
    pub element_valence: Regex,
    /// `(2)Mn` style valence
    pub numeral_valence: Regex,
    /// Cell or composite notation that must not be reordered
    pub cell_notation: Regex,
}

impl Patterns {
    pub fn compile() -> Result<Self> {
        let elements = ELEMENTS.join("|");

        Ok(Self {
            phase: compile(r"^([A-Za-zα-ω][0-9]?|Air|Oxy|[PO][/PO\d and-]*)-[A-Z]")?,
            formula_phase: compile(r"^([A-Za-zα-ω][0-9]?|Air|Oxy|[/PO\d and-]+)-[A-Z]")?,
            oxygen_deficiency: compile(r"O[0-9]*([±+\-∓])[a-zα-ω][0-9]*$")?,
            fraction: compile(r"([0-9.]*)(\([0-9.]*)([a-z]*)([\-+]+)([0-9.]*)([a-z]+\))")?,
            placeholder_group: compile(r"\([A-Za-z\s]+[/,\s]+[A-Za-z]+\)")?,
            element_token: compile(r"([A-Z□][a-z]?)\s*([\-*.0-9a-zα-ω+/]*)")?,
            strict_token: compile(r"([A-Z][a-z]*)\s*([\-*.e0-9]*)")?,
            strict_group: compile(r"\(([^()]+)\)\s*([.e0-9]*)")?,
            element_valence: compile(&format!(
                r"({elements})\s*(\(([Ii]?[Vv]?[Ii]{{0,2}})\))"
            ))?,
            numeral_valence: compile(&format!(r"(\([1-9]\))\s*({elements})"))?,
            cell_notation: compile(r"[0-9]/[A-NQ-Za-z]|@|//")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        let patterns = Patterns::compile().unwrap();
        assert!(patterns.phase.is_match("P2/O3-NMT3"));
        assert!(!patterns.phase.is_match("NaMnO2"));
        assert!(patterns.cell_notation.is_match("Na0.44MnO2@NaTi2(PO4)3"));
        assert!(!patterns.cell_notation.is_match("P2/O3-Na0.67MnO2"));
    }

    #[test]
    fn test_phase_prefers_longest_tag() {
        let patterns = Patterns::compile().unwrap();
        let caps = patterns.phase.captures("P2/O3-NMT3").unwrap();
        assert_eq!(&caps[1], "P2/O3");
    }
}
