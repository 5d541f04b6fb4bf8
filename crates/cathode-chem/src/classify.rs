//! Entity classification: what kind of chemical mention a token is
//!
//! Classification runs a fixed decision table over the token's backbone
//! (phase tag and supplementary bracket removed, first comma-separated
//! part). Closed vocabularies are consulted first, then word shapes, then
//! a strict numeric composition and finally the templated parser.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::brackets::{end_parentheses, unify_brackets};
use crate::elements::{
    element_by_name, is_battery_family, is_element, is_polyatomic_ion, is_transition_metal,
    ABBREVIATION_SHAPES, ORGANIC_ELEMENTS, OTHER_FRAGMENTS, SIMPLE_COMPOUNDS,
};
use crate::engine::ChemEngine;

/// Kind of chemical mention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityTag {
    #[serde(rename = "element")]
    Element,
    #[serde(rename = "element_name")]
    ElementName,
    #[serde(rename = "polyatomic_ion")]
    PolyatomicIon,
    #[serde(rename = "simple_compound")]
    SimpleCompound,
    #[serde(rename = "is_likely_abbreviation")]
    Abbreviation,
    /// Concrete compound formula
    #[serde(rename = "synthetic")]
    Synthetic,
    /// Formula with the slot `M`
    #[serde(rename = "ElementVariables")]
    ElementVariables,
    /// Formula with the slot `TM`
    #[serde(rename = "ElementVariables_TM")]
    ElementVariablesTm,
    #[serde(rename = "raw_material")]
    RawMaterial,
    #[serde(rename = "solvent")]
    Solvent,
    #[serde(rename = "solvent_names")]
    SolventNames,
    #[serde(rename = "apparatus")]
    Apparatus,
    #[serde(rename = "irregular_shape")]
    IrregularShape,
    #[serde(rename = "other")]
    Other,
}

impl EntityTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Element => "element",
            Self::ElementName => "element_name",
            Self::PolyatomicIon => "polyatomic_ion",
            Self::SimpleCompound => "simple_compound",
            Self::Abbreviation => "is_likely_abbreviation",
            Self::Synthetic => "synthetic",
            Self::ElementVariables => "ElementVariables",
            Self::ElementVariablesTm => "ElementVariables_TM",
            Self::RawMaterial => "raw_material",
            Self::Solvent => "solvent",
            Self::SolventNames => "solvent_names",
            Self::Apparatus => "apparatus",
            Self::IrregularShape => "irregular_shape",
            Self::Other => "other",
        }
    }

    /// Tags that name a cathode formula the extractor reports
    pub fn is_formula(&self) -> bool {
        matches!(
            self,
            Self::Synthetic | Self::ElementVariables | Self::ElementVariablesTm
        )
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token accepted as a compound formula
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundFormula {
    /// Cleaned formula text, prefixed with its phase tag when one was found
    pub text: String,
    /// Element symbols of the strict composition, empty for vacancy formulas
    pub elements: Vec<String>,
}

/// Word shape: character classes with runs capped at three.
///
/// Digits become `d`, Greek letters `g`, lowercase `x`, uppercase `X` and
/// brackets `b`; `.`, `-`, `,` and spaces are kept and anything else is `*`.
pub fn word_shape(text: &str) -> String {
    let mut shape = String::new();
    let mut last = None;
    let mut run = 0;

    for c in text.chars() {
        let class = if c.is_ascii_digit() {
            'd'
        } else if crate::elements::is_greek(c) {
            'g'
        } else if c.is_lowercase() {
            'x'
        } else if c.is_uppercase() {
            'X'
        } else if matches!(c, '(' | ')' | '[' | ']' | '{' | '}') {
            'b'
        } else if matches!(c, '.' | '-' | ',' | ' ') {
            c
        } else {
            '*'
        };

        if last == Some(class) {
            run += 1;
        } else {
            last = Some(class);
            run = 1;
        }
        if run <= 3 {
            shape.push(class);
        }
    }
    shape
}

/// True when every hyphen-separated block contains four lowercase letters in
/// a row, i.e. the token reads as prose.
pub fn is_word(text: &str) -> bool {
    text.split('-').all(|block| {
        let mut run = 0;
        block.chars().any(|c| {
            run = if c.is_lowercase() { run + 1 } else { 0 };
            run >= 4
        })
    })
}

fn is_number_with_dots(text: &str) -> bool {
    text.split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// `S12`, `P21` and similar sample or space-group codes
fn is_sample_code(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some('S' | 'P'), Some(a), Some(b)) if a.is_ascii_digit() && b.is_ascii_digit()
    )
}

/// True when the amounts, reduced by their common divisor, are all one
fn reduces_to_units(amounts: &[f64]) -> bool {
    fn gcd(a: u64, b: u64) -> u64 {
        if b == 0 {
            a
        } else {
            gcd(b, a % b)
        }
    }

    if !amounts.iter().all(|a| (a - a.round()).abs() < 1e-8 && *a > 0.5) {
        return false;
    }
    let ints: Vec<u64> = amounts.iter().map(|a| a.round() as u64).collect();
    let divisor = ints.iter().copied().fold(0, gcd);
    divisor > 0 && ints.iter().all(|i| i / divisor == 1)
}

impl ChemEngine {
    /// Token with the phase tag and any supplementary bracket removed
    pub fn backbone<'t>(&self, text: &'t str) -> &'t str {
        let (_, rest) = self.separate_phase(text);
        match end_parentheses(rest) {
            Some((index, _)) if index > 0 => rest[..index].trim_end(),
            _ => rest,
        }
    }

    /// Accept a token as a compound formula containing the marker element.
    ///
    /// Variables, signs and slashes are removed and a strict composition is
    /// read from what remains. Formulas whose amounts all reduce to one, or
    /// that lack a transition metal while the profile requires one, are
    /// rejected. A formula with a vacancy is accepted without elements.
    pub fn compound_formula(&self, text: &str) -> Option<CompoundFormula> {
        let (phase, body) = self.separate_phase(text);
        let marker = self.profile.marker_element.as_str();
        if !body.contains(marker) {
            return None;
        }

        let mut candidate = body.to_string();
        if candidate.contains('%') {
            candidate = candidate
                .split(" % ")
                .find(|part| part.trim().parse::<f64>().is_err())
                .unwrap_or("")
                .to_string();
        }
        if candidate.contains(" (") {
            candidate = candidate.split(' ').next().unwrap_or("").to_string();
        }
        let (_, rest) = self.separate_phase(&candidate);
        let mut candidate: String = rest
            .chars()
            .filter(|c| !"xyz-+/·δ".contains(*c))
            .collect();
        if let Some(close) = candidate.find(')') {
            let followed_by_digit = candidate[close + 1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit());
            if !followed_by_digit {
                candidate.retain(|c| c != '(' && c != ')');
            }
        }

        let prefixed = |text: &str| {
            if phase.is_empty() {
                text.to_string()
            } else {
                format!("{phase}-{text}")
            }
        };

        match self.strict_composition(&candidate) {
            Some(composition) => {
                let amounts: Vec<f64> = composition.iter().map(|(_, a)| *a).collect();
                if reduces_to_units(&amounts) {
                    return None;
                }
                if self.profile.tm_limit
                    && !composition.iter().any(|(s, _)| is_transition_metal(s))
                {
                    return None;
                }
                Some(CompoundFormula {
                    text: prefixed(&candidate),
                    elements: composition.into_iter().map(|(s, _)| s).collect(),
                })
            }
            None if candidate.contains(crate::elements::VACANCY) => Some(CompoundFormula {
                text: prefixed(&candidate),
                elements: Vec::new(),
            }),
            None => None,
        }
    }

    pub(crate) fn classify_uncached(&self, text: &str) -> EntityTag {
        let unified = unify_brackets(text);
        let backbone = self.backbone(&unified);
        let cem = backbone.split(',').next().unwrap_or("");
        let tag = self.decide(cem);
        trace!(text, backbone = cem, tag = tag.as_str(), "Classified token");
        tag
    }

    fn decide(&self, cem: &str) -> EntityTag {
        if cem.is_empty() {
            return EntityTag::Other;
        }
        if is_element(cem) {
            return EntityTag::Element;
        }
        if element_by_name(cem).is_some() {
            return EntityTag::ElementName;
        }
        if is_polyatomic_ion(cem) {
            return EntityTag::PolyatomicIon;
        }
        if SIMPLE_COMPOUNDS.contains(&cem) {
            return EntityTag::SimpleCompound;
        }
        if is_word(cem) {
            return EntityTag::Other;
        }
        if cem.chars().count() == 1
            || cem.ends_with(['/', '+', '-'])
            || is_number_with_dots(cem)
            || cem.starts_with(|c: char| c == '+' || c == ':' || c.is_ascii_lowercase())
            || cem.contains([':', '@', '|', '/'])
        {
            return EntityTag::Other;
        }

        let shape = word_shape(cem);
        let likely_abbreviation = ABBREVIATION_SHAPES.iter().any(|s| shape.contains(s));
        if !likely_abbreviation && (shape.starts_with('d') || shape.contains("b.b")) {
            return EntityTag::Other;
        }
        if shape.contains("Xx-Xx-Xx") {
            return EntityTag::IrregularShape;
        }

        if !likely_abbreviation {
            if let Some(compound) = self.compound_formula(cem) {
                if !compound.elements.is_empty() {
                    return compound_tag(cem, &compound);
                }
            }
        }

        if cem.contains(['I', 'J', 'E']) {
            return EntityTag::Other;
        }
        if self.profile.solvent_names.iter().any(|s| cem.contains(s.as_str())) {
            return EntityTag::SolventNames;
        }
        if self.profile.raw_materials.iter().any(|s| cem.contains(s.as_str())) {
            return EntityTag::RawMaterial;
        }
        if self.profile.apparatus.iter().any(|a| a == cem) {
            return EntityTag::Apparatus;
        }
        if self.profile.other.iter().any(|o| o == cem)
            || OTHER_FRAGMENTS.iter().any(|f| cem.contains(f))
            || is_sample_code(cem)
        {
            return EntityTag::Other;
        }

        if !likely_abbreviation {
            if let Some(tag) = self.decide_by_composition(cem, &shape) {
                return tag;
            }
        }

        let bare_shape = matches!(shape.as_str(), "XX" | "Xd.d") && !cem.contains(['=', ',']);
        if likely_abbreviation || bare_shape {
            EntityTag::Abbreviation
        } else {
            EntityTag::Other
        }
    }

    fn decide_by_composition(&self, cem: &str, shape: &str) -> Option<EntityTag> {
        let marker = self.profile.marker_element.as_str();

        if let Some(composition) = self.strict_composition(cem) {
            let symbols: Vec<&str> = composition.iter().map(|(s, _)| s.as_str()).collect();
            let battery = symbols.iter().filter(|s| is_battery_family(s)).count();
            let organic = symbols.iter().all(|s| ORGANIC_ELEMENTS.contains(s));
            let has_oxygen = symbols.contains(&"O");

            if organic && symbols.len() == 3 {
                return Some(EntityTag::Solvent);
            }
            if (symbols.len() == 2 || battery == 1) && has_oxygen {
                return Some(EntityTag::RawMaterial);
            }
            if battery > 1 && !symbols.contains(&marker) {
                return Some(EntityTag::RawMaterial);
            }
            return None;
        }

        let mut parsed_empty = true;
        if cem.contains(marker) {
            let composition = self.parse(cem);
            let keys: Vec<&str> = composition.symbols().collect();
            if keys.len() > 2 && keys.contains(&"O") {
                if keys.contains(&"M") {
                    return Some(EntityTag::ElementVariables);
                }
                if keys.contains(&"TM") {
                    return Some(EntityTag::ElementVariablesTm);
                }
            } else {
                return Some(EntityTag::Abbreviation);
            }
            parsed_empty = keys.is_empty();
        }
        if shape.contains("Xx*Xx") {
            return Some(EntityTag::Other);
        }
        if cem.contains(marker) || cem.contains(self.profile.marker_initial()) {
            return Some(if parsed_empty {
                EntityTag::Abbreviation
            } else {
                EntityTag::RawMaterial
            });
        }
        None
    }
}

fn compound_tag(cem: &str, compound: &CompoundFormula) -> EntityTag {
    let transition_metals = compound
        .elements
        .iter()
        .filter(|e| is_transition_metal(e))
        .count();
    if transition_metals >= 2 && compound.text == compound.elements.concat() {
        return EntityTag::Abbreviation;
    }
    if cem.split('/').all(is_element) {
        return EntityTag::Synthetic;
    }
    if cem.split('-').all(|part| part.chars().count() <= 2) {
        return EntityTag::IrregularShape;
    }
    if !cem.contains('/') {
        return EntityTag::Synthetic;
    }
    EntityTag::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> EntityTag {
        crate::test_engine().classify(text)
    }

    #[test]
    fn test_word_shape() {
        assert_eq!(word_shape("NM00"), "XXdd");
        assert_eq!(word_shape("Na0·667"), "Xxd*ddd");
        assert_eq!(word_shape("(NMY-2)"), "bXXX-db");
        assert_eq!(word_shape("Mn-Na-Mn"), "Xx-Xx-Xx");
    }

    #[test]
    fn test_is_word() {
        assert!(is_word("Nalgene"));
        assert!(is_word("sodium-based"));
        assert!(!is_word("Na-ion"));
        assert!(!is_word("NaMnO2"));
    }

    #[test]
    fn test_reduces_to_units() {
        assert!(reduces_to_units(&[1.0, 1.0]));
        assert!(reduces_to_units(&[2.0, 2.0]));
        assert!(!reduces_to_units(&[1.0, 2.0]));
        assert!(!reduces_to_units(&[0.5, 0.5]));
    }

    #[test]
    fn test_compound_formula() {
        let engine = crate::test_engine();
        let compound = engine.compound_formula("P2-Na0.67Ni0.33Mn0.67O2").unwrap();
        assert_eq!(compound.text, "P2-Na0.67Ni0.33Mn0.67O2");
        assert_eq!(compound.elements, vec!["Na", "Ni", "Mn", "O"]);

        let templated = engine.compound_formula("Na0.67Mn1-xTixO2").unwrap();
        assert_eq!(templated.text, "Na0.67Mn1TiO2");

        assert!(engine.compound_formula("NaMn").is_none());
        assert!(engine.compound_formula("LiMnO2").is_none());
    }

    #[test]
    fn test_closed_vocabularies() {
        assert_eq!(classify("Na"), EntityTag::Element);
        assert_eq!(classify("sodium"), EntityTag::ElementName);
        assert_eq!(classify("PO4"), EntityTag::PolyatomicIon);
        assert_eq!(classify("NaCl"), EntityTag::SimpleCompound);
        assert_eq!(classify("PC"), EntityTag::Other);
        assert_eq!(classify("Na-ion"), EntityTag::Other);
        assert_eq!(classify("XRD"), EntityTag::Apparatus);
    }

    #[test]
    fn test_formulas() {
        assert_eq!(classify("C4H4O6KNa·4H2O"), EntityTag::Synthetic);
        assert_eq!(classify("Na0·667Mn0·667Ni0·333O2"), EntityTag::Synthetic);
        assert_eq!(classify("Na0.67Ni0.33Mn0.67O2"), EntityTag::Synthetic);
        assert_eq!(classify("P2-Na0.67[Ni0.33Mn0.67]O2"), EntityTag::Synthetic);
        assert_eq!(classify("P2-Na0.67(Ni0.33Mn0.67)O2"), EntityTag::Synthetic);
        assert_eq!(classify("Na2CO3R"), EntityTag::RawMaterial);
        assert_eq!(classify("NH4Cl"), EntityTag::RawMaterial);
    }

    #[test]
    fn test_abbreviations() {
        assert_eq!(classify("NM00"), EntityTag::Abbreviation);
        assert_eq!(classify("NCF"), EntityTag::Abbreviation);
        assert_eq!(classify("NCMTV"), EntityTag::Abbreviation);
        assert_eq!(classify("Na-N532"), EntityTag::Abbreviation);
        assert_eq!(classify("0-NMTO"), EntityTag::Abbreviation);
        assert_eq!(classify("P2/O3-NMT3"), EntityTag::Abbreviation);
        assert_eq!(classify("NaMnNiCuFeTiOF"), EntityTag::Abbreviation);
        assert_eq!(classify("Ti-doped-NNMOF"), EntityTag::Abbreviation);
    }

    #[test]
    fn test_other_shapes() {
        assert_eq!(classify("EC300J"), EntityTag::Other);
        assert_eq!(classify("Nalgene"), EntityTag::Other);
        assert_eq!(classify("No.166"), EntityTag::Other);
        assert_eq!(classify("No.54-0894"), EntityTag::Other);
        assert_eq!(classify("Mn-Na-Mn"), EntityTag::IrregularShape);
        assert_eq!(classify(""), EntityTag::Other);
    }

    #[test]
    fn test_templated_formulas() {
        assert_eq!(classify("Na0.67Mn0.5M0.5O2"), EntityTag::ElementVariables);
        assert_eq!(classify("Na(TM)O2"), EntityTag::ElementVariablesTm);
    }

    #[test]
    fn test_tag_serializes_as_label() {
        let json = serde_json::to_string(&EntityTag::ElementVariablesTm).unwrap();
        assert_eq!(json, "\"ElementVariables_TM\"");
        assert_eq!(EntityTag::Abbreviation.to_string(), "is_likely_abbreviation");
        assert!(EntityTag::Synthetic.is_formula());
        assert!(!EntityTag::RawMaterial.is_formula());
    }
}
