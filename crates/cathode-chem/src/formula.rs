//! Formula parsing: raw material text to an element composition
//!
//! The parser works in stages. A phase tag (`P2-`) and an oxygen
//! non-stoichiometry suffix (`O2-δ`) are split off first, `a(b+x)/c`
//! fragments are rewritten into plain algebra, and `(A,B)` placeholder
//! groups become the slot `M`. The remaining text is resolved by a
//! recursive-descent scan over bracket groups, each group's amounts being
//! multiplied by the group's trailing multiplier, and the bracket-free
//! residue is read token by token. Any unconsumed character voids the
//! whole parse.
//!
//! Failures never surface as errors: an unparsable formula yields an empty
//! [`Composition`].

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::brackets::{end_parentheses, unify_brackets};
use crate::elements::{
    element_by_name, is_element, is_single_letter_element, CHEMICAL_ACRONYMS, IONS, VACANCY,
};
use crate::engine::ChemEngine;
use crate::expr::{Expr, ExprError};
use crate::patterns::Patterns;

// ============================================================================
// Composition
// ============================================================================

/// Sign of an oxygen non-stoichiometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeficiencySign {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
    #[serde(rename = "±")]
    PlusMinus,
    #[serde(rename = "∓")]
    MinusPlus,
}

impl DeficiencySign {
    /// Unknown sign characters read as `±`
    pub fn from_char(c: char) -> Self {
        match c {
            '+' => Self::Plus,
            '-' => Self::Minus,
            '∓' => Self::MinusPlus,
            _ => Self::PlusMinus,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::PlusMinus => "±",
            Self::MinusPlus => "∓",
        }
    }
}

/// Documented deviation on the oxygen site, e.g. `O2-δ`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OxygenDeficiency {
    pub sign: DeficiencySign,
    /// Variable carrying the deviation, usually `δ`
    pub magnitude: String,
}

/// Values bound to a stoichiometric variable
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VariableValues {
    pub values: Vec<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl VariableValues {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.min.is_none() && self.max.is_none()
    }
}

/// Parsed formula.
///
/// Keys of `elements` are real element symbols or declared slots (keys of
/// `elements_x`); every variable in an amount is a key of `amounts_x`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Composition {
    /// Formula text the composition was read from, after preprocessing
    pub formula: String,
    pub phase: String,
    /// Element or slot symbol with its amount, in order of first appearance
    pub elements: Vec<(String, Expr)>,
    pub oxygen_deficiency: Option<OxygenDeficiency>,
    /// Free stoichiometric variables and any values bound to them
    pub amounts_x: BTreeMap<char, VariableValues>,
    /// Element-variable slots and their candidate elements
    pub elements_x: BTreeMap<String, Vec<String>>,
}

impl Composition {
    fn empty(formula: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            formula: formula.into(),
            phase: phase.into(),
            ..Self::default()
        }
    }

    fn single_element(formula: &str, symbol: &str) -> Self {
        Self {
            formula: formula.to_string(),
            elements: vec![(symbol.to_string(), Expr::constant(1.0))],
            ..Self::default()
        }
    }

    /// True when nothing could be read from the formula
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn amount(&self, symbol: &str) -> Option<&Expr> {
        self.elements
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, amount)| amount)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.amount(symbol).is_some()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|(s, _)| s.as_str())
    }

    /// Free stoichiometric variables in key order
    pub fn variables(&self) -> impl Iterator<Item = char> + '_ {
        self.amounts_x.keys().copied()
    }

    fn set_amount(&mut self, symbol: &str, amount: Expr) {
        match self.elements.iter_mut().find(|(s, _)| s == symbol) {
            Some((_, existing)) => *existing = amount,
            None => self.elements.push((symbol.to_string(), amount)),
        }
    }

    fn remove(&mut self, symbol: &str) -> Option<Expr> {
        let pos = self.elements.iter().position(|(s, _)| s == symbol)?;
        Some(self.elements.remove(pos).1)
    }

    fn clear(&mut self) {
        self.elements.clear();
        self.amounts_x.clear();
        self.elements_x.clear();
        self.oxygen_deficiency = None;
        self.phase.clear();
    }
}

// ============================================================================
// Amount scan
// ============================================================================

/// Amount read from a token: an expression, or a letter run that marks the
/// element as misread and drops it at the end
#[derive(Debug, Clone, PartialEq)]
enum Amount {
    Value(Expr),
    Word,
}

impl Amount {
    fn parse(text: &str) -> Result<Self, ExprError> {
        match Expr::parse(text) {
            Ok(expr) => Ok(Self::Value(expr)),
            Err(ExprError::Word(_)) => Ok(Self::Word),
            Err(e) => Err(e),
        }
    }

    fn times(&self, factor: &Amount) -> Amount {
        match (self, factor) {
            (Self::Value(a), Self::Value(b)) => Self::Value(a.mul(b)),
            _ => Self::Word,
        }
    }

    fn plus(&self, other: &Amount) -> Amount {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => Self::Value(a.add(b)),
            _ => Self::Word,
        }
    }
}

#[derive(Debug, Error)]
enum ScanError {
    #[error("unbalanced brackets")]
    Unbalanced,

    #[error("unparsed residue: {0}")]
    Residue(String),

    #[error("bad amount: {0}")]
    Amount(#[from] ExprError),
}

type Entries = Vec<(String, Amount)>;

fn merge(entries: &mut Entries, symbol: String, amount: Amount) {
    match entries.iter_mut().find(|(s, _)| *s == symbol) {
        Some((_, existing)) => *existing = existing.plus(&amount),
        None => entries.push((symbol, amount)),
    }
}

fn is_multiplier_char(c: char) -> bool {
    c.is_ascii_digit() || c.is_ascii_lowercase() || matches!(c, '-' | '*' | '.' | '+' | '/')
}

/// Resolve one bracket scope starting at `pos`.
///
/// Nested groups are resolved first and scaled by their multiplier; a group
/// without any element is unwrapped into the residue and its multiplier
/// dropped.
fn resolve_scope(
    patterns: &Patterns,
    chars: &[char],
    pos: &mut usize,
    nested: bool,
) -> Result<Entries, ScanError> {
    let mut entries = Entries::new();
    let mut residue = String::new();

    loop {
        match chars.get(*pos).copied() {
            None if nested => return Err(ScanError::Unbalanced),
            None => break,
            Some(')') if nested => {
                *pos += 1;
                break;
            }
            Some(')') => return Err(ScanError::Unbalanced),
            Some('(') => {
                *pos += 1;
                let inner_start = *pos;
                let group = resolve_scope(patterns, chars, pos, true)?;
                let inner: String = chars[inner_start..*pos - 1].iter().collect();

                let multiplier_start = *pos;
                while chars.get(*pos).is_some_and(|c| is_multiplier_char(*c)) {
                    *pos += 1;
                }
                let multiplier: String = chars[multiplier_start..*pos].iter().collect();

                if group.is_empty() {
                    residue.push_str(&inner);
                    continue;
                }
                let factor = if multiplier.is_empty() {
                    Amount::Value(Expr::constant(1.0))
                } else {
                    Amount::parse(&multiplier)?
                };
                for (symbol, amount) in group {
                    merge(&mut entries, symbol, amount.times(&factor));
                }
            }
            Some(c) => {
                residue.push(c);
                *pos += 1;
            }
        }
    }

    match scan_flat(patterns, &residue) {
        Ok(flat) => {
            for (symbol, amount) in flat {
                merge(&mut entries, symbol, amount);
            }
            Ok(entries)
        }
        // a group like `(1/3-x)` is an amount; the caller unwraps it
        Err(ScanError::Residue(_)) if nested && entries.is_empty() => Ok(Entries::new()),
        Err(e) => Err(e),
    }
}

/// Split a token into symbol and amount.
///
/// A capital with one lowercase letter is kept whole when it names an
/// element or a slot, otherwise only the capital is the symbol and the
/// lowercase letter joins the amount (`Nx` is `N` times `x`).
fn split_token(symbol: &str, suffix: &str) -> (String, String) {
    let whole = is_element(symbol)
        || matches!(symbol, "M" | "Ln" | "Me")
        || symbol.starts_with(VACANCY) && symbol.chars().count() == 1;
    if whole {
        return (symbol.to_string(), suffix.to_string());
    }
    let mut chars = symbol.chars();
    let head = chars.next().map(String::from).unwrap_or_default();
    (head, format!("{}{}", chars.as_str(), suffix))
}

/// Read a bracket-free fragment; leftover characters are an error
fn scan_flat(patterns: &Patterns, text: &str) -> Result<Entries, ScanError> {
    let mut entries = Entries::new();
    let mut residue = String::new();
    let mut consumed = 0;

    for caps in patterns.element_token.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        residue.push_str(&text[consumed..whole.start()]);
        consumed = whole.end();

        let (symbol, amount) = split_token(&caps[1], &caps[2]);
        let amount = if amount.is_empty() { "1" } else { amount.as_str() };
        merge(&mut entries, symbol, Amount::parse(amount)?);
    }
    residue.push_str(&text[consumed..]);

    if residue.trim().is_empty() {
        Ok(entries)
    } else {
        Err(ScanError::Residue(residue))
    }
}

fn has_lowercase_run(text: &str, length: usize) -> bool {
    let mut run = 0;
    for c in text.chars() {
        if c.is_ascii_lowercase() {
            run += 1;
            if run >= length {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

fn has_uppercase_run(text: &str, length: usize) -> bool {
    let mut run = 0;
    for c in text.chars() {
        if c.is_ascii_uppercase() {
            run += 1;
            if run >= length {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

fn is_upper_word(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
        && text
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(char::is_uppercase)
}

/// Letter-only abbreviations such as `NCF` read as formulas of single-letter
/// elements; these are rejected.
fn is_acronym(formula: &str, composition: &Composition) -> bool {
    if IONS.contains(&formula) {
        return false;
    }
    if IONS
        .iter()
        .any(|ion| ion.chars().count() > 1 && formula.contains(ion))
    {
        return false;
    }
    if composition.elements.len() == 2 && !composition.elements_x.is_empty() {
        return true;
    }

    let chars: Vec<char> = formula.chars().collect();
    let odd_capital = chars.windows(2).any(|w| {
        w[0].is_ascii_uppercase()
            && !is_single_letter_element(w[0])
            && !matches!(w[0], 'M' | 'L')
            && (w[1].is_ascii_uppercase() || w[1].is_ascii_digit() || w[1] == '-')
    });
    if odd_capital && !["RE", "OAC", "TM", "ME"].iter().any(|w| formula.contains(w)) {
        return true;
    }

    if composition
        .elements
        .iter()
        .all(|(symbol, amount)| is_upper_word(symbol) && amount.as_constant() == Some(1.0))
    {
        return true;
    }

    let single_slots = composition
        .elements_x
        .keys()
        .filter(|k| k.chars().count() == 1 && is_upper_word(k))
        .count();
    if single_slots > 1 {
        return true;
    }

    if chars.iter().all(|c| c.is_uppercase()) && chars.iter().any(|c| !is_single_letter_element(*c))
    {
        return true;
    }

    if has_uppercase_run(formula, 3) && !CHEMICAL_ACRONYMS.iter().any(|a| formula.contains(a)) {
        return true;
    }

    formula.starts_with("PV")
}

fn has_negative_amount(composition: &Composition) -> bool {
    composition
        .elements
        .iter()
        .any(|(_, amount)| amount.as_constant().is_some_and(|v| v < 0.0))
}

/// Collapse whitespace around `/` in a supplementary bracket
fn collapse_slashes(text: &str) -> String {
    text.replace(" / ", "/").replace(" /", "/").replace("/ ", "/")
}

// ============================================================================
// Parser stages
// ============================================================================

impl ChemEngine {
    /// Split a phase tag such as `P2`, `O3` or `P2/O3` off a material name.
    ///
    /// Returns the tag (empty when absent) and the rest, which starts at the
    /// first letter of the formula.
    pub fn separate_phase<'t>(&self, text: &'t str) -> (&'t str, &'t str) {
        split_phase(&self.patterns.phase, text)
    }

    /// Split the trailing oxygen non-stoichiometry off a formula, turning
    /// `NaMnO2-δ` into `NaMnO2` with sign `-` and magnitude `δ`.
    pub fn separate_oxygen_deficiency(&self, formula: &str) -> (String, Option<OxygenDeficiency>) {
        let chars: Vec<char> = formula.chars().collect();
        if chars.len() < 3 {
            return (formula.to_string(), None);
        }
        let last_two: String = chars[chars.len() - 2..].iter().collect();
        if is_element(&last_two) {
            return (formula.to_string(), None);
        }

        let trimmed = formula.trim_end_matches(')');
        let Some(caps) = self.patterns.oxygen_deficiency.captures(trimmed) else {
            return (formula.to_string(), None);
        };
        let (Some(whole), Some(sign)) = (caps.get(0), caps.get(1)) else {
            return (formula.to_string(), None);
        };

        let sign_char = sign.as_str().chars().next().unwrap_or('±');
        let oxygen = &trimmed[whole.start()..sign.start()];
        let magnitude = &trimmed[sign.end()..whole.end()];
        let cleaned = format!(
            "{}{}{}",
            &formula[..whole.start()],
            oxygen,
            &formula[whole.end()..]
        );

        (
            cleaned,
            Some(OxygenDeficiency {
                sign: DeficiencySign::from_char(sign_char),
                magnitude: magnitude.to_string(),
            }),
        )
    }

    /// Rewrite `a(b+x)/c` fragments as `a/c*b + a/c*x`, simplified.
    ///
    /// Missing terms default to 1 and a result starting with a negative term
    /// is reordered, so `(1-x)` becomes `1-x` and `(2x+y)` becomes `2*x+y`.
    pub fn make_fraction_conversion(&self, formula: &str) -> String {
        let mut updated = formula.to_string();

        for caps in self.patterns.fraction.captures_iter(formula) {
            let Some(whole) = caps.get(0) else { continue };
            let group = |i: usize| {
                caps.get(i)
                    .map(|m| m.as_str().trim_matches(|c| c == '(' || c == ')'))
                    .unwrap_or("")
            };
            let or = |value: &str, default: &str| {
                if value.is_empty() {
                    default.to_string()
                } else {
                    value.to_string()
                }
            };

            // denominator right after the match: `/3` or `3`
            let denominator: String = formula[whole.end()..]
                .trim_start_matches('/')
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();

            let a = or(group(1), "1");
            let b = or(group(2), "1");
            let x = or(group(3), "1");
            let s = or(group(4), "+");
            let d = or(group(5), "1");
            let y = or(group(6), "1");
            let c = or(&denominator, "1");

            let text = format!("{a}/{c}*{b}*{x}{s}{a}/{c}*{d}*{y}");
            let Ok(expr) = Expr::parse(&text) else {
                debug!(fragment = whole.as_str(), "Unreadable fraction fragment");
                continue;
            };

            let old = if denominator.is_empty() {
                whole.as_str().to_string()
            } else {
                format!("{}/{}", whole.as_str(), denominator)
            };
            updated = updated.replacen(&old, &expr.to_positive_first_string(), 1);
        }

        updated.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// Replace `(A,B)` or `(A/B)` placeholder groups by the slot `M` and
    /// return the candidates of the last group.
    pub fn convert_placeholder_groups(&self, formula: &str) -> (String, Vec<String>) {
        let mut updated = formula.to_string();
        let mut candidates = Vec::new();

        for m in self.patterns.placeholder_group.find_iter(formula) {
            candidates = m
                .as_str()
                .trim_matches(|c| c == '(' || c == ')')
                .split(['/', ','])
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            updated = updated.replacen(m.as_str(), "M", 1);
        }

        (updated, candidates)
    }

    /// Parse a material string, binding variables and slots from a trailing
    /// supplementary bracket such as `(x = 0, 0.1)` or `(M = Nb/Mo/Cr)`.
    pub(crate) fn parse_material(&self, text: &str) -> Composition {
        let unified = unify_brackets(text);
        let (material, supplement) = match end_parentheses(&unified) {
            Some((index, tail)) if index > 0 => {
                (unified[..index].trim_end(), collapse_slashes(tail))
            }
            _ => (unified.as_str(), String::new()),
        };
        if material.is_empty() {
            return Composition::empty(text, "");
        }

        if is_element(material) {
            return Composition::single_element(material, material);
        }
        if let Some(symbol) = element_by_name(material) {
            return Composition::single_element(material, symbol);
        }

        let mut composition = self.process_formula(material);
        if !supplement.is_empty() && !composition.is_empty() {
            self.bind_from_text(&mut composition, &supplement);
        }
        composition
    }

    /// Attach slot candidates and variable values found in `text`
    pub(crate) fn bind_from_text(&self, composition: &mut Composition, text: &str) {
        for (slot, candidates) in composition.elements_x.iter_mut() {
            let found = self.slot_candidates(slot, text);
            if !found.is_empty() {
                *candidates = found;
            }
        }
        for (variable, values) in composition.amounts_x.iter_mut() {
            let found = self.variable_values(*variable, text);
            if !found.is_empty() {
                *values = found;
            }
        }
    }

    fn process_formula(&self, material: &str) -> Composition {
        let formula: String = material.chars().filter(|c| !c.is_whitespace()).collect();
        let (phase, body) = split_phase(&self.patterns.formula_phase, &formula);
        let phase = phase.to_string();

        let (body, deficiency) = self.separate_oxygen_deficiency(body);
        let body = self.make_fraction_conversion(&body);
        let (body, candidates) = self.convert_placeholder_groups(&body);

        if has_lowercase_run(&body, 4) {
            debug!(formula = %material, "Rejected prose-like formula");
            return Composition::empty(body, phase);
        }

        let chars: Vec<char> = body.chars().collect();
        let mut pos = 0;
        let entries = match resolve_scope(&self.patterns, &chars, &mut pos, false) {
            Ok(entries) => entries,
            Err(e) => {
                if crate::brackets::bracket_level(&body) != 0 {
                    warn!(formula = %material, "Unbalanced brackets in formula");
                } else {
                    debug!(formula = %material, error = %e, "Unparsable formula");
                }
                return Composition::empty(body, phase);
            }
        };

        let mut composition = Composition::empty(body, phase);
        composition.oxygen_deficiency = deficiency;
        if !candidates.is_empty() {
            composition.elements_x.insert("M".to_string(), candidates);
        }

        for (symbol, amount) in entries {
            let Amount::Value(amount) = amount else { continue };
            if !is_element(&symbol) && !symbol.starts_with(VACANCY) {
                composition.elements_x.entry(symbol.clone()).or_default();
            }
            for variable in amount.variables() {
                composition.amounts_x.entry(variable).or_default();
            }
            composition.elements.push((symbol, amount));
        }

        refine_variables(&mut composition);

        if is_acronym(&composition.formula, &composition) || has_negative_amount(&composition) {
            debug!(formula = %material, "Rejected acronym or negative composition");
            composition.clear();
        }
        composition
    }

    /// Numeric-only parse with real elements, returning symbols and amounts
    /// in order of appearance.
    ///
    /// Accepts nested `(...)n` groups with numeric multipliers; any slot,
    /// variable or unknown symbol fails the parse.
    pub fn strict_composition(&self, text: &str) -> Option<Vec<(String, f64)>> {
        let mut formula = text.to_string();

        loop {
            let (range, expanded) = {
                let Some(caps) = self.patterns.strict_group.captures(&formula) else {
                    break;
                };
                let whole = caps.get(0)?;
                let factor = parse_number(&caps[2])?;
                let group = strict_flat(&self.patterns, &caps[1], factor)?;
                let expanded: String = group
                    .iter()
                    .map(|(symbol, amount)| format!("{symbol}{amount}"))
                    .collect();
                (whole.range(), expanded)
            };
            formula.replace_range(range, &expanded);
        }

        let composition = strict_flat(&self.patterns, &formula, 1.0)?;
        if composition.is_empty() {
            return None;
        }
        Some(composition)
    }
}

fn split_phase<'t>(pattern: &regex::Regex, text: &'t str) -> (&'t str, &'t str) {
    match pattern.captures(text) {
        Some(caps) => match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(phase)) => {
                // the match ends on the first capital of the formula
                let start = whole.end() - 1;
                (phase.as_str(), &text[start..])
            }
            _ => ("", text),
        },
        None => ("", text),
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(1.0);
    }
    text.parse::<f64>().ok()
}

fn strict_flat(patterns: &Patterns, text: &str, factor: f64) -> Option<Vec<(String, f64)>> {
    let mut composition: Vec<(String, f64)> = Vec::new();
    let mut residue = String::new();
    let mut consumed = 0;

    for caps in patterns.strict_token.captures_iter(text) {
        let whole = caps.get(0)?;
        residue.push_str(&text[consumed..whole.start()]);
        consumed = whole.end();

        let symbol = &caps[1];
        if !is_element(symbol) {
            return None;
        }
        let amount = parse_number(&caps[2])? * factor;
        match composition.iter_mut().find(|(s, _)| s == symbol) {
            Some((_, existing)) => *existing += amount,
            None => composition.push((symbol.to_string(), amount)),
        }
    }
    residue.push_str(&text[consumed..]);

    if residue.trim().is_empty() {
        Some(composition)
    } else {
        None
    }
}

/// Merge split slot names, then drop variables that only occur on oxygen
fn refine_variables(composition: &mut Composition) {
    for (first, second) in [("R", "E"), ("A", "E"), ("T", "M")] {
        let merged = format!("{first}{second}");
        if composition.elements_x.contains_key(first)
            && composition.elements_x.contains_key(second)
            && composition.formula.contains(&merged)
        {
            composition.elements_x.remove(first);
            composition.elements_x.remove(second);
            composition.elements_x.insert(merged.clone(), Vec::new());
            composition.remove(first);
            if let Some(amount) = composition.remove(second) {
                composition.set_amount(&merged, amount);
            }
        }
    }

    let oxygen_only: Vec<char> = composition
        .amounts_x
        .keys()
        .copied()
        .filter(|v| {
            let holders: Vec<&str> = composition
                .elements
                .iter()
                .filter(|(_, amount)| amount.contains_variable(*v))
                .map(|(symbol, _)| symbol.as_str())
                .collect();
            holders == ["O"]
        })
        .collect();

    for variable in oxygen_only {
        composition.amounts_x.remove(&variable);
        if let Some(oxygen) = composition.amount("O") {
            let mut reduced = oxygen.without_variable(variable);
            if reduced.is_zero() {
                reduced = Expr::constant(1.0);
            }
            composition.set_amount("O", reduced);
        }
        composition.formula = composition.formula.replace(variable, "");
        let magnitude = composition
            .oxygen_deficiency
            .take()
            .map(|d| d.magnitude)
            .unwrap_or_else(|| variable.to_string());
        composition.oxygen_deficiency = Some(OxygenDeficiency {
            sign: DeficiencySign::PlusMinus,
            magnitude,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_engine;

    fn amount_of(composition: &Composition, symbol: &str) -> String {
        composition
            .amount(symbol)
            .map(|a| a.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_separate_phase() {
        let engine = test_engine();
        assert_eq!(engine.separate_phase("P2-Na0.67MnO2"), ("P2", "Na0.67MnO2"));
        assert_eq!(engine.separate_phase("P2/O3-NMT3"), ("P2/O3", "NMT3"));
        assert_eq!(engine.separate_phase("NaMnO2"), ("", "NaMnO2"));
        assert_eq!(engine.separate_phase("Ti-doped-NNMOF"), ("", "Ti-doped-NNMOF"));
    }

    #[test]
    fn test_separate_oxygen_deficiency() {
        let engine = test_engine();
        let (formula, deficiency) = engine.separate_oxygen_deficiency("NaMnO2-δ");
        assert_eq!(formula, "NaMnO2");
        let deficiency = deficiency.unwrap();
        assert_eq!(deficiency.sign, DeficiencySign::Minus);
        assert_eq!(deficiency.magnitude, "δ");

        let (formula, deficiency) = engine.separate_oxygen_deficiency("NaMnO2");
        assert_eq!(formula, "NaMnO2");
        assert!(deficiency.is_none());

        // trailing two-letter element
        let (formula, deficiency) = engine.separate_oxygen_deficiency("NaMnO2-xCo");
        assert_eq!(formula, "NaMnO2-xCo");
        assert!(deficiency.is_none());
    }

    #[test]
    fn test_make_fraction_conversion() {
        let engine = test_engine();
        assert_eq!(
            engine.make_fraction_conversion("(Cu1/3Nb2/3)(1/4-y)Ti(3/4-x)Zr(x+y)O2"),
            "(Cu1/3Nb2/3)(1/4-y)Ti(3/4-x)Zrx+yO2"
        );
        assert_eq!(
            engine.make_fraction_conversion("Na0.67Mn(1-x)TixO2"),
            "Na0.67Mn1-xTixO2"
        );
        assert_eq!(engine.make_fraction_conversion("Zr(2x+y)O2"), "Zr2*x+yO2");
    }

    #[test]
    fn test_convert_placeholder_groups() {
        let engine = test_engine();
        let (formula, candidates) = engine.convert_placeholder_groups("Na(Mn,Ni)O2");
        assert_eq!(formula, "NaMO2");
        assert_eq!(candidates, vec!["Mn", "Ni"]);
    }

    #[test]
    fn test_nested_groups_sum() {
        let engine = test_engine();
        let composition = engine.parse_material("Ti(OCH(CH3)2)4");
        assert_eq!(amount_of(&composition, "C"), "12");
        assert_eq!(amount_of(&composition, "H"), "28");
        assert_eq!(amount_of(&composition, "O"), "4");
        assert_eq!(amount_of(&composition, "Ti"), "1");
    }

    #[test]
    fn test_group_multiplier_with_variable() {
        let engine = test_engine();
        let composition = engine.parse_material("(Cu1/3Nb2/3)1/4-yTi3/4-xZr(x+y)O2");
        assert_eq!(amount_of(&composition, "Ti"), "0.75-x");
        assert_eq!(amount_of(&composition, "Zr"), "x+y");
        let cu = composition.amount("Cu").unwrap();
        assert!((cu.constant_term() - 1.0 / 12.0).abs() < 1e-9);
        assert_eq!(composition.variables().collect::<Vec<_>>(), vec!['x', 'y']);
    }

    #[test]
    fn test_elementless_group_is_unwrapped() {
        let engine = test_engine();
        let composition = engine.parse_material("Na2/3Ni1/3Co(1/3-x)Mn1/3AlxO2");
        assert_eq!(amount_of(&composition, "Co"), "0.333333-x");
        assert!(composition.contains("Al"));
    }

    #[test]
    fn test_unparsable_formula_is_empty() {
        let engine = test_engine();
        assert!(engine.parse_material("NaMnO2·H2O").is_empty());
        assert!(engine.parse_material("sodium manganese").is_empty());
        assert!(engine.parse_material("Na)MnO2").is_empty());
    }

    #[test]
    fn test_single_element_and_name() {
        let engine = test_engine();
        let composition = engine.parse_material("N");
        assert_eq!(composition.symbols().collect::<Vec<_>>(), vec!["N"]);
        let composition = engine.parse_material("sodium");
        assert_eq!(composition.symbols().collect::<Vec<_>>(), vec!["Na"]);
    }

    #[test]
    fn test_acronyms_are_rejected() {
        let engine = test_engine();
        assert!(engine.parse_material("NCF").is_empty());
        assert!(engine.parse_material("NMT").is_empty());
        assert!(engine.parse_material("PVDF").is_empty());
        assert!(!engine.parse_material("NaMnO2").is_empty());
    }

    #[test]
    fn test_slots_and_merges() {
        let engine = test_engine();
        let composition = engine.parse_material("NaTM0.5Ti0.5O2");
        assert!(composition.elements_x.contains_key("TM"));
        assert!(!composition.elements_x.contains_key("T"));
        assert_eq!(amount_of(&composition, "TM"), "0.5");
    }

    #[test]
    fn test_oxygen_only_variable_becomes_deficiency() {
        let engine = test_engine();
        let composition = engine.parse_material("NaMnO2-2x");
        assert_eq!(amount_of(&composition, "O"), "2");
        assert!(composition.amounts_x.is_empty());
        assert_eq!(
            composition.oxygen_deficiency.map(|d| d.sign),
            Some(DeficiencySign::PlusMinus)
        );
    }

    #[test]
    fn test_supplement_binds_values() {
        let engine = test_engine();
        let composition = engine.parse_material("Na3Ni2Sb1-xRuxO6 (x=0, 0.1, 0.2, and 0.3)");
        assert_eq!(composition.amounts_x[&'x'].values, vec![0.0, 0.1, 0.2, 0.3]);
        assert_eq!(amount_of(&composition, "Sb"), "1-x");

        let composition = engine.parse_material("Na0.67Mn0.5M0.5O2 (M = Nb / Mo / Cr)");
        assert_eq!(composition.elements_x["M"], vec!["Nb", "Mo", "Cr"]);
    }

    #[test]
    fn test_bracket_glyphs_are_unified() {
        let engine = test_engine();
        let composition = engine.parse_material("Na0.67[Mn0.67Ni0.33]O2");
        assert!(!composition.is_empty());
        assert_eq!(amount_of(&composition, "Mn"), "0.67");
        assert_eq!(amount_of(&composition, "Ni"), "0.33");

        let curly = engine.parse_material("Na{Mn0.5Fe0.5}O2");
        assert_eq!(amount_of(&curly, "Fe"), "0.5");
    }

    #[test]
    fn test_scan_errors_describe_input() {
        let engine = test_engine();
        let chars: Vec<char> = "Na(Mn".chars().collect();
        let mut pos = 0;
        let err = resolve_scope(&engine.patterns, &chars, &mut pos, false).unwrap_err();
        assert_eq!(err.to_string(), "unbalanced brackets");

        let err = ScanError::Residue("qq".to_string());
        assert_eq!(err.to_string(), "unparsed residue: qq");
        let err = ScanError::from(ExprError::DivisionByZero);
        assert_eq!(err.to_string(), "bad amount: division by zero");
    }

    #[test]
    fn test_strict_composition() {
        let engine = test_engine();
        assert_eq!(
            engine.strict_composition("Na2CO3"),
            Some(vec![
                ("Na".to_string(), 2.0),
                ("C".to_string(), 1.0),
                ("O".to_string(), 3.0)
            ])
        );
        let nested = engine.strict_composition("Na0.67(Ni0.3Mn0.5Fe0.2)1ZrO2").unwrap();
        assert_eq!(nested.len(), 6);
        assert!(engine.strict_composition("NaNM").is_none());
        assert!(engine.strict_composition("Nalgene").is_none());
        assert!(engine.strict_composition("NaMnO2-x").is_none());
    }
}
