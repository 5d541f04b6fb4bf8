//! Variable expansion: concrete formulas from a templated composition
//!
//! A composition such as `Na3Ni2Sb1-xRuxO6` with `x = 0, 0.1` expands into
//! one formula per value; `Na0.67Mn0.5M0.5O2` with `M = Nb/Mo` expands into
//! one formula per candidate element. Amounts are divided by 3 when oxygen
//! is recorded as `O6`, so every formula reads on the `O2` basis.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::debug;

use crate::elements::{is_element, iupac_rank, VACANCY};
use crate::engine::ChemEngine;
use crate::expr::{format_number, Expr};
use crate::formula::{Composition, VariableValues};

const EPSILON: f64 = 1e-9;

/// Format an amount for a formula: unit amounts vanish, integral amounts
/// print as integers, anything else is rounded to two decimals. Amounts too
/// small for two decimals keep their significant digits instead of
/// collapsing to zero.
pub fn format_amount(value: f64) -> String {
    if (value - 1.0).abs() < EPSILON {
        return String::new();
    }
    if (value - value.trunc()).abs() < 1e-8 {
        return format!("{}", value.trunc() as i64);
    }
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "1" => String::new(),
        "0" | "-0" => format_number(value),
        _ => text.to_string(),
    }
}

/// Divisor that brings an `O6` formula onto the `O2` basis
fn oxygen_factor(composition: &Composition) -> f64 {
    match composition.amount("O").and_then(Expr::as_constant) {
        Some(v) if (v - 6.0).abs() < EPSILON => 3.0,
        _ => 1.0,
    }
}

fn with_phase(phase: &str, formula: String) -> String {
    if phase.is_empty() {
        formula
    } else {
        format!("{phase}-{formula}")
    }
}

fn join_sorted(mut parts: Vec<(String, String)>) -> Option<String> {
    let mut ranked = Vec::with_capacity(parts.len());
    for (symbol, amount) in parts.drain(..) {
        ranked.push((iupac_rank(&symbol)?, symbol, amount));
    }
    ranked.sort_by_key(|(rank, _, _)| *rank);
    Some(
        ranked
            .into_iter()
            .map(|(_, symbol, amount)| format!("{symbol}{amount}"))
            .collect(),
    )
}

fn parse_value(token: &str) -> Option<f64> {
    let token = token.trim().trim_end_matches('.');
    if token.is_empty() {
        return None;
    }
    if let Some(number) = token.strip_suffix('%') {
        return parse_value(number).map(|v| v / 100.0);
    }
    if let Some((numerator, denominator)) = token.split_once('/') {
        let numerator: f64 = numerator.trim().parse().ok()?;
        let denominator: f64 = denominator.trim().parse().ok()?;
        if denominator == 0.0 {
            return None;
        }
        return Some(numerator / denominator);
    }
    token.parse().ok().filter(|v: &f64| v.is_finite())
}

fn value_list(text: &str) -> Vec<f64> {
    let mut values = Vec::new();
    for token in text.split([',', ' ', '\t', '\n']).flat_map(|t| t.split("and")) {
        if let Some(v) = parse_value(token) {
            if !values.contains(&v) {
                values.push(v);
            }
        }
    }
    values
}

fn min_max(values: &[f64]) -> (Option<f64>, Option<f64>) {
    let min = values.iter().copied().reduce(f64::min);
    let max = values.iter().copied().reduce(f64::max);
    (min, max)
}

impl ChemEngine {
    /// Expand a composition using the values and candidates bound to it.
    ///
    /// A single bound stoichiometric variable takes priority; otherwise the
    /// first slot with candidates is expanded. Anything else yields nothing.
    pub fn expand(&self, composition: &Composition) -> Vec<String> {
        if let Some((variable, values)) = composition.amounts_x.iter().next() {
            if composition.amounts_x.len() == 1 && !values.values.is_empty() {
                return self.expand_variable(composition, *variable, &values.values);
            }
            return Vec::new();
        }
        composition
            .elements_x
            .iter()
            .find(|(_, candidates)| !candidates.is_empty())
            .map(|(slot, candidates)| self.expand_slot(composition, slot, candidates))
            .unwrap_or_default()
    }

    /// One concrete formula per value of `variable`.
    ///
    /// Zero amounts are dropped; a value that makes any amount negative is
    /// skipped.
    pub fn expand_variable(
        &self,
        composition: &Composition,
        variable: char,
        values: &[f64],
    ) -> Vec<String> {
        if composition.is_empty()
            || composition.amounts_x.len() != 1
            || !composition.amounts_x.contains_key(&variable)
        {
            return Vec::new();
        }
        let factor = oxygen_factor(composition);
        let mut formulas = Vec::with_capacity(values.len());

        'values: for &value in values {
            let mut bindings = BTreeMap::new();
            bindings.insert(variable, value);

            let mut parts = Vec::new();
            for (symbol, amount) in &composition.elements {
                if symbol.starts_with(VACANCY) {
                    continue;
                }
                let Ok(v) = amount.evaluate(&bindings) else {
                    return Vec::new();
                };
                if v.abs() < EPSILON {
                    continue;
                }
                if v < 0.0 {
                    debug!(formula = %composition.formula, value, "Negative amount after substitution");
                    continue 'values;
                }
                parts.push((symbol.clone(), format_amount(v / factor)));
            }

            match join_sorted(parts) {
                Some(formula) => formulas.push(with_phase(&composition.phase, formula)),
                None => return Vec::new(),
            }
        }
        formulas
    }

    /// One concrete formula per candidate element of `slot`
    pub fn expand_slot(
        &self,
        composition: &Composition,
        slot: &str,
        candidates: &[String],
    ) -> Vec<String> {
        if !composition.amounts_x.is_empty() {
            return Vec::new();
        }
        let Some(slot_value) = composition.amount(slot).and_then(Expr::as_constant) else {
            return Vec::new();
        };
        let factor = oxygen_factor(composition);

        let mut fixed = Vec::new();
        for (symbol, amount) in &composition.elements {
            if symbol == slot {
                continue;
            }
            let Some(v) = amount.as_constant() else {
                return Vec::new();
            };
            fixed.push((symbol.clone(), format_amount(v / factor)));
        }

        let slot_amount = format_amount(slot_value / factor);
        candidates
            .iter()
            .filter(|candidate| is_element(candidate))
            .filter_map(|candidate| {
                let mut parts = fixed.clone();
                match parts.iter_mut().find(|(s, _)| s == candidate) {
                    Some((_, amount)) => *amount = slot_amount.clone(),
                    None => parts.push((candidate.clone(), slot_amount.clone())),
                }
                join_sorted(parts)
            })
            .map(|formula| with_phase(&composition.phase, formula))
            .collect()
    }

    /// Values bound to `variable` in free text.
    ///
    /// Tried in order: an enumerated list (`x = 0, 0.1 and 0.2`), a hyphen
    /// range (`x = 0-0.3`), an inequality (`0 ≤ x ≤ 0.3`) and a
    /// `from a to b` phrase. The first form that yields anything wins.
    pub fn variable_values(&self, variable: char, text: &str) -> VariableValues {
        let sentence = text.replace(" - ", "-").replace(';', " ;");
        let var = regex::escape(&variable.to_string());

        let discrete = format!(r"{var}\s*=\s*(-?[0-9.,/and\s%]+)[\s)\],]");
        let hyphen = format!(r"{var}\s*=\s*([0-9.]+)\s*[-–]\s*([0-9.\s]+)[\s)\],m%]");
        let inequality = format!(r"([0-9.\s]*)\s*[<≤⩽]?\s*{var}\s*[<≤⩽>]\s*([0-9.\s]+)[\s)\].,]");
        let from_to = format!(r"{var}[a-z\s]*from\s([0-9./]+)\sto\s([0-9./]+)");

        if let Ok(re) = Regex::new(&discrete) {
            let mut values = Vec::new();
            for caps in re.captures_iter(&sentence) {
                for v in value_list(&caps[1]) {
                    if !values.contains(&v) {
                        values.push(v);
                    }
                }
            }
            if !values.is_empty() {
                let (min, max) = min_max(&values);
                return VariableValues { values, min, max };
            }
        }

        for pattern in [hyphen, inequality, from_to] {
            let Ok(re) = Regex::new(&pattern) else {
                continue;
            };
            if let Some(caps) = re.captures(&sentence) {
                let min = caps.get(1).and_then(|m| parse_value(m.as_str()));
                let max = caps.get(2).and_then(|m| parse_value(m.as_str()));
                if max.is_some() {
                    return VariableValues {
                        values: Vec::new(),
                        min,
                        max,
                    };
                }
            }
        }

        VariableValues::default()
    }

    /// Candidate elements bound to `slot` in free text, e.g. `M = Nb/Mo/Cr`
    pub fn slot_candidates(&self, slot: &str, text: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let mut from = 0;

        while let Some(offset) = text[from..].find(slot) {
            let mut cursor = from + offset + slot.len();
            from = cursor;

            let rest = &text[cursor..];
            cursor += rest.len() - rest.trim_start().len();
            match text[cursor..].chars().next() {
                Some(sign @ ('=' | ':')) => cursor += sign.len_utf8(),
                _ => continue,
            }
            let rest = &text[cursor..];
            cursor += rest.len() - rest.trim_start().len();

            let value_text = &text[cursor..];
            let end = value_text
                .find(|c: char| {
                    !(c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '+' | ',' | '/'))
                })
                .unwrap_or(value_text.len());
            let value = &value_text[..end];
            if value.is_empty() {
                continue;
            }
            from = cursor + end;

            for part in value.split([',', '/', ' ', '\t', '\n']) {
                let symbol = part.trim_end_matches(|c: char| c.is_ascii_digit());
                if is_element(symbol) && !candidates.iter().any(|c| c == symbol) {
                    candidates.push(symbol.to_string());
                }
            }
        }
        candidates
    }

    /// Expand `formula` with bindings read from surrounding `context`
    /// instead of its own supplementary bracket.
    pub fn expand_in_context(&self, formula: &str, context: &str) -> Vec<String> {
        let mut composition = (*self.parse(formula)).clone();
        if composition.is_empty() {
            return Vec::new();
        }
        self.bind_from_text(&mut composition, context);
        self.expand(&composition)
    }
}
