//! Abbreviation linking
//!
//! Walks the tagged sentences of a document introduction and pairs every
//! compound formula with the abbreviation the authors define for it, e.g.
//! `Na0.67Mn0.67Ni0.33O2 (NM)` or `NaNi0.4Mn0.25Ti0.3Co0.05O2-xFx
//! (denoted as NMTC-Fx, x = 0, 0.04 and 0.08)`. Templated formulas are
//! expanded into one concrete formula per value, and the values seen for
//! each templated formula are kept for later sentences.

use std::collections::HashMap;
use std::ops::Range;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cathode_chem::elements::POLYATOMIC_IONS;
use cathode_chem::expr::format_number;
use cathode_chem::{end_parentheses, match_group, search_group, ChemEngine, EntityTag, GroupMatch};
use cathode_core::{AbbreviationPair, LinkerConfig, Result, TaggedSentence};

use crate::scan::{char_before, compile};
use crate::tokenizer::{number, units_tokenize};

/// Characters stripped from both ends of a candidate token
const TOKEN_TRIM: &[char] = &['(', ',', '.', ';', '"', ')'];

/// Values seen for one templated formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableBinding {
    pub formula: String,
    pub values: Vec<f64>,
}

/// Everything the linker learned from one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbbreviationTable {
    /// Abbreviations defined by the authors, in order of definition
    pub abbreviations: Vec<AbbreviationPair>,
    /// Initials of every non-oxygen element, for formulas containing oxygen
    pub custom_abbreviations: Vec<AbbreviationPair>,
    /// Values bound to templated formulas
    pub stoichiometric_variables: Vec<VariableBinding>,
}

impl AbbreviationTable {
    pub fn is_empty(&self) -> bool {
        self.abbreviations.is_empty()
            && self.custom_abbreviations.is_empty()
            && self.stoichiometric_variables.is_empty()
    }
}

#[derive(Debug, Clone)]
struct LinkerPatterns {
    cue: Regex,
    hydro_suffix: Regex,
    polyatomic_tail: Regex,
    xyz_binding: Regex,
    variable_suffix: Regex,
    variable_prefix: Regex,
}

impl LinkerPatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            cue: compile(
                "name(?:d|ly)|marked|noted|labeled|denoted|identified|referred|abbreviated",
            )?,
            hydro_suffix: compile(r"(?i:-(hydro))")?,
            polyatomic_tail: compile(&format!(r"\(({})\)$", POLYATOMIC_IONS.join("|")))?,
            xyz_binding: compile(r"(\b[xyz]\b)\s*=([0-9.,and\s%]+)")?,
            variable_suffix: compile(r"([A-Z]+)(-?[^-xyz]*)([xyz])")?,
            variable_prefix: compile(r"([xyz])(-?)([A-Z]+)")?,
        })
    }
}

/// Pairs found around one entity span
#[derive(Debug, Default)]
struct Linked {
    abbreviations: Vec<String>,
    formulas: Vec<String>,
    /// Stop scanning the rest of the sentence
    stop: bool,
}

impl Linked {
    fn extend(&mut self, abbreviations: Vec<String>, formulas: Vec<String>) {
        self.abbreviations.extend(abbreviations);
        self.formulas.extend(formulas);
    }
}

/// Where an entity sits in its sentence
struct SpanContext<'s> {
    sentences: &'s [TaggedSentence],
    index: usize,
    num: usize,
    formula: String,
    /// Local offsets of the entity, after boundary rectification
    start: usize,
    end: usize,
    /// Offset of the trailing bracket within the formula and whether it is balanced
    tail: Option<usize>,
    balanced: bool,
    adjacent: Option<usize>,
    elements: Vec<String>,
}

impl SpanContext<'_> {
    fn sentence(&self) -> &TaggedSentence {
        &self.sentences[self.index]
    }

    fn text(&self) -> &str {
        &self.sentences[self.index].text
    }

    fn paren_begin(&self) -> Option<usize> {
        self.tail.filter(|&i| i > 0)
    }
}

/// Links abbreviations to formulas
#[derive(Debug, Clone)]
pub struct AbbreviationLinker {
    engine: ChemEngine,
    config: LinkerConfig,
    patterns: LinkerPatterns,
}

impl AbbreviationLinker {
    pub fn new(engine: ChemEngine, config: LinkerConfig) -> Result<Self> {
        Ok(Self {
            engine,
            config,
            patterns: LinkerPatterns::new()?,
        })
    }

    /// Link every sentence of `sentences` in order
    pub fn link(&self, sentences: &[TaggedSentence]) -> AbbreviationTable {
        let mut table = AbbreviationTable::default();

        for index in 0..sentences.len() {
            let linked = self.link_sentence(sentences, index, &mut table);

            // a later pair for the same abbreviation replaces an earlier one
            let mut pairs: Vec<(String, String)> = Vec::new();
            for (abbreviation, formula) in linked.abbreviations.into_iter().zip(linked.formulas) {
                match pairs.iter_mut().find(|(a, _)| *a == abbreviation) {
                    Some(pair) => pair.1 = formula,
                    None => pairs.push((abbreviation, formula)),
                }
            }

            for (abbreviation, formula) in pairs {
                let formula = self.engine.normalize(&formula);
                if self.relevance(&abbreviation, &formula)
                    && self.is_new_pair(&table, &abbreviation, &formula)
                {
                    debug!(abbreviation = %abbreviation, formula = %formula, "Linked abbreviation");
                    table
                        .abbreviations
                        .push(AbbreviationPair::new(abbreviation, formula));
                }
            }
        }

        info!(
            abbreviations = table.abbreviations.len(),
            custom = table.custom_abbreviations.len(),
            variables = table.stoichiometric_variables.len(),
            "Abbreviation linking complete"
        );
        table
    }

    fn link_sentence(
        &self,
        sentences: &[TaggedSentence],
        index: usize,
        table: &mut AbbreviationTable,
    ) -> Linked {
        let sentence = &sentences[index];
        let mut found = Linked::default();

        for (num, span) in sentence.spans.iter().enumerate() {
            let label = self.engine.classify(&span.text);

            if label == EntityTag::Abbreviation && span.text.contains(" (") {
                if let Some((abbreviation, formula)) = span.text.split_once(' ') {
                    let formula = formula.trim_matches(|c| matches!(c, '(' | ')' | ' '));
                    if self.engine.classify(formula) == EntityTag::Synthetic {
                        found.abbreviations.push(abbreviation.to_string());
                        found.formulas.push(formula.to_string());
                    }
                }
                continue;
            }
            if !matches!(label, EntityTag::Synthetic | EntityTag::ElementVariables) {
                continue;
            }

            let (formula, formula_end) = self.rectify(sentence, &span.text, span.end);
            let elements = self.record_custom_abbreviation(&formula, table);

            let tail = end_parentheses(&formula);
            let balanced = tail.is_some_and(|(_, group)| cathode_chem::bracket_level(group) == 0);

            let end = sentence.local(formula_end);
            let mut adjacent = None;
            if formula_end + 1 == sentence.end {
                if !balanced {
                    break;
                }
            } else if sentence.byte_at(end + 1) == Some(b'(') {
                adjacent = Some(end + 1);
            } else if sentence.byte_at(end) == Some(b'(') {
                adjacent = Some(end);
            }

            let context = SpanContext {
                sentences,
                index,
                num,
                start: sentence.local(span.start),
                end,
                tail: tail.map(|(i, _)| i),
                balanced,
                adjacent,
                elements,
                formula,
            };

            let linked = if context.formula.contains(['x', 'y', 'z']) {
                self.link_templated(context, table)
            } else if label == EntityTag::ElementVariables {
                self.link_slotted(&context)
            } else {
                self.link_concrete(&context, &span.text)
            };

            let stop = linked.stop;
            found.extend(linked.abbreviations, linked.formulas);
            if stop {
                break;
            }
        }
        found
    }

    /// Extend a formula cut before a digit that follows a polyatomic ion,
    /// as in `Na3V2(PO4)3`.
    fn rectify(&self, sentence: &TaggedSentence, formula: &str, end: usize) -> (String, usize) {
        if self.patterns.polyatomic_tail.is_match(formula) {
            if let Some(digit) = sentence.byte_at(sentence.local(end)).filter(u8::is_ascii_digit) {
                return (format!("{formula}{}", digit as char), end + 1);
            }
        }
        (formula.to_string(), end)
    }

    /// Record the initials of a formula's non-oxygen elements as a custom
    /// abbreviation; returns every element of the formula.
    fn record_custom_abbreviation(&self, formula: &str, table: &mut AbbreviationTable) -> Vec<String> {
        let Some(compound) = self.engine.compound_formula(formula) else {
            return Vec::new();
        };
        let mut elements = compound.elements;
        if let Some(oxygen) = elements.iter().position(|e| e == "O") {
            elements.remove(oxygen);
            let initials: String = elements.iter().filter_map(|e| e.chars().next()).collect();
            let pair = AbbreviationPair::new(initials, formula);
            if !table.custom_abbreviations.contains(&pair) {
                table.custom_abbreviations.push(pair);
            }
        }
        elements
    }

    /// Formulas with stoichiometric variables
    fn link_templated(&self, mut context: SpanContext<'_>, table: &mut AbbreviationTable) -> Linked {
        let mut linked = Linked::default();

        if context.balanced {
            // supplementary bracket inside the entity
            let (formulas, _) = self.expand_variables(&context.formula);
            if formulas.is_empty() {
                return linked;
            }
            let from = context.start + context.tail.unwrap_or(0);
            let tokens = context.sentence().tail(from).split_whitespace();
            let abbreviations = self.tagged_tokens(tokens, EntityTag::Abbreviation, formulas.len());
            if !abbreviations.is_empty() {
                linked.extend(abbreviations, formulas);
            }
        } else if let Some(adjacent) = context.adjacent {
            // bracket right after the entity
            let text = context.text();
            if let Some(group) = match_group(&text[adjacent..]).filter(|g| g.inner.contains('=')) {
                if let Some((formulas, abbreviations)) =
                    self.near_supplement(&context.formula, adjacent, group, text, table)
                {
                    linked.extend(abbreviations, formulas);
                }
            }
        } else if let Some(paren_begin) = context.paren_begin() {
            // unbalanced bracket cut by the tagger
            let adjacent = context.start + paren_begin;
            context.formula.truncate(paren_begin);
            let text = context.text();
            let Some(rest) = text.get(adjacent..) else {
                return linked;
            };
            if let Some(group) = match_group(rest).filter(|g| g.inner.contains('=')) {
                if let Some((formulas, abbreviations)) =
                    self.near_supplement(&context.formula, adjacent, group, text, table)
                {
                    linked.extend(abbreviations, formulas);
                }
            }
        } else {
            // a distant bracket, or a naming verb
            let find_text = context.sentence().tail(context.end);
            match search_group(find_text).filter(|g| g.inner.contains('=')) {
                Some(group) => {
                    let next = context.sentences.get(context.index + 1);
                    let last_string = next.map(|s| s.text.as_str()).unwrap_or(group.inner);
                    let (formulas, values) = self
                        .expand_variables(&format!("{}{}", context.formula, group.text.replace('X', "x")));
                    linked.formulas = formulas;

                    let parts: Vec<&str> = self.patterns.cue.split(last_string).collect();
                    if parts.len() >= 2 {
                        let tokens = parts[parts.len() - 1].split_whitespace();
                        linked.abbreviations =
                            self.tagged_tokens(tokens, EntityTag::Abbreviation, usize::MAX);
                    } else {
                        for token in group.inner.split_whitespace() {
                            let token = token.trim_matches(TOKEN_TRIM);
                            if self.engine.classify(token) != EntityTag::Abbreviation {
                                continue;
                            }
                            if self.variable_abbreviation(token).is_some() {
                                linked
                                    .abbreviations
                                    .extend(self.convert_variable_abbreviation(&values, token));
                                break;
                            }
                            linked.abbreviations.push(token.to_string());
                        }
                    }
                }
                None => {
                    if self.patterns.cue.is_match(find_text) {
                        if let Some((abbreviations, formulas)) =
                            self.abbreviations_and_formulas(find_text)
                        {
                            linked.extend(abbreviations, formulas);
                            linked.stop = true;
                        }
                    }
                }
            }
        }
        linked
    }

    /// Formulas with an element slot, e.g. `NaNi0.45Mn0.3Ti0.2M0.05O2 (M=Nb/Mo/Cr, ...)`
    fn link_slotted(&self, context: &SpanContext<'_>) -> Linked {
        let mut linked = Linked::default();
        let text = context.text();
        let start_find = context
            .paren_begin()
            .map(|p| context.start + p)
            .unwrap_or(context.end);
        let Some(find_text) = text.get(start_find..) else {
            return linked;
        };

        if let Some(group) = search_group(find_text).filter(|g| g.inner.contains('=')) {
            let abbreviations = self.tagged_tokens(
                group.inner.split_whitespace(),
                EntityTag::Abbreviation,
                usize::MAX,
            );
            if !abbreviations.is_empty() {
                let head = text.get(context.start..start_find).unwrap_or("");
                let formulas = self.expand_slot(&format!("{head}{}", group.text));
                linked.extend(abbreviations, formulas);
            }
        }
        linked
    }

    /// Formulas with constant stoichiometry
    fn link_concrete(&self, context: &SpanContext<'_>, original: &str) -> Linked {
        let mut linked = Linked::default();
        let sentence = context.sentence();
        let text = context.text();
        let formula = context.formula.as_str();
        let next_span = sentence.spans.get(context.num + 1);

        if let (Some(_), Some(next)) = (context.adjacent, next_span) {
            let formula_end = sentence.start + context.end;
            if !context.elements.is_empty()
                && next.start <= formula_end + self.config.adjacent_gap
                && self.engine.classify(&next.text) == EntityTag::Abbreviation
            {
                let initials = context
                    .elements
                    .iter()
                    .filter_map(|e| e.chars().next())
                    .filter(|c| next.text.contains(*c))
                    .count();
                if initials == context.elements.len() || self.relevance(&next.text, original) {
                    let abbreviation = next.text.trim_matches(['(', ')']);
                    let abbreviation = abbreviation.split('(').next().unwrap_or("").trim_end();
                    linked.abbreviations.push(abbreviation.to_string());
                    linked.formulas.push(formula.to_string());
                }
                return linked;
            }
        }

        if let Some(paren_begin) = context.paren_begin() {
            let Some(rest) = text.get(context.start + paren_begin..) else {
                return linked;
            };
            if let Some(group) = match_group(rest) {
                let abbreviations = self.tagged_tokens(
                    group.inner.split_whitespace(),
                    EntityTag::Abbreviation,
                    usize::MAX,
                );
                if !abbreviations.is_empty() {
                    let head = formula.get(..paren_begin).unwrap_or(formula).trim_end();
                    linked.extend(abbreviations, vec![head.to_string()]);
                }
            }
            return linked;
        }

        let find_text = sentence.tail(context.end);
        match search_group(find_text) {
            Some(group) if !group.inner.contains('=') => {
                let abbreviations =
                    self.tagged_tokens(group.inner.split_whitespace(), EntityTag::Abbreviation, 1);
                if !abbreviations.is_empty() {
                    linked.extend(abbreviations, vec![formula.to_string()]);
                } else if self.patterns.cue.is_match(text) {
                    if let Some((abbreviations, formulas)) = self.abbreviations_and_formulas(text) {
                        linked.extend(abbreviations, formulas);
                    }
                    linked.stop = true;
                }
            }
            Some(group) if sentence.byte_at(context.end + 1) == Some(b'(') => {
                let abbreviations =
                    self.tagged_tokens(group.inner.split_whitespace(), EntityTag::Abbreviation, 1);
                if !abbreviations.is_empty() {
                    linked.extend(abbreviations, vec![formula.to_string()]);
                }
            }
            _ => {
                let right_len = sentence.end.saturating_sub(sentence.start + context.end);
                let enclosing = find_abbreviation_both_sides(
                    context.start,
                    context.end,
                    right_len,
                    text,
                    self.config.search_window,
                );
                match enclosing.filter(|inside| !inside.is_empty()) {
                    Some(inside) => {
                        let abbreviations =
                            self.tagged_tokens(inside.split_whitespace(), EntityTag::Abbreviation, 1);
                        if !abbreviations.is_empty() {
                            linked.extend(abbreviations, vec![formula.to_string()]);
                        }
                    }
                    None if self.patterns.cue.is_match(text) => {
                        if let Some((abbreviations, formulas)) = self.abbreviations_and_formulas(text) {
                            if abbreviations == formulas {
                                linked.stop = true;
                                linked.extend(abbreviations, formulas);
                            } else {
                                let n = abbreviations.len().min(formulas.len());
                                linked.extend(abbreviations[..n].to_vec(), formulas);
                            }
                        }
                    }
                    None => {}
                }
            }
        }
        linked
    }

    /// Resolve the bracket following a templated formula, such as
    /// `(x = 0, 0.04 and 0.08, denoted as NMTC-Fx)`.
    fn near_supplement(
        &self,
        formula: &str,
        adjacent: usize,
        group: GroupMatch<'_>,
        text: &str,
        table: &mut AbbreviationTable,
    ) -> Option<(Vec<String>, Vec<String>)> {
        let (supplement, span) = self.xyz_supplement(group.text).unwrap_or_default();
        let (front, after) = if span.is_empty() {
            ("", "")
        } else {
            (
                group.text.get(..span.start).unwrap_or(""),
                group.text.get(span.end..).unwrap_or(""),
            )
        };

        let (formulas, mut values) = self.expand_variables(&format!("{formula}{supplement}"));
        self.record_variables(table, formula.trim(), &values);

        let mut abbreviations = Vec::new();
        let mut detected = self.detect_variable_abbreviation(after, &mut abbreviations);
        if detected.is_none() && abbreviations.len() != formulas.len() {
            detected = self.detect_variable_abbreviation(front, &mut abbreviations);
        }
        if let Some((token, stated)) = detected {
            if !stated.is_empty() {
                values = stated;
            }
            abbreviations = self.convert_variable_abbreviation(&values, &token);
        }

        if abbreviations.is_empty() {
            let last = text.get(adjacent + group.end..).unwrap_or("");
            let parts: Vec<&str> = self.patterns.cue.split(last).collect();
            if parts.len() == 2 {
                abbreviations.extend(self.tagged_tokens(
                    parts[1].split_whitespace(),
                    EntityTag::Abbreviation,
                    usize::MAX,
                ));
            }
        }

        (!formulas.is_empty() && !abbreviations.is_empty()).then_some((formulas, abbreviations))
    }

    /// Keep the longest value list seen for a templated formula
    fn record_variables(&self, table: &mut AbbreviationTable, formula: &str, values: &[f64]) {
        let backbone = self.engine.separate_phase(formula).1;
        for binding in &mut table.stoichiometric_variables {
            if binding.formula == formula || self.engine.separate_phase(&binding.formula).1 == backbone {
                if values.len() > binding.values.len() {
                    binding.values = values.to_vec();
                }
                return;
            }
        }
        table.stoichiometric_variables.push(VariableBinding {
            formula: formula.to_string(),
            values: values.to_vec(),
        });
    }

    /// Scan `text` for an abbreviation carrying a variable (`NMTC-Fx`),
    /// collecting plain abbreviations seen before it into `plain`.
    ///
    /// Returns the variable abbreviation and any values stated with it.
    fn detect_variable_abbreviation(
        &self,
        text: &str,
        plain: &mut Vec<String>,
    ) -> Option<(String, Vec<f64>)> {
        let mut found: Option<String> = None;
        let mut variable_at = 0usize;
        let mut equals_at = 0usize;
        let mut values = Vec::new();

        for (index, raw) in text.split_whitespace().enumerate() {
            let token = raw.trim_matches(TOKEN_TRIM);
            if found.is_none() && self.engine.classify(token) == EntityTag::Abbreviation {
                if self.variable_abbreviation(token).is_some() {
                    found = Some(token.to_string());
                } else {
                    plain.push(token.to_string());
                }
            } else if matches!(token, "x" | "y" | "z") {
                variable_at = index;
            } else if token.contains('=') {
                if token == "=" && index == variable_at + 1 {
                    equals_at = index;
                } else {
                    variable_at = 1;
                    equals_at = 1;
                    if let Some(value) = token.rsplit('=').next().and_then(number) {
                        values.push(value);
                    }
                }
            } else if variable_at != 0 && equals_at != 0 {
                if let Some(value) = number(token) {
                    values.push(value);
                }
            }
        }
        found.map(|token| (token, values))
    }

    /// Split `NMTC-Fx` into `("NMTC", "-F", "x")` or `x-NMTO` into `("x", "-", "NMTO")`
    fn variable_abbreviation(&self, token: &str) -> Option<(String, String, String)> {
        [&self.patterns.variable_suffix, &self.patterns.variable_prefix]
            .into_iter()
            .find_map(|pattern| pattern.captures(token))
            .map(|caps| {
                (
                    caps[1].to_string(),
                    caps[2].trim_end().to_string(),
                    caps[3].to_string(),
                )
            })
    }

    /// One concrete abbreviation per value of its variable
    fn convert_variable_abbreviation(&self, values: &[f64], token: &str) -> Vec<String> {
        let Some((head, middle, tail)) = self.variable_abbreviation(token) else {
            return Vec::new();
        };
        let mut abbreviations = Vec::new();
        if matches!(tail.as_str(), "x" | "y" | "z") {
            for &value in values {
                if value == 0.0 {
                    if !abbreviations.contains(&head) {
                        abbreviations.push(head.clone());
                    }
                } else {
                    abbreviations.push(format!("{head}{middle}{}", format_number(value)));
                }
            }
        } else {
            for &value in values {
                abbreviations.push(format!("{}{middle}{tail}", format_number(value)));
            }
        }
        abbreviations
    }

    /// The first variable binding in `text`, rendered as a supplementary
    /// bracket such as ` (x=0, 0.1)`, with the span it was read from.
    fn xyz_supplement(&self, text: &str) -> Option<(String, Range<usize>)> {
        let text = text.replace('X', "x");
        let caps = self.patterns.xyz_binding.captures(&text)?;
        let variable = caps.get(1)?.as_str();
        let group = caps.get(2)?;

        // the bound values must not run into a word
        let mut end = group.end();
        while end > group.start() && text[end..].chars().next().is_some_and(is_word_char) {
            end -= char_before(&text, end).map_or(1, char::len_utf8);
        }
        if end == group.start() {
            return None;
        }

        let values_text = &text[group.start()..end];
        let tokens = units_tokenize(values_text);
        let mut values: Vec<String> = Vec::new();
        if values_text.contains('%') {
            for pair in tokens.windows(2) {
                if pair[1] != "%" {
                    continue;
                }
                if let Some(v) = number(pair[0]) {
                    let value = format_number(v / 100.0);
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
            }
        } else {
            for token in tokens {
                if number(token).is_some_and(|v| v < 10.0) && !values.iter().any(|v| v == token) {
                    values.push(token.to_string());
                }
            }
        }

        if values.is_empty() {
            return None;
        }
        let start = caps.get(0)?.start();
        Some((format!(" ({variable}={})", values.join(", ")), start..end))
    }

    /// Expand a formula with exactly one stoichiometric variable
    fn expand_variables(&self, text: &str) -> (Vec<String>, Vec<f64>) {
        let composition = self.engine.parse(text);
        if composition.amounts_x.len() != 1 {
            return (Vec::new(), Vec::new());
        }
        let Some((variable, values)) = composition.amounts_x.iter().next() else {
            return (Vec::new(), Vec::new());
        };
        (
            self.engine.expand_variable(&composition, *variable, &values.values),
            values.values.clone(),
        )
    }

    /// Expand a formula whose `M` slot is bound to candidate elements
    fn expand_slot(&self, text: &str) -> Vec<String> {
        let composition = self.engine.parse(text);
        if !composition.amounts_x.is_empty() {
            return Vec::new();
        }
        match composition.elements_x.get("M") {
            Some(candidates) => self.engine.expand_slot(&composition, "M", candidates),
            None => Vec::new(),
        }
    }

    /// Tokens carrying `tag`, at most `limit` of them
    fn tagged_tokens<'t>(
        &self,
        tokens: impl Iterator<Item = &'t str>,
        tag: EntityTag,
        limit: usize,
    ) -> Vec<String> {
        tokens
            .map(|token| token.trim_matches(TOKEN_TRIM))
            .filter(|token| self.engine.classify(token) == tag)
            .take(limit)
            .map(str::to_string)
            .collect()
    }

    /// All abbreviations and concrete formulas of `text`, if it has both
    fn abbreviations_and_formulas(&self, text: &str) -> Option<(Vec<String>, Vec<String>)> {
        let mut abbreviations = Vec::new();
        let mut formulas = Vec::new();
        for token in text.split_whitespace() {
            let token = token.trim_matches(TOKEN_TRIM);
            match self.engine.classify(token) {
                EntityTag::Abbreviation => {
                    abbreviations.push(token.split('(').next().unwrap_or(token).to_string())
                }
                EntityTag::Synthetic if !token.contains(['x', 'y', 'z']) => {
                    formulas.push(token.to_string())
                }
                _ => {}
            }
        }
        (!abbreviations.is_empty() && !formulas.is_empty()).then_some((abbreviations, formulas))
    }

    /// Whether `abbreviation` plausibly abbreviates `formula`.
    ///
    /// Phase tags must agree when both carry one. Each capital of the
    /// abbreviation other than `O` consumes matching capitals of the
    /// formula; the pair is relevant when at most one unit of the threshold
    /// is left over. A capital without a counterpart is only tolerated near
    /// the end of a multi-letter abbreviation. Parts separated by `-` are
    /// tried independently.
    pub fn relevance(&self, abbreviation: &str, formula: &str) -> bool {
        let abbreviation = match self.patterns.hydro_suffix.find(abbreviation) {
            Some(m) => &abbreviation[..m.start()],
            None => abbreviation,
        };

        let (abbreviation_phase, abbreviation_body) = self.engine.separate_phase(abbreviation);
        let (formula_phase, formula_body) = self.engine.separate_phase(formula);
        if !abbreviation_phase.is_empty()
            && !formula_phase.is_empty()
            && abbreviation_phase != formula_phase
        {
            return false;
        }
        if abbreviation.chars().count() > formula.chars().count()
            || abbreviation.contains(['x', 'y', 'z'])
        {
            return false;
        }

        let formula_counts = capital_counts(formula_body);
        abbreviation_body
            .split('-')
            .any(|part| self.part_relevance(part, &formula_counts))
    }

    fn part_relevance(&self, part: &str, formula_counts: &HashMap<char, i32>) -> bool {
        let counts = ordered_capital_counts(part);
        let n = counts.len();
        let end_tolerance = if part.ends_with('0') { 2 } else { 0 };
        let mut threshold = self.config.relevance_threshold;

        for (ind, (capital, count)) in counts.iter().enumerate() {
            if *capital == 'O' {
                continue;
            }
            let same = (*count).min(formula_counts.get(capital).copied().unwrap_or(0));
            if same > 0 {
                threshold -= same;
            } else if n == 1 || (threshold != 0 && ind + 1 + end_tolerance < n) {
                return false;
            }
        }
        threshold <= 1
    }

    /// A pair is new unless one with the same phase and backbones exists
    fn is_new_pair(&self, table: &AbbreviationTable, abbreviation: &str, formula: &str) -> bool {
        let phase_of = |abbreviation: &str, formula: &str| -> String {
            let phase = self.engine.separate_phase(abbreviation).0;
            if phase.is_empty() {
                self.engine.separate_phase(formula).0.to_string()
            } else {
                phase.to_string()
            }
        };
        let phase = phase_of(abbreviation, formula);
        let abbreviation_body = self.engine.separate_phase(abbreviation).1;
        let formula_body = self.engine.separate_phase(formula).1;

        !table.abbreviations.iter().any(|pair| {
            phase_of(&pair.abbreviation, &pair.formula) == phase
                && self.engine.separate_phase(&pair.abbreviation).1 == abbreviation_body
                && self.engine.separate_phase(&pair.formula).1 == formula_body
        })
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn capital_counts(text: &str) -> HashMap<char, i32> {
    let mut counts = HashMap::new();
    for c in text.chars().filter(char::is_ascii_uppercase) {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts
}

/// Capital counts in order of first appearance
fn ordered_capital_counts(text: &str) -> Vec<(char, i32)> {
    let mut counts: Vec<(char, i32)> = Vec::new();
    for c in text.chars().filter(char::is_ascii_uppercase) {
        match counts.iter_mut().find(|(k, _)| *k == c) {
            Some((_, n)) => *n += 1,
            None => counts.push((c, 1)),
        }
    }
    counts
}

/// Text between the brackets enclosing an entity, as in
/// `(tetragonal Na3V2(PO4)2O2F, abbreviated as NVPOF)`.
///
/// Offsets are local byte offsets of the entity; at most `window` bytes are
/// searched on each side.
fn find_abbreviation_both_sides(
    before: usize,
    behind: usize,
    right_len: usize,
    text: &str,
    window: usize,
) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut open = before;
    let mut found_open = false;
    for _ in 0..window.min(before) {
        open -= 1;
        match bytes.get(open) {
            Some(b')') => return None,
            Some(b'(') => {
                found_open = true;
                break;
            }
            _ => {}
        }
    }
    if !found_open {
        return None;
    }

    let mut close = behind;
    for _ in 0..window.min(right_len) {
        match bytes.get(close) {
            Some(b'(') => return None,
            Some(b')') => break,
            _ => close += 1,
        }
    }
    text.get(open + 1..close)
}
