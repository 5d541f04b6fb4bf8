//! Property binding
//!
//! Binds the performance values harvested from each sentence of a property
//! paragraph to the material they describe, and writes them as
//! [`PropertyRecord`]s.
//!
//! A document is processed through one [`BindingSession`]: experimental text
//! first (sintering conditions), then each property paragraph in order. The
//! session carries the voltage windows seen so far, the C-rate definitions
//! and the records written, so later sentences can fill gaps in earlier
//! records instead of duplicating them.

mod harvest;
mod resolve;
mod rules;

use std::collections::BTreeMap;

use tracing::{debug, info};

use cathode_chem::{ChemEngine, EntityTag};
use cathode_core::{
    BinderConfig, Category, Current, CurrentUnit, DocumentMeta, PropertyRecord, Result,
    TaggedSentence, VoltageRange,
};

use crate::abbreviation::AbbreviationTable;
use harvest::{HarvestPatterns, Harvester, SentenceProperties};
use resolve::{has_variable, ResolvePatterns, Resolver};
use rules::RulePatterns;

/// Words that make a sentence list several materials in one breath
const ENUMERATION_CUES: [&str; 3] = ["while", "respectively", "compared"];

/// Voltage window chosen for a sentence: one window, or one per material
#[derive(Debug, Clone, PartialEq)]
enum VoltageSelection {
    Single(VoltageRange),
    Several(Vec<VoltageRange>),
}

impl VoltageSelection {
    fn from_pairs(pairs: &[(f64, f64)]) -> Option<Self> {
        match pairs {
            [] => None,
            [(lower, upper)] => Some(Self::Single(VoltageRange::new(*lower, *upper))),
            _ => Some(Self::Several(
                pairs.iter().map(|&(l, u)| VoltageRange::new(l, u)).collect(),
            )),
        }
    }

    /// Lowest lower bound and highest plausible upper bound
    fn fold(&self) -> VoltageRange {
        match self {
            Self::Single(range) => *range,
            Self::Several(ranges) => {
                let mut folded = VoltageRange::new(10.0, 0.0);
                for range in ranges {
                    folded.lower = folded.lower.min(range.lower);
                    folded.upper = folded.upper.max(if range.upper < 10.0 { range.upper } else { 0.0 });
                }
                folded
            }
        }
    }
}

/// Values observed for one material in one sentence
#[derive(Debug, Clone, Copy)]
enum Observed {
    Cycling {
        capacity: Option<(u32, f64)>,
        retention: Option<(u32, f64)>,
    },
    Rate {
        capacity: f64,
    },
}

/// A qualifying sentence waiting for relation binding
#[derive(Debug)]
struct Candidate {
    sentence_id: usize,
    category: Category,
    names: Vec<String>,
    found: SentenceProperties,
}

/// What one write needs to know about the sentence it comes from
struct Context<'s> {
    sentence_id: usize,
    category: Category,
    text: &'s str,
    unit: Option<CurrentUnit>,
}

/// Binds harvested property values to materials
#[derive(Debug, Clone)]
pub struct PropertyBinder {
    engine: ChemEngine,
    config: BinderConfig,
    harvest: HarvestPatterns,
    rules: RulePatterns,
    resolve: ResolvePatterns,
}

impl PropertyBinder {
    pub fn new(engine: ChemEngine, config: BinderConfig) -> Result<Self> {
        Ok(Self {
            engine,
            config,
            harvest: HarvestPatterns::new()?,
            rules: RulePatterns::new()?,
            resolve: ResolvePatterns::new()?,
        })
    }

    /// Start binding one document
    pub fn session<'a>(&'a self, meta: &DocumentMeta, table: &'a AbbreviationTable) -> BindingSession<'a> {
        BindingSession {
            binder: self,
            table,
            meta: meta.clone(),
            voltages: Vec::new(),
            voltage_recorded: false,
            sintering: None,
            current_define: Vec::new(),
            records: Vec::new(),
        }
    }

    fn harvester(&self) -> Harvester<'_> {
        Harvester {
            patterns: &self.harvest,
            config: &self.config,
        }
    }
}

/// Binding state for one document
pub struct BindingSession<'a> {
    binder: &'a PropertyBinder,
    table: &'a AbbreviationTable,
    meta: DocumentMeta,
    /// Voltage windows by sentence index, one group per run of paragraphs
    /// that mention voltages
    voltages: Vec<Vec<(usize, Vec<(f64, f64)>)>>,
    voltage_recorded: bool,
    /// Sintering temperature and time
    sintering: Option<(f64, f64)>,
    /// C-rate to mA/g ratios with the number of times each was defined
    current_define: Vec<(f64, usize)>,
    records: Vec<PropertyRecord>,
}

impl BindingSession<'_> {
    /// Read sintering conditions from experimental sentences.
    ///
    /// The hottest step wins, with the time paired to it.
    pub fn experimental(&mut self, sentences: &[TaggedSentence]) {
        let binder = self.binder;
        let harvester = binder.harvester();
        let (mut temperature, mut time) = (Vec::new(), Vec::new());
        for sentence in sentences.iter().filter(|s| s.text.contains("°C")) {
            let (t, h) = harvester.conditions(&sentence.text);
            temperature.extend(t);
            time.extend(h);
        }

        if temperature.is_empty() || temperature.len() != time.len() {
            debug!(
                temperatures = temperature.len(),
                times = time.len(),
                "No paired sintering conditions"
            );
            return;
        }
        let hottest = temperature
            .iter()
            .enumerate()
            .fold(0, |best, (i, &t)| if t > temperature[best] { i } else { best });
        self.sintering = Some((temperature[hottest], time[hottest]));
        debug!(
            temperature = temperature[hottest],
            time = time[hottest],
            "Sintering conditions"
        );
    }

    /// Harvest and bind one property paragraph
    pub fn paragraph(&mut self, sentences: &[TaggedSentence]) {
        let binder = self.binder;
        let harvester = binder.harvester();
        self.voltage_recorded = false;
        let mut candidates = Vec::new();

        for (index, sentence) in sentences.iter().enumerate() {
            let text = sentence.text.as_str();
            self.record_voltages(index, harvester.voltages(text));
            for ratio in harvester.current_definitions(text) {
                match self.current_define.iter_mut().find(|(r, _)| *r == ratio) {
                    Some((_, count)) => *count += 1,
                    None => self.current_define.push((ratio, 1)),
                }
            }

            if !(text.contains("mAhg-1") || text.contains('%')) {
                continue;
            }
            let found = harvester.sentence(text);
            let category = if !found.cycle.is_empty() {
                (!found.retention.is_empty() || !found.capacity.is_empty()).then_some(Category::Cycling)
            } else {
                (!found.capacity.is_empty() && found.has_current()).then_some(Category::Rate)
            };
            let Some(category) = category else { continue };

            debug!(sentence = index, category = %category, ?found, "Property sentence");
            candidates.push(Candidate {
                sentence_id: index,
                category,
                names: self.sentence_names(sentence),
                found,
            });
        }

        self.relate(sentences, candidates);
    }

    /// Records written so far and the C-rate definitions seen
    pub fn finish(self) -> (Vec<PropertyRecord>, Vec<(f64, usize)>) {
        info!(
            records = self.records.len(),
            definitions = self.current_define.len(),
            "Property binding finished"
        );
        (self.records, self.current_define)
    }

    pub fn records(&self) -> &[PropertyRecord] {
        &self.records
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            engine: &self.binder.engine,
            table: self.table,
            patterns: &self.binder.resolve,
        }
    }

    /// Material names tagged in a sentence, first word of each span
    fn sentence_names(&self, sentence: &TaggedSentence) -> Vec<String> {
        let engine = &self.binder.engine;
        let mut names: Vec<String> = Vec::new();
        for span in &sentence.spans {
            if !matches!(
                engine.classify(&span.text),
                EntityTag::Abbreviation | EntityTag::Synthetic
            ) {
                continue;
            }
            let name = span.text.split(' ').next().unwrap_or("");
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    fn record_voltages(&mut self, index: usize, pairs: Vec<(f64, f64)>) {
        if pairs.is_empty() {
            return;
        }
        if self.voltage_recorded {
            if let Some(group) = self.voltages.last_mut() {
                match group.iter_mut().find(|(i, _)| *i == index) {
                    Some((_, existing)) => *existing = pairs,
                    None => group.push((index, pairs)),
                }
                return;
            }
        }
        self.voltages.push(vec![(index, pairs)]);
        self.voltage_recorded = true;
    }

    /// Voltage window in force at a sentence: the closest window at or
    /// before it in this paragraph, else the last one seen.
    fn voltage_for(&self, index: usize) -> Option<VoltageSelection> {
        let group = self.voltages.last().filter(|g| !g.is_empty())?;
        if !self.voltage_recorded {
            return group.last().and_then(|(_, pairs)| VoltageSelection::from_pairs(pairs));
        }
        if let Some((_, pairs)) = group.iter().rev().find(|(i, _)| *i <= index) {
            return VoltageSelection::from_pairs(pairs);
        }
        if self.voltages.len() > 1 {
            let previous = &self.voltages[self.voltages.len() - 2];
            return previous.last().and_then(|(_, pairs)| VoltageSelection::from_pairs(pairs));
        }
        None
    }

    /// Pair the candidates of one paragraph with materials and write them
    fn relate(&mut self, sentences: &[TaggedSentence], candidates: Vec<Candidate>) {
        let mut previous: Vec<String> = Vec::new();
        let mut anchor: i64 = -2;

        for candidate in candidates {
            let Candidate {
                sentence_id,
                category,
                mut names,
                found,
            } = candidate;
            let text = sentences[sentence_id].text.as_str();

            if names.is_empty() || ENUMERATION_CUES.iter().any(|cue| text.contains(cue)) {
                names = self.resolver().entity_lookup(text);
            }
            let (unit, currents) = preferred_current(&found);
            let context = Context {
                sentence_id,
                category,
                text,
                unit,
            };

            let binder = self.binder;
            let rules = &binder.rules;
            let cycles: Vec<u32> = found.cycle.iter().map(|&(_, c)| c).collect();
            let mut cycle_retention = Vec::new();
            let mut cycle_capacity = Vec::new();
            let mut rate_pairs = Vec::new();
            match category {
                Category::Cycling => {
                    if cycles.is_empty() {
                        continue;
                    }
                    if !found.retention.is_empty() {
                        cycle_retention = rules.cycle_retentions(text, &cycles, &found.retention);
                    }
                    if !found.capacity.is_empty() {
                        let retained = if found.retention.is_empty() { 0 } else { cycle_retention.len() };
                        cycle_capacity =
                            rules.cycle_capacities(text, &found.cycle, &found.capacity, retained);
                    }
                }
                Category::Rate => {
                    let capacities: Vec<f64> = found.capacity.iter().map(|&(_, c)| c).collect();
                    let (cf, cap_l, chem_l) = (currents.len(), capacities.len(), names.len());
                    rate_pairs = if cf == 1 {
                        capacities.iter().map(|&c| (c, currents[0])).collect()
                    } else if rules.is_rate_sweep(text) {
                        debug!(sentence = sentence_id, "Skipping rate sweep");
                        continue;
                    } else if chem_l > 1 && cf < cap_l && cap_l / chem_l == cf {
                        capacities
                            .iter()
                            .copied()
                            .zip(currents.iter().copied().cycle())
                            .collect()
                    } else {
                        capacities.iter().copied().zip(currents.iter().copied()).collect()
                    };
                }
            }

            let voltage = self.voltage_for(sentence_id);
            let synthetic = self.backtrack(sentences, sentence_id, &names, &previous, &mut anchor);
            if synthetic.first().map_or(true, |name| name.is_empty()) {
                debug!(sentence = sentence_id, "No material for property sentence");
                continue;
            }

            let written = match category {
                Category::Cycling => self.bind_cycling(
                    &context,
                    synthetic.clone(),
                    &found,
                    (cycle_capacity.as_slice(), cycle_retention.as_slice()),
                    &currents,
                    voltage.as_ref(),
                    (sentences, anchor, previous.as_slice()),
                ),
                Category::Rate => {
                    let check = currents.len() != 1;
                    self.split_rate(&context, &synthetic, &rate_pairs, check, synthetic.len(), voltage.as_ref());
                    true
                }
            };
            if written {
                previous = synthetic;
            }
        }
    }

    /// Materials a sentence's values belong to.
    ///
    /// Names in the sentence win; otherwise the material of the previous
    /// record carries over to the next sentence, or the nearest earlier
    /// sentence naming a material is used.
    fn backtrack(
        &self,
        sentences: &[TaggedSentence],
        index: usize,
        names: &[String],
        previous: &[String],
        anchor: &mut i64,
    ) -> Vec<String> {
        let resolver = self.resolver();
        let text = &sentences[index].text;
        let index_i = index as i64;

        if let [name] = names {
            let synthetic = if has_variable(name) {
                resolver.expand_templated(name, text)
            } else {
                vec![name.clone()]
            };
            if !synthetic.is_empty() {
                *anchor = index_i;
            }
            return synthetic;
        }
        if !names.is_empty() {
            *anchor = index_i;
            return names.iter().filter(|n| !has_variable(n)).cloned().collect();
        }
        if index == 0 || index_i == *anchor + 1 {
            *anchor = index_i;
            return previous.to_vec();
        }

        let mut written = Vec::new();
        for (count, sentence) in sentences[..index].iter().rev().enumerate() {
            if count == 0 && !self.table.stoichiometric_variables.is_empty() {
                written = resolver.written_values(&sentence.text);
            }
            let (_, name) = resolver.detect_above(sentence);
            let synthetic = if has_variable(&name) {
                if written.is_empty() {
                    resolver.expand_templated(&name, &sentence.text)
                } else {
                    resolver.expand_with_written(&name, &written)
                }
            } else if name.is_empty() {
                Vec::new()
            } else {
                vec![name]
            };
            if !synthetic.is_empty() {
                *anchor = index_i - 2 - count as i64;
                return synthetic;
            }
        }
        Vec::new()
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_cycling(
        &mut self,
        context: &Context<'_>,
        mut synthetic: Vec<String>,
        found: &SentenceProperties,
        (cycle_capacity, cycle_retention): (&[(u32, f64)], &[(u32, f64)]),
        currents: &[f64],
        voltage: Option<&VoltageSelection>,
        (sentences, anchor, previous): (&[TaggedSentence], i64, &[String]),
    ) -> bool {
        let max_l = cycle_capacity.len().max(cycle_retention.len());
        let capacity_at = |i: usize| cycle_capacity.get(i).copied();
        let retention_at = |i: usize| cycle_retention.get(i).copied();
        let observed = |i: usize| Observed::Cycling {
            capacity: capacity_at(i),
            retention: retention_at(i),
        };

        let capacity_l = found.capacity.len();
        if synthetic.len() < capacity_l
            && capacity_l == found.cycle.len()
            && capacity_l == found.retention.len()
        {
            let earlier = index_from_either_end(sentences, anchor - 1).map_or("", |s| s.text.as_str());
            let extra: Vec<String> = if previous.is_empty() {
                self.resolver()
                    .entity_lookup(earlier)
                    .into_iter()
                    .filter(|n| !synthetic.contains(n))
                    .collect()
            } else {
                previous.to_vec()
            };
            if context.text.contains("increas") {
                synthetic.splice(0..0, extra);
            } else {
                synthetic.extend(extra);
            }
        }

        let name_l = synthetic.len();
        let cf = currents.len();
        if name_l == 1 {
            let resolved = self.resolver().full_name(&synthetic[0]);
            if resolved.1.is_empty() {
                return false;
            }
            let rows = if cf > 1 { cf.min(max_l) } else { max_l };
            for i in 0..rows {
                let current = match cf {
                    0 => None,
                    1 => Some(currents[0]),
                    _ => Some(currents[i]),
                };
                self.write(context, &resolved, current, observed(i), voltage);
            }
            return true;
        }

        if cf == 1 {
            let batch = (max_l / name_l).max(1);
            let split = match voltage {
                Some(VoltageSelection::Several(ranges)) if ranges.len() == name_l => Some(ranges),
                _ => None,
            };
            let mut start = 0;
            let mut resolved = self.resolver().full_name(&synthetic[0]);
            for i in 0..max_l {
                if i > 0 && i % batch == 0 {
                    start += 1;
                    if start >= name_l {
                        break;
                    }
                    resolved = self.resolver().full_name(&synthetic[start]);
                }
                let own = split
                    .and_then(|ranges| ranges.get(i % batch))
                    .map(|range| VoltageSelection::Single(*range));
                self.write(context, &resolved, Some(currents[0]), observed(i), own.as_ref().or(voltage));
            }
        } else {
            let rows = if cf > 1 { cf.min(max_l) } else { max_l }.min(name_l);
            for i in 0..rows {
                let resolved = self.resolver().full_name(&synthetic[i]);
                let current = (cf > 1).then(|| currents[i]);
                self.write(context, &resolved, current, observed(i), voltage);
            }
        }
        true
    }

    /// Distribute (capacity, current) pairs over materials.
    ///
    /// With several materials and several currents, a current seen again
    /// marks the start of the next material's run.
    fn split_rate(
        &mut self,
        context: &Context<'_>,
        synthetic: &[String],
        pairs: &[(f64, f64)],
        check: bool,
        name_l: usize,
        voltage: Option<&VoltageSelection>,
    ) {
        let s_l = synthetic.len();
        if s_l == 0 {
            return;
        }
        let rate_l = pairs.len();

        if s_l == 1 || !check {
            if s_l == 2 && rate_l == 1 && context.text.contains("both") {
                for name in synthetic {
                    self.split_rate(context, std::slice::from_ref(name), pairs, true, name_l, voltage);
                }
                return;
            }
            let resolved = self.resolver().full_name(&synthetic[0]);
            for &(capacity, current) in pairs {
                self.write(context, &resolved, Some(current), Observed::Rate { capacity }, voltage);
            }
            return;
        }

        let mut seen: Vec<f64> = Vec::new();
        let mut num = 0;
        let mut run_start: Option<usize> = None;
        for (i, &(_, current)) in pairs.iter().enumerate() {
            if seen.contains(&current) {
                if num == name_l {
                    break;
                }
                let from = run_start.unwrap_or(0);
                self.split_rate(context, &synthetic[num..=num], &pairs[from..i], check, name_l, voltage);
                run_start = Some(i);
                num += 1;
            }
            seen.push(current);
        }
        match run_start {
            Some(from) if from < rate_l => {
                let name = if num == name_l { num - 1 } else { num };
                if let Some(name) = synthetic.get(name..=name) {
                    self.split_rate(context, name, &pairs[from..], check, name_l, voltage);
                }
            }
            Some(_) => {}
            None => self.split_rate(context, &synthetic[..1], pairs, check, name_l, voltage),
        }
    }

    /// Merge an observation into a matching record, or write a new one
    fn write(
        &mut self,
        context: &Context<'_>,
        (abbreviation, name): &(String, String),
        current: Option<f64>,
        observed: Observed,
        voltage: Option<&VoltageSelection>,
    ) {
        if name.is_empty() {
            return;
        }
        let binder = self.binder;
        let engine = &binder.engine;
        let current = context.unit.zip(current).map(|(unit, value)| Current::new(unit, value));
        let voltage = voltage.map(VoltageSelection::fold);
        let identity = engine.separate_phase(name);

        for record in &mut self.records {
            if record.category != context.category || engine.separate_phase(&record.name) != identity {
                continue;
            }
            let matched = match observed {
                Observed::Cycling { capacity, retention } => {
                    capacity.is_some_and(|p| record.cycle_capacity.as_deref() == Some(&[p][..]))
                        || retention.is_some_and(|p| record.cycle_retention.as_deref() == Some(&[p][..]))
                }
                Observed::Rate { capacity } => record.capacity == Some(capacity),
            };
            if !matched {
                continue;
            }
            if let Observed::Cycling { capacity, retention } = observed {
                if record.cycle_retention.is_none() {
                    record.cycle_retention = retention.map(|p| vec![p]);
                }
                if record.cycle_capacity.is_none() {
                    record.cycle_capacity = capacity.map(|p| vec![p]);
                }
            }
            if record.current.is_none() {
                record.current = current;
            }
            if record.voltage.is_none() {
                record.voltage = voltage;
            }
            debug!(name = %record.name, "Merged into existing record");
            return;
        }

        let composition = engine.parse(&name.replace("-δ", ""));
        if composition.is_empty() {
            debug!(name = %name, "Unparsable material, record dropped");
            return;
        }

        let mut record = PropertyRecord::new(context.category, name.clone());
        record.sentence_id = context.sentence_id;
        record.abbreviation = (!abbreviation.is_empty()).then(|| abbreviation.clone());
        record.elements = composition
            .elements
            .iter()
            .map(|(symbol, amount)| (symbol.clone(), amount.to_string()))
            .collect::<BTreeMap<_, _>>();
        record.current = current;
        match observed {
            Observed::Cycling { capacity, retention } => {
                record.cycle_capacity = capacity.map(|p| vec![p]);
                record.cycle_retention = retention.map(|p| vec![p]);
            }
            Observed::Rate { capacity } => record.capacity = Some(capacity),
        }
        record.voltage = voltage;
        record.sintering_temperature = self.sintering.map(|(t, _)| t);
        record.sintering_time = self.sintering.map(|(_, h)| h);
        record.doi = self.meta.doi.clone();
        record.year = self.meta.year;

        debug!(name = %record.name, category = %record.category, "New property record");
        self.records.push(record);
    }
}

/// Current unit and values a sentence's values were measured at.
///
/// An explicit mA/g or A/g list longer than the C-rate list wins, then any
/// explicit list, then C-rates.
fn preferred_current(found: &SentenceProperties) -> (Option<CurrentUnit>, Vec<f64>) {
    let (m, a, c) = (&found.milliamp, &found.amp, &found.c_rate);
    let choice = if m.len() > c.len() {
        (CurrentUnit::MilliAmpPerGram, m)
    } else if a.len() > c.len() {
        (CurrentUnit::AmpPerGram, a)
    } else if !m.is_empty() {
        (CurrentUnit::MilliAmpPerGram, m)
    } else if !a.is_empty() {
        (CurrentUnit::AmpPerGram, a)
    } else if !c.is_empty() {
        (CurrentUnit::CRate, c)
    } else {
        return (None, Vec::new());
    };
    (Some(choice.0), choice.1.clone())
}

/// Index with negative values counting from the end
fn index_from_either_end<T>(items: &[T], index: i64) -> Option<&T> {
    let resolved = if index < 0 { items.len() as i64 + index } else { index };
    usize::try_from(resolved).ok().and_then(|i| items.get(i))
}
