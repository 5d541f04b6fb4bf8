//! Per-sentence harvesting of cycles, capacities, retentions, currents,
//! voltage windows and sintering conditions.

use std::ops::Range;

use regex::{Captures, Regex};
use tracing::debug;

use cathode_core::{BinderConfig, Result};

use crate::scan::{bounds, char_at, compile, preceded_by, reported, Guarded};
use crate::tokenizer::{number, units_tokenize};

/// Unit tokens that end the value list of a different quantity
const UNIT_TOKENS: [&str; 9] = ["mAhg-1", "%", "V", "C", "mAg-1", "cycle", "cycles", "°C", "h"];

/// A harvested quantity and the unit its match ends with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Quantity {
    Capacity,
    Retention,
    CRate,
    MilliAmp,
    Amp,
}

impl Quantity {
    fn unit(self) -> &'static str {
        match self {
            Self::Capacity => "mAhg-1",
            Self::Retention => "%",
            Self::CRate => "C",
            Self::MilliAmp => "mAg-1",
            Self::Amp => "Ag-1",
        }
    }

    /// True when `token` is the unit of some other quantity
    fn foreign_unit(self, token: &str) -> bool {
        token != self.unit() && UNIT_TOKENS.contains(&token)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn after_space(text: &str, caps: &Captures<'_>) -> bool {
    preceded_by(text, reported(caps).start, " ")
}

fn not_after_dash_or_equals(text: &str, caps: &Captures<'_>) -> bool {
    !preceded_by(text, bounds(caps).0, "-=")
}

fn not_after_dash(text: &str, caps: &Captures<'_>) -> bool {
    !preceded_by(text, bounds(caps).0, "-")
}

fn loose_percent(text: &str, caps: &Captures<'_>) -> bool {
    let (start, end) = bounds(caps);
    !preceded_by(text, start, ".@/") && !char_at(text, end).is_some_and(is_word_char)
}

fn c_rate(text: &str, caps: &Captures<'_>) -> bool {
    let (start, end) = bounds(caps);
    if preceded_by(text, start, "-.") {
        return false;
    }
    if caps.get(1).is_some() {
        char_at(text, end) != Some('=')
    } else {
        !preceded_by(text, start, "°@")
    }
}

fn not_per_cycle(text: &str, caps: &Captures<'_>) -> bool {
    !text[bounds(caps).1..].starts_with(" per cycle")
}

fn not_minutes(text: &str, caps: &Captures<'_>) -> bool {
    let rest = text[bounds(caps).1..].trim_start_matches(|c: char| c.is_whitespace() || c == '/');
    !rest.starts_with("min")
}

fn not_to_reach(text: &str, caps: &Captures<'_>) -> bool {
    !text[bounds(caps).1..].starts_with(" to reach")
}

/// Compiled harvesting patterns
#[derive(Debug, Clone)]
pub(crate) struct HarvestPatterns {
    cycle: Guarded,
    capacity: Guarded,
    retention_keyword: Regex,
    retention_inline: Guarded,
    retention_loose: Guarded,
    coulombic: Regex,
    loss: Guarded,
    c_rate: Guarded,
    milliamp: Guarded,
    amp: Guarded,
    voltage: Regex,
    current_define: Regex,
    temperature: Guarded,
    time: Guarded,
}

impl HarvestPatterns {
    pub fn new() -> Result<Self> {
        let n = r"\d+[\d. ]*";
        Ok(Self {
            cycle: Guarded::new(
                r"(\d+[\d,/ andoghscueirTtn]*? )(?:cycle|(?:charge|discharge)(?:\W(?:charge|discharge))* capacit)|(initial|first)",
                after_space,
            )?,
            capacity: Guarded::new(r"\b\d[\d.,~/ toand]*mAhg-1", not_after_dash_or_equals)?,
            retention_keyword: compile(r"\bretention")?,
            retention_inline: Guarded::new(
                r"(\d[\d.,and ]*%[^%]+?) (?:capacity|retention)",
                |text, caps| preceded_by(text, bounds(caps).0, " ~()"),
            )?,
            retention_loose: Guarded::new(r"\b\d\d[\d .,avtoisnd/]*%", loose_percent)?,
            coulombic: compile(
                r"(?i:cou?l[ou]mb(?:ic)? efficienc(?:y|ies)|efficiency)|\b(?:CE|ICE)\b",
            )?,
            loss: Guarded::new(r"lost|lose|loss|expense", not_per_cycle)?,
            c_rate: Guarded::new(r"\b(?:(\d[/\d.,toand ]*C)\b|(C\s?/\s?\d+))", c_rate)?,
            milliamp: Guarded::new(r"\b\d[\d.,~/ toand]*mAg-1", not_after_dash_or_equals)?,
            amp: Guarded::new(r"\b\d[\d.,/ toand]*Ag-1", not_after_dash)?,
            voltage: compile(r"(\d[\d.]*)\s?(?:-|to|and)\s?(\d[\d.]*)\s?V\b")?,
            current_define: compile(&format!(
                r"\b({n})C\s?=\s?({n})\s?mAg-1\b|({n})mAg-1\s?\(({n})C\s?\)|({n})C\s?\(({n})\s?mAg-1\s?\)"
            ))?,
            temperature: Guarded::new(r"\d{2,3}[-/(\d, airtond)]*°C", not_minutes)?,
            time: Guarded::new(r"\b\d[-/(\d,. orand)]*h(?:rs|oursh|ours?)?\b", not_to_reach)?,
        })
    }
}

/// Everything harvested from one sentence
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SentenceProperties {
    /// (match offset, cycle number)
    pub cycle: Vec<(usize, u32)>,
    /// (match offset, capacity mAh/g)
    pub capacity: Vec<(usize, f64)>,
    pub retention: Vec<f64>,
    pub c_rate: Vec<f64>,
    pub milliamp: Vec<f64>,
    pub amp: Vec<f64>,
}

impl SentenceProperties {
    pub fn has_current(&self) -> bool {
        !(self.c_rate.is_empty() && self.milliamp.is_empty() && self.amp.is_empty())
    }
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

pub(crate) struct Harvester<'a> {
    pub patterns: &'a HarvestPatterns,
    pub config: &'a BinderConfig,
}

impl Harvester<'_> {
    /// Harvest every quantity from one sentence
    pub fn sentence(&self, text: &str) -> SentenceProperties {
        let p = self.patterns;
        let mut found = SentenceProperties::default();

        for caps in p.cycle.captures_all(text) {
            let span = reported(&caps);
            let matched = &text[span.clone()];
            if matched == "initial" || matched == "first" {
                found.cycle.push((span.start, 1));
                continue;
            }
            for token in units_tokenize(matched) {
                if token.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(cycle) = token.parse() {
                        found.cycle.push((span.start, cycle));
                    }
                }
            }
        }

        for caps in p.capacity.captures_all(text) {
            let (start, end) = bounds(&caps);
            for value in self.values(Quantity::Capacity, &text[start..end], text, start) {
                found.capacity.push((start, value));
            }
        }
        if let Some(theoretical) = text.find("theoretical capacity") {
            if found.capacity.first().is_some_and(|&(start, _)| start > theoretical) {
                found.capacity.remove(0);
            }
        }

        for span in self.retention_spans(text) {
            let values = self.values(Quantity::Retention, &text[span.clone()], text, span.start);
            found.retention.extend(values);
        }

        for (quantity, pattern, target) in [
            (Quantity::CRate, &p.c_rate, &mut found.c_rate),
            (Quantity::MilliAmp, &p.milliamp, &mut found.milliamp),
            (Quantity::Amp, &p.amp, &mut found.amp),
        ] {
            for caps in pattern.captures_all(text) {
                let (start, end) = bounds(&caps);
                target.extend(self.values(quantity, &text[start..end], text, start));
            }
        }
        found
    }

    /// Retention spans: a loose percent scan for capacity sentences that do
    /// not talk about coulombic efficiency, the keyword-anchored scan
    /// otherwise.
    fn retention_spans(&self, text: &str) -> Vec<Range<usize>> {
        let p = self.patterns;
        if !p.coulombic.is_match(text) && (text.contains("capacity") || text.contains("capability")) {
            return p.retention_loose.spans(text);
        }

        let mut spans = Vec::new();
        let mut from = 0;
        while from <= text.len() {
            let keyword = self.retention_after_keyword(text, from);
            let inline = p
                .retention_inline
                .captures_from(text, from)
                .map(|caps| {
                    let start = bounds(&caps).0;
                    start..reported(&caps).end + 1
                });
            let span = match (keyword, inline) {
                (Some(k), Some(i)) => {
                    if i.start < k.start {
                        i
                    } else {
                        k
                    }
                }
                (Some(k), None) => k,
                (None, Some(i)) => i,
                (None, None) => break,
            };
            from = span.end.max(span.start + 1);
            spans.push(span);
        }
        spans
    }

    /// Percent run introduced by the word "retention", extended over
    /// following percent clauses unless a comparison follows.
    fn retention_after_keyword(&self, text: &str, from: usize) -> Option<Range<usize>> {
        for keyword in self.patterns.retention_keyword.find_iter(text) {
            let Some(next) = char_at(text, keyword.end()).filter(|&c| c != '\n') else {
                continue;
            };
            let start = keyword.end() + next.len_utf8();
            if start < from {
                continue;
            }
            let Some(first) = text[start..].find('%') else {
                continue;
            };
            let mut end = start + first + 1;
            if text[end..].starts_with(" higher") {
                continue;
            }
            loop {
                let rest = &text[end..];
                let Some(lead) = rest.chars().next().filter(|&c| c != '%' && c != '\n') else {
                    break;
                };
                let Some(percent) = rest.find('%') else { break };
                if percent <= lead.len_utf8() {
                    break;
                }
                let extended = end + percent + 1;
                if text[extended..].starts_with(" higher") {
                    break;
                }
                end = extended;
            }
            return Some(start..end);
        }
        None
    }

    /// Values of `quantity` read from one match starting at `start`
    fn values(&self, quantity: Quantity, matched: &str, text: &str, start: usize) -> Vec<f64> {
        let tokens = units_tokenize(matched);
        let loss = quantity == Quantity::Retention && self.patterns.loss.is_match(&text[..start]);
        let mut values: Vec<f64> = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            if let Some(value) = number(token) {
                let Some(&next) = tokens.get(i + 1) else {
                    if quantity == Quantity::CRate && value != 0.0 {
                        values.push(round_to(1.0 / value, 3));
                    }
                    break;
                };
                let foreign = quantity.foreign_unit(next);
                match quantity {
                    Quantity::Retention => {
                        if value > 5.0 && value <= 100.0 && !foreign {
                            values.push(if loss && value < 50.0 {
                                round_to(100.0 - value, 3)
                            } else {
                                value
                            });
                        }
                    }
                    _ if foreign => {}
                    Quantity::CRate | Quantity::Amp => values.push(value),
                    Quantity::Capacity => {
                        if value > self.config.min_capacity {
                            values.push(value);
                        }
                    }
                    Quantity::MilliAmp => {
                        if value > 1.0 {
                            values.push(value);
                        }
                    }
                }
            } else if quantity == Quantity::CRate && token == "/" && !values.is_empty() {
                match tokens.get(i + 1).and_then(|t| number(t)) {
                    Some(divisor) if divisor == 0.0 => {
                        debug!(matched, "Dropping C-rate with zero divisor");
                        values.pop();
                        i += 1;
                    }
                    Some(divisor) => {
                        if let Some(last) = values.last_mut() {
                            *last = round_to(*last / divisor, 3);
                        }
                        i += 1;
                    }
                    None => {}
                }
            } else if token == "CE" || token == "ICE" {
                break;
            }
            i += 1;
        }
        values
    }

    /// Voltage windows of a sentence, as sorted (lower, upper) pairs
    pub fn voltages(&self, text: &str) -> Vec<(f64, f64)> {
        let mut pairs = Vec::new();
        for caps in self.patterns.voltage.captures_iter(text) {
            let (Some(a), Some(b)) = (number(&caps[1]), number(&caps[2])) else {
                continue;
            };
            let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
            if upper - lower >= 1.0 && upper < self.config.max_voltage {
                pairs.push((lower, upper));
            }
        }
        pairs
    }

    /// C-rate to mA/g ratios defined in the sentence, e.g. `1C = 150 mAg-1`
    pub fn current_definitions(&self, text: &str) -> Vec<f64> {
        let mut ratios = Vec::new();
        for caps in self.patterns.current_define.captures_iter(text) {
            let values: Vec<f64> = caps
                .iter()
                .skip(1)
                .flatten()
                .filter_map(|m| m.as_str().replace(' ', "").parse().ok())
                .collect();
            let &[a, b] = values.as_slice() else { continue };
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            if low > 0.0 {
                ratios.push(round_to(high / low, 3));
            }
        }
        ratios
    }

    /// Temperature and time lists of one experimental sentence, paired up
    /// in order of appearance.
    pub fn conditions(&self, text: &str) -> (Vec<f64>, Vec<f64>) {
        #[derive(Clone, Copy, PartialEq)]
        enum Kind {
            Temperature,
            Time,
        }

        let p = self.patterns;
        let (mut temperature, mut time) = (Vec::new(), Vec::new());
        let (mut t_run, mut h_run): (Vec<f64>, Vec<f64>) = (Vec::new(), Vec::new());
        let mut previous: Option<Kind> = None;
        let mut from = 0;

        while from <= text.len() {
            let t = p.temperature.captures_from(text, from).map(|c| bounds(&c));
            let h = p.time.captures_from(text, from).map(|c| bounds(&c));
            let (kind, (start, end)) = match (t, h) {
                (Some(t), Some(h)) if h.0 < t.0 => (Kind::Time, h),
                (Some(t), _) => (Kind::Temperature, t),
                (None, Some(h)) => (Kind::Time, h),
                (None, None) => break,
            };
            from = end.max(start + 1);

            let run = if kind == Kind::Temperature {
                &mut t_run
            } else {
                &mut h_run
            };
            run.extend(units_tokenize(&text[start..end]).into_iter().filter_map(number));

            if previous.is_some_and(|prev| prev != kind) && !t_run.is_empty() && !h_run.is_empty() {
                balance(&mut t_run, &mut h_run);
                temperature.append(&mut t_run);
                time.append(&mut h_run);
                previous = None;
            } else {
                previous = Some(kind);
            }
        }
        (temperature, time)
    }
}

/// Pad the shorter run with its last value
fn balance(a: &mut Vec<f64>, b: &mut Vec<f64>) {
    let (short, long) = if a.len() < b.len() { (a, b) } else { (b, a) };
    if let Some(&last) = short.last() {
        short.resize(long.len(), last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harvest(text: &str) -> SentenceProperties {
        let patterns = HarvestPatterns::new().unwrap();
        let config = BinderConfig::default();
        Harvester {
            patterns: &patterns,
            config: &config,
        }
        .sentence(text)
    }

    fn with_harvester<T>(f: impl FnOnce(&Harvester<'_>) -> T) -> T {
        let patterns = HarvestPatterns::new().unwrap();
        let config = BinderConfig::default();
        f(&Harvester {
            patterns: &patterns,
            config: &config,
        })
    }

    #[test]
    fn test_cycling_sentence() {
        let found = harvest(
            "NM delivers an initial discharge capacity of 150 mAhg-1 at 0.1 C and retains 120 mAhg-1 after 100 cycles in the voltage range of 2.0-4.0V.",
        );
        assert_eq!(found.cycle, vec![(15, 1), (94, 100)]);
        assert_eq!(found.capacity, vec![(45, 150.0), (77, 120.0)]);
        assert_eq!(found.c_rate, vec![0.1]);
        assert!(found.retention.is_empty());
        assert!(found.milliamp.is_empty());
    }

    #[test]
    fn test_rate_lists() {
        let found = harvest("It delivers 140, 120 and 100 mAhg-1 at 0.1, 0.5 and 1 C, respectively.");
        let capacities: Vec<f64> = found.capacity.iter().map(|&(_, c)| c).collect();
        assert_eq!(capacities, vec![140.0, 120.0, 100.0]);
        assert_eq!(found.c_rate, vec![0.1, 0.5, 1.0]);
        assert!(found.cycle.is_empty());
    }

    #[test]
    fn test_fraction_c_rate() {
        assert_eq!(harvest("cycled at C/10 between").c_rate, vec![0.1]);
    }

    #[test]
    fn test_zero_divisor_c_rate_dropped() {
        let found = harvest("NaMnO2 shows 100 mAhg-1 at 1/0 C.");
        assert!(found.c_rate.is_empty(), "{:?}", found.c_rate);
        assert_eq!(found.capacity.len(), 1);
        assert_eq!(harvest("NaMnO2 shows 100 mAhg-1 at 1/2 C.").c_rate, vec![0.5]);
    }

    #[test]
    fn test_retention_with_loss() {
        let found = harvest("The capacity loss is only 10% after 100 cycles.");
        assert_eq!(found.retention, vec![90.0]);
        let found = harvest("A capacity retention of 85% after 100 cycles.");
        assert_eq!(found.retention, vec![85.0]);
    }

    #[test]
    fn test_retention_keyword_scan() {
        let found = harvest("The retention is 92% and the CE is 99%.");
        assert_eq!(found.retention, vec![92.0]);
        let found = harvest("The retention is 92% and 88% at 1 C.");
        assert_eq!(found.retention, vec![92.0, 88.0]);
    }

    #[test]
    fn test_small_capacity_dropped() {
        let found = harvest("only 5 mAhg-1 was lost");
        assert!(found.capacity.is_empty());
    }

    #[test]
    fn test_voltages() {
        with_harvester(|h| {
            assert_eq!(h.voltages("between 2.0-4.0V and 1.5 to 4.3V"), vec![(2.0, 4.0), (1.5, 4.3)]);
            assert!(h.voltages("between 3.5-4.0V").is_empty());
            assert!(h.voltages("up to 1.5-5.5V").is_empty());
        });
    }

    #[test]
    fn test_current_definitions() {
        with_harvester(|h| {
            assert_eq!(h.current_definitions("at 1C = 150 mAg-1"), vec![150.0]);
            assert_eq!(h.current_definitions("at 0.1C (12 mAg-1)"), vec![120.0]);
            assert!(h.current_definitions("at 0.1 C").is_empty());
        });
    }

    #[test]
    fn test_conditions() {
        with_harvester(|h| {
            let (t, time) = h.conditions("The precursor was calcined at 900 °C for 12 h in air.");
            assert_eq!((t, time), (vec![900.0], vec![12.0]));

            let (t, time) = h.conditions("heated at 500 °C for 5 h and then at 850 °C for 15 h.");
            assert_eq!((t, time), (vec![500.0, 850.0], vec![5.0, 15.0]));

            let (t, _) = h.conditions("dried at 80 °C/min");
            assert!(t.is_empty());
        });
    }

    #[test]
    fn test_balance() {
        let (mut a, mut b) = (vec![900.0], vec![5.0, 10.0]);
        balance(&mut a, &mut b);
        assert_eq!(a, vec![900.0, 900.0]);
    }
}
