//! Pairing rules for cycle numbers with capacities and retentions
//!
//! Authors write cycling results in a handful of shapes ("150 mAhg-1 after
//! 100 cycles", "from 160 to 120 mAhg-1", "charge/discharge capacities of
//! ..."). Each rule below recognizes one shape and pairs values accordingly;
//! offsets of the harvested matches break the remaining ties.

use regex::Regex;

use cathode_core::Result;

use crate::scan::compile;

/// Words saying a single capacity was measured at the stated cycle
const MEASURED_CUES: [&str; 8] = [
    "measure", "obtain", "keep", "remain", "decrease", "decline", "maintain", "decayed",
];

#[derive(Debug, Clone)]
pub(crate) struct RulePatterns {
    retention_from_to: Regex,
    capacity_at_cycle: [Regex; 3],
    percent_after_cycle: Regex,
    capacity_after_cycles: Regex,
    capacity_from_to: Regex,
    charge_discharge: Regex,
    capacity_after_later_cycle: Regex,
    rate_from_to: Regex,
}

impl RulePatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            retention_from_to: compile(r"from[ \d.%]+to[ \d.]*%")?,
            capacity_at_cycle: [
                compile(
                    r"\b\d[\d. ]+mAhg-1 (?:\([^()]+\) )?(?:after|for|at) (?:the )?\d+\s?cycles?|after[ \d]+cycles (?:at[ .\d]+C )?(?:was|is)(?: only)?[ .\d]+mAhg-1",
                )?,
                compile(r"^(?:After|By|Even)[ a-z]+\d+\s?cycles|^Cycling")?,
                compile(r"% \([ \d.\w]+mAhg-1[ \d\w]+\)")?,
            ],
            percent_after_cycle: compile(r"\d\s?%(?: even)? after \d+\s?cycle")?,
            capacity_after_cycles: compile(r"\b(\d[\d.]+)\s?mAhg-1 (?:after|for) (\d+)\s?cycles?")?,
            capacity_from_to: compile(r"from (?:an initial )?\d[\d. ]+(?:mAhg-1 )?to \d[\d. ]+mAhg-1")?,
            charge_discharge: compile(r"(?:discharge|charge)\W(?:discharge|charge)")?,
            capacity_after_later_cycle: compile(r"\b\d[ \d.]+mAhg-1 after \d+\s?cycles?")?,
            rate_from_to: compile(r"from[\d. ]+to[\d. ]*C\b")?,
        })
    }

    /// A rate sentence describing a sweep ("from 0.1 to 5 C") rather than
    /// paired values
    pub fn is_rate_sweep(&self, sentence: &str) -> bool {
        self.rate_from_to.is_match(sentence)
    }

    /// Pair retentions with the cycles they were measured after
    pub fn cycle_retentions(&self, sentence: &str, cycles: &[u32], retention: &[f64]) -> Vec<(u32, f64)> {
        let later: Vec<u32> = cycles.iter().copied().filter(|&c| c != 1).collect();
        let r_l = retention.len();

        if later.len() == 1 {
            if r_l == 2 && self.retention_from_to.is_match(sentence) {
                return vec![(later[0], retention[1])];
            }
            return retention.iter().map(|&r| (later[0], r)).collect();
        }
        if later.len() >= r_l && later.len() >= 2 {
            let chosen = if later[0] < later[1] {
                &later[later.len() - r_l..]
            } else {
                &later[..r_l]
            };
            return zip(chosen, retention);
        }
        zip(&later, retention)
    }

    /// Pair capacities with cycles.
    ///
    /// `cycle` and `capacity` carry the offset of the match each value came
    /// from; `retained` is the number of retention pairs already bound.
    pub fn cycle_capacities(
        &self,
        sentence: &str,
        cycle: &[(usize, u32)],
        capacity: &[(usize, f64)],
        retained: usize,
    ) -> Vec<(u32, f64)> {
        let (cycle_at, cycles): (Vec<usize>, Vec<u32>) = cycle.iter().copied().unzip();
        let (capacity_at, capacities): (Vec<usize>, Vec<f64>) = capacity.iter().copied().unzip();
        let c_l = cycles.len();
        let cap_l = capacities.len();
        if c_l == 0 || cap_l == 0 {
            return Vec::new();
        }

        if sentence.contains("rate capability") {
            return vec![(cycles[0], capacities[0])];
        }

        if c_l == 1 {
            if self.capacity_at_cycle.iter().any(|re| re.is_match(sentence)) {
                return capacities.iter().map(|&c| (cycles[0], c)).collect();
            }
            if cap_l == 1 {
                if self.percent_after_cycle.is_match(sentence) {
                    if capacities[0] > 100.0 {
                        return vec![(1, capacities[0])];
                    }
                    return zip(&cycles, &capacities);
                }
                if let Some(caps) = self.capacity_after_cycles.captures(sentence) {
                    if let (Ok(cycle), Ok(value)) = (caps[2].parse(), caps[1].parse()) {
                        return vec![(cycle, value)];
                    }
                }
                if retained > 0 && !MEASURED_CUES.iter().any(|cue| sentence.contains(cue)) {
                    return vec![(1, capacities[0])];
                }
                return zip(&cycles, &capacities);
            }
            if self.capacity_from_to.is_match(sentence) {
                let with_first: Vec<u32> = std::iter::once(1).chain(cycles.iter().copied()).collect();
                return zip(&with_first, &capacities);
            }
            if let Some(m) = self.charge_discharge.find(sentence) {
                let skip = usize::from(m.as_str().starts_with('c'));
                let picked: Vec<f64> = capacities.iter().copied().skip(skip).step_by(2).collect();
                let repeated = vec![cycles[0]; cap_l / 2];
                return zip(&repeated, &picked);
            }
            if let Some(discharge) = sentence.find("discharge") {
                let half = cap_l / 2;
                let repeated = vec![cycles[0]; half];
                if sentence[..discharge].contains("charge") {
                    return zip(&repeated, &capacities[half..]);
                }
                if sentence.get(discharge + 9..).is_some_and(|rest| rest.contains("charge")) {
                    return zip(&repeated, &capacities[..half]);
                }
            }
            if retained == 1 {
                let padded: Vec<u32> = std::iter::repeat(1)
                    .take(cap_l.saturating_sub(c_l))
                    .chain(cycles.iter().copied())
                    .collect();
                return zip(&padded, &capacities);
            }
            return capacities.iter().map(|&c| (cycles[0], c)).collect();
        } else if c_l == 2 {
            if cycles.contains(&1) {
                if cap_l == 1 && self.capacity_after_later_cycle.is_match(sentence) {
                    let later: Vec<u32> = cycles.iter().copied().filter(|&c| c != 1).collect();
                    return zip(&later, &capacities);
                }
                let paired = nearest_cycles(&cycle_at, &cycles, &capacity_at, &capacities);
                if !paired.is_empty() {
                    return paired;
                }
            }
            if 2 * retained == cap_l {
                let split: Vec<u32> = std::iter::repeat(cycles[0])
                    .take(retained)
                    .chain(std::iter::repeat(cycles[c_l - 1]).take(retained))
                    .collect();
                return zip(&split, &capacities);
            }
            if self.charge_discharge.is_match(sentence) {
                return capacities.iter().map(|&c| (cycles[0], c)).collect();
            }
        } else if self.charge_discharge.is_match(sentence) && cap_l == 2 * c_l {
            let doubled: Vec<u32> = cycles.iter().flat_map(|&c| [c, c]).collect();
            return zip(&doubled, &capacities);
        }

        if cycles[0] == 1 && capacities[0] < 100.0 {
            return zip(&cycles[c_l.saturating_sub(cap_l)..], &capacities);
        }
        if c_l > 2 && cycles[c_l - 1] == 1 && cap_l > c_l {
            let padded: Vec<u32> = cycles
                .iter()
                .copied()
                .chain(std::iter::repeat(1).take(cap_l - c_l))
                .collect();
            return zip(&padded, &capacities);
        }
        zip(&cycles, &capacities)
    }
}

fn zip<A: Copy, B: Copy>(a: &[A], b: &[B]) -> Vec<(A, B)> {
    a.iter().copied().zip(b.iter().copied()).collect()
}

/// Index of the first element of `sorted[lo..hi]` not less than `value`
fn bisect_left(sorted: &[usize], value: usize, lo: usize, hi: usize) -> usize {
    lo + sorted[lo..hi].partition_point(|&x| x < value)
}

/// Pair each capacity with the cycle mention closest to it in the text
fn nearest_cycles(
    cycle_at: &[usize],
    cycles: &[u32],
    capacity_at: &[usize],
    capacities: &[f64],
) -> Vec<(u32, f64)> {
    let c_l = cycles.len();
    let mut paired = Vec::with_capacity(capacities.len());
    let mut left = 0;
    for (&at, &capacity) in capacity_at.iter().zip(capacities) {
        left = bisect_left(cycle_at, at, left.min(c_l), c_l);
        let cycle = if left == c_l {
            cycles[c_l - 1]
        } else if left == 0 {
            cycles[0]
        } else if cycle_at[left] + cycle_at[left - 1] <= 2 * at {
            cycles[left]
        } else {
            cycles[left - 1]
        };
        paired.push((cycle, capacity));
    }
    paired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RulePatterns {
        RulePatterns::new().unwrap()
    }

    #[test]
    fn test_retentions_single_cycle() {
        let r = rules();
        assert_eq!(
            r.cycle_retentions("retains 85% after 100 cycles", &[100], &[85.0]),
            vec![(100, 85.0)]
        );
        assert_eq!(
            r.cycle_retentions("decreases from 100% to 80% over 50 cycles", &[50], &[100.0, 80.0]),
            vec![(50, 80.0)]
        );
        assert_eq!(
            r.cycle_retentions("85% and 80% after 100 cycles", &[1, 100], &[85.0, 80.0]),
            vec![(100, 85.0), (100, 80.0)]
        );
    }

    #[test]
    fn test_retentions_several_cycles() {
        let r = rules();
        assert_eq!(
            r.cycle_retentions("x", &[50, 100, 200], &[90.0, 80.0]),
            vec![(100, 90.0), (200, 80.0)]
        );
        assert_eq!(
            r.cycle_retentions("x", &[200, 100], &[80.0]),
            vec![(200, 80.0)]
        );
    }

    #[test]
    fn test_capacities_nearest_cycle() {
        let sentence = "NM delivers an initial discharge capacity of 150 mAhg-1 at 0.1 C and retains 120 mAhg-1 after 100 cycles";
        let pairs = rules().cycle_capacities(
            sentence,
            &[(15, 1), (94, 100)],
            &[(45, 150.0), (77, 120.0)],
            0,
        );
        assert_eq!(pairs, vec![(1, 150.0), (100, 120.0)]);
    }

    #[test]
    fn test_capacity_after_cycles() {
        let sentence = "a capacity of 120 mAhg-1 after 100 cycles at 1 C";
        let pairs = rules().cycle_capacities(sentence, &[(30, 100)], &[(14, 120.0)], 0);
        assert_eq!(pairs, vec![(100, 120.0)]);
    }

    #[test]
    fn test_capacity_from_to() {
        let sentence = "the capacity decreases from 160 to 130 mAhg-1 over 50 cycles";
        let pairs = rules().cycle_capacities(sentence, &[(51, 50)], &[(28, 160.0), (28, 130.0)], 0);
        assert_eq!(pairs, vec![(1, 160.0), (50, 130.0)]);
    }

    #[test]
    fn test_charge_discharge_alternation() {
        let sentence = "charge/discharge capacities of 170 and 150, 160 and 140 mAhg-1 in the 2 cycle";
        let pairs = rules().cycle_capacities(
            sentence,
            &[(70, 2)],
            &[(31, 170.0), (31, 150.0), (31, 160.0), (31, 140.0)],
            0,
        );
        assert_eq!(pairs, vec![(2, 150.0), (2, 140.0)]);
    }

    #[test]
    fn test_rate_capability_takes_first() {
        let sentence = "good rate capability with 110 mAhg-1 in 50 cycles";
        let pairs = rules().cycle_capacities(sentence, &[(40, 50)], &[(26, 110.0), (26, 90.0)], 0);
        assert_eq!(pairs, vec![(50, 110.0)]);
    }

    #[test]
    fn test_bisect_left() {
        assert_eq!(bisect_left(&[15, 94], 45, 0, 2), 1);
        assert_eq!(bisect_left(&[15, 94], 10, 0, 2), 0);
        assert_eq!(bisect_left(&[15, 94], 100, 1, 2), 2);
    }
}
