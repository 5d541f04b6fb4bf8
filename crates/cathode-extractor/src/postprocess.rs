//! Post-processing of bound property records into final rows

use tracing::{debug, warn};

use cathode_core::{Category, Current, CurrentUnit, FinalRecord, PropertyRecord};

fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

/// Most frequent `1C = n mAg-1` ratio, the first seen winning ties
fn dominant_ratio(current_define: &[(f64, usize)]) -> Option<f64> {
    current_define
        .iter()
        .fold(None::<(f64, usize)>, |best, &(ratio, count)| match best {
            Some((_, top)) if top >= count => best,
            _ => Some((ratio, count)),
        })
        .map(|(ratio, _)| ratio)
}

/// Express C-rates and `Ag-1` currents in `mAg-1` where possible
fn convert_current(current: Option<Current>, current_define: &[(f64, usize)]) -> Option<Current> {
    let current = current?;
    match current.unit {
        CurrentUnit::CRate => match dominant_ratio(current_define) {
            Some(ratio) => Some(Current::new(
                CurrentUnit::MilliAmpPerGram,
                round_to(current.value * ratio, 2),
            )),
            None => Some(current),
        },
        CurrentUnit::AmpPerGram if current.value != 0.0 => Some(Current::new(
            CurrentUnit::MilliAmpPerGram,
            current.value * 1000.0,
        )),
        _ => Some(current),
    }
}

/// Fan one property record out into final rows.
///
/// Rate records give a single row. Cycling records give one row per cycle,
/// deriving capacities from retentions when the first-cycle capacity is
/// known.
pub fn postprocess(record: &PropertyRecord, current_define: &[(f64, usize)]) -> Vec<FinalRecord> {
    let mut base = FinalRecord::from_record(record);
    base.current = convert_current(record.current, current_define);

    let row = |cycle: u32, capacity: Option<f64>, retention: Option<f64>| FinalRecord {
        cycle: Some(cycle),
        capacity,
        retention,
        ..base.clone()
    };

    if record.category == Category::Rate {
        return vec![FinalRecord {
            capacity: record.capacity,
            ..base
        }];
    }

    match (&record.cycle_capacity, &record.cycle_retention) {
        (None, None) => Vec::new(),
        (Some(capacities), None) => {
            let mut seen = Vec::new();
            let mut rows = Vec::new();
            for &(cycle, capacity) in capacities {
                if !seen.contains(&cycle) {
                    rows.push(row(cycle, Some(capacity), None));
                    seen.push(cycle);
                }
            }
            rows
        }
        (None, Some(retentions)) => retentions
            .iter()
            .filter(|&&(cycle, _)| {
                if cycle <= 1 {
                    debug!(name = %record.name, "retention without a later cycle dropped");
                }
                cycle > 1
            })
            .map(|&(cycle, retention)| row(cycle, None, Some(retention)))
            .collect(),
        (Some(capacities), Some(retentions)) => {
            let mut first_cycles = 0;
            let mut known: Vec<(u32, f64)> = Vec::new();
            for &(cycle, capacity) in capacities {
                if cycle == 1 {
                    first_cycles += 1;
                }
                if first_cycles > 1 {
                    break;
                }
                if !known.iter().any(|&(c, _)| c == cycle) {
                    known.push((cycle, capacity));
                }
            }

            let mut rows: Vec<FinalRecord> = capacities
                .iter()
                .map(|&(cycle, capacity)| row(cycle, Some(capacity), None))
                .chain(
                    retentions
                        .iter()
                        .map(|&(cycle, retention)| row(cycle, None, Some(retention))),
                )
                .collect();

            match first_cycles {
                0 => {
                    if let (Some(&(cap_cycle, capacity)), Some(&(ret_cycle, retention))) =
                        (capacities.first(), retentions.first())
                    {
                        if cap_cycle == ret_cycle {
                            let initial = round_to(capacity * 100.0 / retention, 1);
                            if initial.is_finite() {
                                rows.push(row(1, Some(initial), None));
                            } else {
                                warn!(name = %record.name, retention, "Cannot derive initial capacity");
                            }
                        }
                    }
                    rows
                }
                1 => {
                    let initial = known.iter().find(|&&(c, _)| c == 1).map(|&(_, c)| c);
                    if let Some(initial) = initial {
                        for &(cycle, retention) in retentions {
                            if !known.iter().any(|&(c, _)| c == cycle) {
                                let derived = round_to(initial * retention / 100.0, 1);
                                known.push((cycle, derived));
                                rows.push(row(cycle, Some(derived), None));
                            }
                        }
                    }
                    rows
                }
                _ => {
                    debug!(name = %record.name, "several first-cycle capacities kept unsplit");
                    vec![FinalRecord {
                        cycle_capacity: Some(capacities.clone()),
                        cycle_retention: Some(retentions.clone()),
                        ..base
                    }]
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cathode_core::VoltageRange;

    fn cycling(capacity: Option<Vec<(u32, f64)>>, retention: Option<Vec<(u32, f64)>>) -> PropertyRecord {
        let mut record = PropertyRecord::new(Category::Cycling, "Na0.67Mn0.67Ni0.33O2");
        record.cycle_capacity = capacity;
        record.cycle_retention = retention;
        record
    }

    #[test]
    fn test_capacity_only() {
        let record = cycling(Some(vec![(1, 150.0), (100, 120.0)]), None);
        let rows = postprocess(&record, &[]);
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].cycle, rows[0].capacity), (Some(1), Some(150.0)));
        assert_eq!((rows[1].cycle, rows[1].capacity), (Some(100), Some(120.0)));
        assert!(rows.iter().all(|r| r.retention.is_none()));
        let json = serde_json::to_string(&rows[0]).unwrap();
        assert!(!json.contains("Retention"));
    }

    #[test]
    fn test_repeated_cycle_kept_once() {
        let record = cycling(Some(vec![(1, 150.0), (1, 148.0)]), None);
        assert_eq!(postprocess(&record, &[]).len(), 1);
    }

    #[test]
    fn test_retention_only() {
        let record = cycling(None, Some(vec![(1, 100.0), (200, 85.0)]));
        let rows = postprocess(&record, &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].cycle, rows[0].retention), (Some(200), Some(85.0)));
    }

    #[test]
    fn test_retention_converted_with_first_capacity() {
        let record = cycling(Some(vec![(1, 150.0)]), Some(vec![(100, 80.0)]));
        let rows = postprocess(&record, &[]);
        assert_eq!(rows.len(), 3);
        assert_eq!((rows[2].cycle, rows[2].capacity), (Some(100), Some(120.0)));
    }

    #[test]
    fn test_initial_capacity_recovered() {
        let record = cycling(Some(vec![(100, 120.0)]), Some(vec![(100, 80.0)]));
        let rows = postprocess(&record, &[]);
        assert_eq!(rows.len(), 3);
        assert_eq!((rows[2].cycle, rows[2].capacity), (Some(1), Some(150.0)));
    }

    #[test]
    fn test_ambiguous_first_cycle_unsplit() {
        let record = cycling(Some(vec![(1, 150.0), (1, 140.0)]), Some(vec![(50, 90.0)]));
        let rows = postprocess(&record, &[]);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].cycle.is_none());
        assert_eq!(rows[0].cycle_capacity.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_rate_row() {
        let mut record = PropertyRecord::new(Category::Rate, "Na0.67MnO2");
        record.capacity = Some(95.0);
        record.retention = Some(70.0);
        record.current = Some(Current::new(CurrentUnit::CRate, 2.0));
        record.voltage = Some(VoltageRange::new(2.0, 4.0));
        let rows = postprocess(&record, &[(120.0, 1), (150.0, 3)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].capacity, Some(95.0));
        assert!(rows[0].retention.is_none());
        assert_eq!(rows[0].current, Some(Current::new(CurrentUnit::MilliAmpPerGram, 300.0)));
        assert_eq!((rows[0].voltage_lower, rows[0].voltage_upper), (Some(2.0), Some(4.0)));
    }

    #[test]
    fn test_current_conversion() {
        let c_rate = Some(Current::new(CurrentUnit::CRate, 0.1));
        assert_eq!(convert_current(c_rate, &[]), c_rate);
        assert_eq!(
            convert_current(c_rate, &[(150.0, 2), (120.0, 2)]),
            Some(Current::new(CurrentUnit::MilliAmpPerGram, 15.0))
        );
        assert_eq!(
            convert_current(Some(Current::new(CurrentUnit::AmpPerGram, 0.5)), &[]),
            Some(Current::new(CurrentUnit::MilliAmpPerGram, 500.0))
        );
        assert_eq!(dominant_ratio(&[]), None);
    }

    #[test]
    fn test_empty_cycling_record() {
        assert!(postprocess(&cycling(None, None), &[]).is_empty());
    }
}
