//! Post-processing integration tests

use cathode_core::{Category, PropertyRecord};
use cathode_extractor::postprocess;

#[test]
fn test_capacity_pairs_fan_out() {
    let mut record = PropertyRecord::new(Category::Cycling, "Na0.67MnO2");
    record.cycle_capacity = Some(vec![(1, 150.0), (100, 120.0)]);

    let rows = postprocess(&record, &[]);
    assert_eq!(rows.len(), 2);

    let json = serde_json::to_value(&rows).unwrap();
    assert_eq!(json[0]["Cycle"], 1);
    assert_eq!(json[0]["Capacity"], 150.0);
    assert_eq!(json[1]["Cycle"], 100);
    assert_eq!(json[1]["Capacity"], 120.0);
    assert!(json[0].get("Retention").is_none());
    assert!(json[1].get("Retention").is_none());
}

#[test]
fn test_retention_and_capacity_cross_derived() {
    let mut record = PropertyRecord::new(Category::Cycling, "Na0.67MnO2");
    record.cycle_capacity = Some(vec![(1, 160.0)]);
    record.cycle_retention = Some(vec![(200, 75.0)]);

    let rows = postprocess(&record, &[]);
    let derived = rows
        .iter()
        .find(|r| r.cycle == Some(200) && r.capacity.is_some())
        .unwrap();
    assert_eq!(derived.capacity, Some(120.0));
    assert!(rows
        .iter()
        .any(|r| r.cycle == Some(200) && r.retention == Some(75.0)));
}
