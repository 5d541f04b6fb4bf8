//! End-to-end pipeline tests

use std::sync::Arc;

use cathode_chem::NoCache;
use cathode_core::{Category, Current, CurrentUnit, ExtractorConfig};
use cathode_extractor::{DocumentInput, Pipeline};

const INTRODUCTION: &str =
    "Layered oxides are promising cathodes.$$Herein, Na0.67Ni0.33Mn0.67O2 (NM) was synthesized by a solid-state reaction.";

const EXPERIMENTAL: &str =
    "Precursors were preheated at 500 °C for 5 h. The powder was calcined at 900 °C for 12 h.";

const PROPERTIES: &str = "NM delivers an initial discharge capacity of 150 mAhg-1 at 0.1 C and retains 120 mAhg-1 after 100 cycles in the voltage range of 2.0-4.0V.";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cathode_extractor=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn pipeline() -> Pipeline {
    init_tracing();
    Pipeline::builder()
        .with_config(ExtractorConfig::default())
        .with_cache(Arc::new(NoCache))
        .build()
        .unwrap()
}

fn document(properties: &str) -> DocumentInput {
    DocumentInput::from_text(properties)
        .with_meta("10.1000/cathode", 2022)
        .with_introduction(INTRODUCTION)
        .with_experimental(EXPERIMENTAL)
}

#[test]
fn test_worked_example() {
    let output = pipeline().extract(&document(PROPERTIES)).unwrap();

    assert_eq!(output.abbreviations.len(), 1);
    assert_eq!(output.abbreviations[0].abbreviation, "NM");
    assert_eq!(output.abbreviations[0].formula, "Na0.67Mn0.67Ni0.33O2");

    let cycling: Vec<_> = output
        .final_records
        .iter()
        .filter(|r| r.category == Category::Cycling)
        .collect();
    assert_eq!(cycling.len(), 2);
    assert_eq!((cycling[0].cycle, cycling[0].capacity), (Some(1), Some(150.0)));
    assert_eq!((cycling[1].cycle, cycling[1].capacity), (Some(100), Some(120.0)));

    for row in &cycling {
        assert_eq!(row.name, "Na0.67Mn0.67Ni0.33O2");
        assert_eq!(row.abbreviation.as_deref(), Some("NM"));
        assert_eq!(row.doi.as_deref(), Some("10.1000/cathode"));
        assert_eq!(row.year, Some(2022));
        assert_eq!(row.current, Some(Current::new(CurrentUnit::CRate, 0.1)));
        assert_eq!((row.voltage_lower, row.voltage_upper), (Some(2.0), Some(4.0)));
        assert_eq!(row.sintering_temperature, Some(900.0));
        assert_eq!(row.sintering_time, Some(12.0));
        assert!(row.retention.is_none());
    }
}

#[test]
fn test_c_rate_converted_with_definition() {
    let properties = format!("Here 1C = 150 mAg-1 was used.$${PROPERTIES}");
    let output = pipeline().extract(&document(&properties)).unwrap();

    let first = output
        .final_records
        .iter()
        .find(|r| r.cycle == Some(1))
        .unwrap();
    assert_eq!(
        first.current,
        Some(Current::new(CurrentUnit::MilliAmpPerGram, 15.0))
    );
}

#[test]
fn test_final_records_json_shape() {
    let output = pipeline().extract(&document(PROPERTIES)).unwrap();
    let json = output.final_records_json().unwrap();
    let rows: serde_json::Value = serde_json::from_str(&json).unwrap();
    let first = &rows[0];

    assert_eq!(first["Name"], "Na0.67Mn0.67Ni0.33O2");
    assert_eq!(first["Category"], "Cycling performance");
    assert_eq!(first["Current: C"], 0.1);
    assert!(first.get("Retention").is_none());
    let doi = json.find("\"Doi\"").unwrap();
    let name = json.find("\"Name\"").unwrap();
    let category = json.find("\"Category\"").unwrap();
    assert!(doi < name && name < category);
}

#[test]
fn test_paragraphs_without_cues_are_skipped() {
    let output = pipeline()
        .extract(&document("The slurry was cast onto aluminium foil."))
        .unwrap();
    assert!(output.property_records.is_empty());
    assert_eq!(output.abbreviations.len(), 1);
}

#[test]
fn test_pipeline_is_reusable() {
    let pipeline = pipeline();
    let first = pipeline.extract(&document(PROPERTIES)).unwrap();
    let second = pipeline.extract(&document(PROPERTIES)).unwrap();
    assert_eq!(first.final_records, second.final_records);
}

#[test]
fn test_document_state_does_not_leak() {
    let pipeline = pipeline();
    let with_definition = format!("Here 1C = 150 mAg-1 was used.$${PROPERTIES}");
    let first = pipeline.extract(&document(&with_definition)).unwrap();
    assert!(first
        .final_records
        .iter()
        .all(|r| r.sintering_temperature == Some(900.0)));
    assert!(first
        .final_records
        .iter()
        .any(|r| r.current == Some(Current::new(CurrentUnit::MilliAmpPerGram, 15.0))));

    let bare = DocumentInput::from_text(
        "Na0.67Mn0.67Ni0.33O2 delivers an initial discharge capacity of 150 mAhg-1 at 0.1 C and retains 120 mAhg-1 after 100 cycles in the voltage range of 2.0-4.0V.",
    );
    let second = pipeline.extract(&bare).unwrap();

    assert!(second.abbreviations.is_empty());
    assert!(second.custom_abbreviations.is_empty());
    assert!(!second.final_records.is_empty());
    for row in &second.final_records {
        assert_eq!(row.doi, None);
        assert_eq!(row.year, None);
        assert_eq!(row.abbreviation, None);
        assert_eq!(row.sintering_temperature, None);
        assert_eq!(row.sintering_time, None);
        assert_eq!(row.current, Some(Current::new(CurrentUnit::CRate, 0.1)));
    }
    for record in &second.property_records {
        assert_eq!(record.doi, None);
        assert_eq!(record.abbreviation, None);
        assert_eq!(record.sintering_temperature, None);
    }

    let again = pipeline.extract(&document(&with_definition)).unwrap();
    assert_eq!(first.final_records, again.final_records);
}
