//! Formula API integration tests
//!
//! Exercise the public engine surface the extractor relies on:
//! parse, normalize, classify and expand.

use std::sync::Arc;

use cathode_chem::{end_parentheses, ChemEngine, ChemProfile, EntityTag, MokaFormulaCache};
use cathode_core::{ExtractorConfig, ProfileConfig};

fn engine() -> ChemEngine {
    ChemEngine::from_config(&ExtractorConfig::default()).unwrap()
}

// =============================================================================
// Bracket Scanner
// =============================================================================

#[test]
fn test_end_parentheses_supplement() {
    let text = "Na3Mn1-xCrxTi(PO4)3 (x=0.01, 0.03, 0.05, 0.07, 0.10, 0.12, 0.15)";
    assert_eq!(
        end_parentheses(text),
        Some((20, "(x=0.01, 0.03, 0.05, 0.07, 0.10, 0.12, 0.15)"))
    );
    assert_eq!(end_parentheses("Nax(Cu-Fe-Mn)O2"), None);
}

// =============================================================================
// Normalize
// =============================================================================

#[test]
fn test_normalize_examples() {
    let engine = engine();
    assert_eq!(engine.normalize("Na2/3MnO2"), "Na0.67MnO2");
    assert_eq!(
        engine.normalize("Na0.67Ni0.31Mn0.67Y0.02O2(NMY-2)"),
        "Na0.67Y0.02Mn0.67Ni0.31O2 (NMY-2)"
    );
    assert_eq!(engine.normalize("Na0.67Ni0.33Mn0.67O2"), "Na0.67Mn0.67Ni0.33O2");
}

#[test]
fn test_normalize_follows_marker_element() {
    let config = ProfileConfig {
        marker_element: "Li".to_string(),
        ..ProfileConfig::default()
    };
    let engine = ChemEngine::new(
        ChemProfile::from_config(&config),
        Arc::new(MokaFormulaCache::unbounded()),
    )
    .unwrap();
    assert_eq!(engine.normalize("LiNi1/3Mn1/3Co1/3O2"), "LiMn0.33Co0.33Ni0.33O2");
    assert_eq!(engine.normalize("Na2/3MnO2"), "Na2/3MnO2");
}

// =============================================================================
// Parse and Expand
// =============================================================================

#[test]
fn test_parse_binds_variables_from_supplement() {
    let engine = engine();
    let composition = engine.parse("Na3Ni2Sb1-xRuxO6 (x = 0, 0.1, 0.2, 0.3)");
    assert_eq!(
        composition.symbols().collect::<Vec<_>>(),
        vec!["Na", "Ni", "Sb", "Ru", "O"]
    );
    assert_eq!(composition.variables().collect::<Vec<_>>(), vec!['x']);
    assert_eq!(composition.amounts_x[&'x'].values, vec![0.0, 0.1, 0.2, 0.3]);
}

#[test]
fn test_expand_variable_values() {
    let engine = engine();
    let composition = engine.parse("Na3Ni2Sb1-xRuxO6 (x = 0, 0.1, 0.2, 0.3)");
    let formulas = engine.expand(&composition);

    assert_eq!(formulas.len(), 4);
    let mut distinct = formulas.clone();
    distinct.dedup();
    assert_eq!(distinct.len(), 4);
    assert!(formulas.iter().all(|f| !f.contains('-')));
    assert_eq!(formulas[0], "NaNi0.67Sb0.33O2");
}

#[test]
fn test_expand_without_bindings_is_empty() {
    let engine = engine();
    let composition = engine.parse("Na0.67Mn1-xTixO2");
    assert!(!composition.is_empty());
    assert!(engine.expand(&composition).is_empty());
}

#[test]
fn test_unparsable_is_empty() {
    let engine = engine();
    assert!(engine.parse("sodium manganese oxide").is_empty());
    assert!(engine.parse("NCF").is_empty());
    assert!(engine.parse("").is_empty());
}

// =============================================================================
// Classify
// =============================================================================

#[test]
fn test_classify_examples() {
    let engine = engine();
    assert_eq!(engine.classify("P2-Na0.67Ni0.33Mn0.67O2"), EntityTag::Synthetic);
    assert_eq!(engine.classify("NM"), EntityTag::Abbreviation);
    assert_eq!(engine.classify("Na2/3MnO2"), EntityTag::Other);
    assert_eq!(engine.classify("XPS"), EntityTag::Apparatus);

    let normalized = engine.normalize("P2-Na2/3Ni1/3Mn2/3O2");
    assert_eq!(engine.classify(&normalized), EntityTag::Synthetic);
}

#[test]
fn test_results_serialize() {
    let engine = engine();
    let composition = engine.parse("Na0.67Mn0.5M0.5O2 (M = Nb, Mo)");
    let json = serde_json::to_value(&*composition).unwrap();
    assert_eq!(json["elements_x"]["M"], serde_json::json!(["Nb", "Mo"]));
    assert_eq!(serde_json::to_value(engine.classify("NM")).unwrap(), "is_likely_abbreviation");
}
