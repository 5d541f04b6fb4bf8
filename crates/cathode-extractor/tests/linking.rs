//! Abbreviation linking integration tests

use std::sync::Arc;

use cathode_chem::{ChemEngine, ChemProfile, NoCache};
use cathode_core::{AbbreviationPair, LinkerConfig};
use cathode_extractor::{AbbreviationLinker, RuleTagger, SentenceTagger};

fn engine() -> ChemEngine {
    ChemEngine::new(ChemProfile::default(), Arc::new(NoCache)).unwrap()
}

fn link(text: &str) -> cathode_extractor::AbbreviationTable {
    let engine = engine();
    let sentences = RuleTagger::new(engine.clone()).tag(text).unwrap();
    AbbreviationLinker::new(engine, LinkerConfig::default())
        .unwrap()
        .link(&sentences)
}

#[test]
fn test_bracketed_abbreviation() {
    let table = link("Herein, layered Na0.67Ni0.33Mn0.67O2 (NM) was prepared by a sol-gel route.");
    assert_eq!(
        table.abbreviations,
        vec![AbbreviationPair::new("NM", "Na0.67Mn0.67Ni0.33O2")]
    );
}

#[test]
fn test_later_mentions_do_not_duplicate() {
    let table = link(
        "Na0.67Ni0.33Mn0.67O2 (NM) was made. Then Na0.67Ni0.33Mn0.67O2 (NM) was coated. NM was cycled.",
    );
    assert_eq!(table.abbreviations.len(), 1);
}

#[test]
fn test_plain_text_links_nothing() {
    let table = link("The electrolyte was prepared in an argon-filled glove box.");
    assert!(table.abbreviations.is_empty());
    assert!(table.stoichiometric_variables.is_empty());
}
