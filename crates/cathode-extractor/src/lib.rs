//! Cathode Extractor - Relation extraction pipeline
//!
//! Links abbreviations to the formulas they stand for and binds measured
//! electrochemical properties (capacity, retention, cycle, current, voltage,
//! sintering conditions) to materials:
//! - Text harmonization and formula rewriting
//! - Abbreviation linking across a document introduction
//! - Per-sentence property harvesting and relation binding
//! - Post-processing into flat final records

use cathode_core::{Result, TaggedSentence};

/// Trait for sentence taggers.
///
/// A tagger splits text into sentences and reports chemical-entity spans
/// with absolute byte offsets into `text`.
pub trait SentenceTagger: Send + Sync {
    fn tag(&self, text: &str) -> Result<Vec<TaggedSentence>>;
}

pub mod abbreviation;
pub mod pipeline;
pub mod postprocess;
pub mod property;
mod scan;
pub mod tagger;
pub mod text;
pub mod tokenizer;

pub use abbreviation::{AbbreviationLinker, AbbreviationTable, VariableBinding};
pub use pipeline::{DocumentInput, ExtractionOutput, Pipeline, PipelineBuilder};
pub use postprocess::postprocess;
pub use property::{BindingSession, PropertyBinder};
pub use tagger::RuleTagger;
pub use text::Harmonizer;
