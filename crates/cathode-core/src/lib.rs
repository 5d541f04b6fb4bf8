//! Cathode Core - Domain models, configuration and shared types
//!
//! This crate defines the abstractions shared by the chemistry engine and the
//! relation extractor:
//! - Tagged sentences and entity spans handed over by a tagger
//! - Abbreviation pairs, property records and final records
//! - Common error types
//! - Configuration management

pub mod config;
pub mod records;

pub use config::{
    BinderConfig, CacheConfig, ConfigError, ExtractorConfig, LinkerConfig, LoggingConfig,
    ProfileConfig,
};
pub use records::{
    Category, Current, CurrentUnit, FinalRecord, PropertyRecord, VoltageRange,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for extraction operations
#[derive(Error, Debug)]
pub enum CathodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Tagger error: {0}")]
    Tagger(String),

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CathodeError>;

// ============================================================================
// Tagged Text
// ============================================================================

/// A chemical-entity span reported by the tagger.
///
/// Offsets are absolute byte offsets into the text given to the tagger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl EntitySpan {
    pub fn new(text: impl Into<String>, start: usize) -> Self {
        let text = text.into();
        let end = start + text.len();
        Self { text, start, end }
    }
}

/// One sentence with its absolute offsets and the entity spans found in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedSentence {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub spans: Vec<EntitySpan>,
}

impl TaggedSentence {
    pub fn new(text: impl Into<String>, start: usize, spans: Vec<EntitySpan>) -> Self {
        let text = text.into();
        let end = start + text.len();
        Self {
            text,
            start,
            end,
            spans,
        }
    }

    /// Build a sentence at offset 0, tagging the first occurrence of each
    /// listed substring.
    pub fn with_entities(text: impl Into<String>, entities: &[&str]) -> Self {
        let text = text.into();
        let mut spans = Vec::new();
        let mut from = 0;
        for entity in entities {
            if let Some(pos) = text[from..].find(entity) {
                let start = from + pos;
                spans.push(EntitySpan::new(*entity, start));
                from = start + entity.len();
            }
        }
        Self::new(text, 0, spans)
    }

    /// Convert an absolute offset into an offset relative to this sentence
    pub fn local(&self, absolute: usize) -> usize {
        absolute.saturating_sub(self.start)
    }

    /// Sentence text from a local offset to the end, empty when out of range
    pub fn tail(&self, local: usize) -> &str {
        self.text.get(local..).unwrap_or("")
    }

    /// Byte at a local offset
    pub fn byte_at(&self, local: usize) -> Option<u8> {
        self.text.as_bytes().get(local).copied()
    }
}

/// Document-level metadata supplied by the sectioning collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub doi: Option<String>,
    pub year: Option<i32>,
}

// ============================================================================
// Abbreviations
// ============================================================================

/// An abbreviation linked to the formula it stands for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbbreviationPair {
    pub abbreviation: String,
    pub formula: String,
}

impl AbbreviationPair {
    pub fn new(abbreviation: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            abbreviation: abbreviation.into(),
            formula: formula.into(),
        }
    }
}

impl From<(&str, &str)> for AbbreviationPair {
    fn from((abbreviation, formula): (&str, &str)) -> Self {
        Self::new(abbreviation, formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_entities_offsets() {
        let sentence = TaggedSentence::with_entities(
            "Both Na0.67MnO2 and NaMnO2 were made.",
            &["Na0.67MnO2", "NaMnO2"],
        );
        assert_eq!(sentence.spans.len(), 2);
        assert_eq!(sentence.spans[0].start, 5);
        assert_eq!(sentence.spans[1].start, 20);
        assert_eq!(sentence.spans[1].end, 26);
        assert_eq!(sentence.end, sentence.text.len());
    }

    #[test]
    fn test_local_and_tail() {
        let sentence = TaggedSentence::new("abc (x)", 100, vec![]);
        assert_eq!(sentence.local(104), 4);
        assert_eq!(sentence.tail(4), "(x)");
        assert_eq!(sentence.tail(40), "");
        assert_eq!(sentence.byte_at(4), Some(b'('));
    }

    #[test]
    fn test_error_from_config() {
        let err: CathodeError = ConfigError::InvalidValue {
            key: "k".to_string(),
            value: "v".to_string(),
        }
        .into();
        assert!(err.to_string().contains("Invalid value for k"));
    }
}
