//! Document extraction pipeline
//!
//! Harmonizes the text blocks of one document, rewrites tagged formulas to
//! their normalized form, links abbreviations over the introduction and
//! property text, then binds and post-processes property records.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cathode_chem::{cache, ChemEngine, ChemProfile, FormulaCache};
use cathode_core::{
    AbbreviationPair, DocumentMeta, ExtractorConfig, FinalRecord, PropertyRecord, Result,
};

use crate::abbreviation::{AbbreviationLinker, VariableBinding};
use crate::postprocess::postprocess;
use crate::property::PropertyBinder;
use crate::tagger::RuleTagger;
use crate::text::{rewrite_formulas, Harmonizer};
use crate::SentenceTagger;

/// Separator between paragraphs of a document block
pub const PARAGRAPH_SEPARATOR: &str = "$$";

/// A property paragraph mentions at least one of these
const ATTRIBUTE_PROMPTS: &[&str] = &["voltage", "mAhg-1", "V", "capacit", "mAg-1", "C", "Ag-1"];

fn is_property_paragraph(paragraph: &str) -> bool {
    ATTRIBUTE_PROMPTS.iter().any(|prompt| paragraph.contains(prompt))
}

/// Text blocks of one document, paragraphs separated by
/// [`PARAGRAPH_SEPARATOR`] or line breaks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInput {
    pub meta: DocumentMeta,
    pub introduction: String,
    pub experimental: String,
    pub properties: String,
}

impl DocumentInput {
    /// Document made of property text only
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            properties: text.into(),
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, doi: impl Into<String>, year: i32) -> Self {
        self.meta = DocumentMeta {
            doi: Some(doi.into()),
            year: Some(year),
        };
        self
    }

    pub fn with_introduction(mut self, text: impl Into<String>) -> Self {
        self.introduction = text.into();
        self
    }

    pub fn with_experimental(mut self, text: impl Into<String>) -> Self {
        self.experimental = text.into();
        self
    }
}

/// Everything extracted from one document
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionOutput {
    pub abbreviations: Vec<AbbreviationPair>,
    pub custom_abbreviations: Vec<AbbreviationPair>,
    pub stoichiometric_variables: Vec<VariableBinding>,
    pub property_records: Vec<PropertyRecord>,
    pub final_records: Vec<FinalRecord>,
}

impl ExtractionOutput {
    /// Final records as a JSON array in record field order
    pub fn final_records_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.final_records)?)
    }
}

/// Builder for [`Pipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    config: ExtractorConfig,
    tagger: Option<Arc<dyn SentenceTagger>>,
    cache: Option<Arc<dyn FormulaCache>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`RuleTagger`]
    pub fn with_tagger(mut self, tagger: Arc<dyn SentenceTagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// Replace the cache built from the cache configuration
    pub fn with_cache(mut self, cache: Arc<dyn FormulaCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let cache = self
            .cache
            .unwrap_or_else(|| cache::from_config(&self.config.cache));
        let engine = ChemEngine::new(ChemProfile::from_config(&self.config.profile), cache)?;
        let tagger = match self.tagger {
            Some(tagger) => tagger,
            None => Arc::new(RuleTagger::new(engine.clone())),
        };

        Ok(Pipeline {
            harmonizer: Harmonizer::new()?,
            linker: AbbreviationLinker::new(engine.clone(), self.config.linker.clone())?,
            binder: PropertyBinder::new(engine.clone(), self.config.binder.clone())?,
            engine,
            tagger,
        })
    }
}

/// Extracts abbreviations and property records from documents.
///
/// A pipeline holds no per-document state; every call to
/// [`Pipeline::extract`] starts fresh.
pub struct Pipeline {
    engine: ChemEngine,
    tagger: Arc<dyn SentenceTagger>,
    harmonizer: Harmonizer,
    linker: AbbreviationLinker,
    binder: PropertyBinder,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn engine(&self) -> &ChemEngine {
        &self.engine
    }

    pub fn extract(&self, input: &DocumentInput) -> Result<ExtractionOutput> {
        let introduction = self.prepare(
            input
                .introduction
                .trim_start_matches(PARAGRAPH_SEPARATOR)
                .trim_end_matches(PARAGRAPH_SEPARATOR),
        )?;
        let body = self.prepare(&input.properties)?;

        let linked_text = introduction
            .iter()
            .chain(body.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        let table = self.linker.link(&self.tagger.tag(&linked_text)?);

        let properties: Vec<&String> = body
            .iter()
            .filter(|paragraph| {
                let keep = is_property_paragraph(paragraph);
                if !keep {
                    debug!(paragraph = %paragraph, "Skipping paragraph without property cues");
                }
                keep
            })
            .collect();

        let experimental = self.prepare(&input.experimental)?;
        let experimental_text = if experimental.is_empty() {
            properties
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            experimental.join("\n")
        };

        let mut session = self.binder.session(&input.meta, &table);
        session.experimental(&self.tagger.tag(&experimental_text)?);
        for paragraph in &properties {
            session.paragraph(&self.tagger.tag(paragraph)?);
        }
        let (property_records, current_define) = session.finish();

        let final_records: Vec<FinalRecord> = property_records
            .iter()
            .flat_map(|record| postprocess(record, &current_define))
            .collect();

        info!(
            doi = input.meta.doi.as_deref().unwrap_or(""),
            abbreviations = table.abbreviations.len(),
            paragraphs = properties.len(),
            records = property_records.len(),
            final_records = final_records.len(),
            "Document extracted"
        );

        Ok(ExtractionOutput {
            abbreviations: table.abbreviations,
            custom_abbreviations: table.custom_abbreviations,
            stoichiometric_variables: table.stoichiometric_variables,
            property_records,
            final_records,
        })
    }

    /// Harmonized paragraphs of a block with tagged formulas normalized
    fn prepare(&self, block: &str) -> Result<Vec<String>> {
        let harmonized = self.harmonizer.harmonize(block);
        let mut paragraphs = Vec::new();
        for paragraph in harmonized
            .split(PARAGRAPH_SEPARATOR)
            .flat_map(|part| part.split('\n'))
            .map(str::trim)
            .filter(|part| !part.is_empty())
        {
            let rewritten = self
                .tagger
                .tag(paragraph)?
                .iter()
                .map(|sentence| rewrite_formulas(sentence, &self.engine))
                .collect::<Vec<_>>()
                .join(" ");
            paragraphs.push(rewritten);
        }
        Ok(paragraphs)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("engine", &self.engine)
            .field("linker", &self.linker)
            .field("binder", &self.binder)
            .finish()
    }
}
