//! The chemistry engine: one configured, shareable entry point for the
//! formula operations.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use cathode_core::{ExtractorConfig, Result};

use crate::cache::{self, CacheOp, CacheStatsReport, CachedValue, FormulaCache};
use crate::classify::EntityTag;
use crate::formula::Composition;
use crate::patterns::Patterns;
use crate::profile::ChemProfile;

/// Formula parser, normalizer, classifier and expander bound to a profile.
///
/// The engine holds no mutable state beyond its cache, and the cache never
/// changes a result, so one engine can serve any number of documents.
#[derive(Clone)]
pub struct ChemEngine {
    pub(crate) profile: ChemProfile,
    pub(crate) patterns: Patterns,
    pub(crate) cache: Arc<dyn FormulaCache>,
}

impl ChemEngine {
    pub fn new(profile: ChemProfile, cache: Arc<dyn FormulaCache>) -> Result<Self> {
        Ok(Self {
            profile,
            patterns: Patterns::compile()?,
            cache,
        })
    }

    /// Engine configured from the profile and cache sections
    pub fn from_config(config: &ExtractorConfig) -> Result<Self> {
        Self::new(
            ChemProfile::from_config(&config.profile),
            cache::from_config(&config.cache),
        )
    }

    pub fn profile(&self) -> &ChemProfile {
        &self.profile
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        self.cache.stats()
    }

    /// Parse a material string into its composition.
    ///
    /// An unparsable string gives an empty composition.
    pub fn parse(&self, text: &str) -> Arc<Composition> {
        if let Some(CachedValue::Composition(composition)) = self.cache.get(CacheOp::Parse, text) {
            return composition;
        }
        let composition = Arc::new(self.parse_material(text));
        if composition.is_empty() {
            debug!(text, "No composition");
        }
        self.cache.insert(
            CacheOp::Parse,
            text,
            CachedValue::Composition(Arc::clone(&composition)),
        );
        composition
    }

    /// Canonical form of a material string, used for identity comparison
    pub fn normalize(&self, text: &str) -> String {
        if let Some(CachedValue::Text(normalized)) = self.cache.get(CacheOp::Normalize, text) {
            return normalized;
        }
        let normalized = self.normalize_uncached(text);
        self.cache
            .insert(CacheOp::Normalize, text, CachedValue::Text(normalized.clone()));
        normalized
    }

    pub fn classify(&self, text: &str) -> EntityTag {
        if let Some(CachedValue::Tag(tag)) = self.cache.get(CacheOp::Classify, text) {
            return tag;
        }
        let tag = self.classify_uncached(text);
        self.cache.insert(CacheOp::Classify, text, CachedValue::Tag(tag));
        tag
    }
}

impl fmt::Debug for ChemEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChemEngine")
            .field("profile", &self.profile)
            .field("cache", &self.cache.stats().name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MokaFormulaCache;

    #[test]
    fn test_cache_hits_on_repeat() {
        let engine =
            ChemEngine::new(ChemProfile::default(), Arc::new(MokaFormulaCache::unbounded()))
                .unwrap();
        let first = engine.normalize("Na2/3MnO2");
        let second = engine.normalize("Na2/3MnO2");
        assert_eq!(first, second);
        assert_eq!(engine.cache_stats().hits, 1);
    }

    #[test]
    fn test_cache_does_not_change_results() {
        let cached = ChemEngine::from_config(&ExtractorConfig::default()).unwrap();
        let uncached = crate::test_engine();
        for text in ["Na3Ni2SbO6", "NCF", "Na0.67Mn1-xTixO2", "sodium", "(NM)"] {
            assert_eq!(cached.normalize(text), uncached.normalize(text));
            assert_eq!(cached.classify(text), uncached.classify(text));
            assert_eq!(*cached.parse(text), *uncached.parse(text));
            assert_eq!(cached.classify(text), uncached.classify(text));
        }
    }

    #[test]
    fn test_parse_shares_cached_composition() {
        let engine = ChemEngine::from_config(&ExtractorConfig::default()).unwrap();
        let first = engine.parse("NaMnO2");
        let second = engine.parse("NaMnO2");
        assert!(Arc::ptr_eq(&first, &second));
    }
}
