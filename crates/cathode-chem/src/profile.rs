//! Chemistry profile: the battery chemistry under study and the
//! vocabularies used by the classifier.

use cathode_core::ProfileConfig;

use crate::elements::{APPARATUS, OTHER, RAW_MATERIALS, SOLVENT_NAMES};

/// Immutable classification profile.
///
/// Built once from [`ProfileConfig`]; the extra vocabulary in the config is
/// appended to the built-in lists.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemProfile {
    /// Element whose presence marks a formula as a cathode candidate
    pub marker_element: String,
    /// Require a transition metal for a token to count as a compound formula
    pub tm_limit: bool,
    pub solvent_names: Vec<String>,
    pub raw_materials: Vec<String>,
    pub apparatus: Vec<String>,
    pub other: Vec<String>,
}

impl ChemProfile {
    pub fn from_config(config: &ProfileConfig) -> Self {
        fn merged(builtin: &[&str], extra: &[String]) -> Vec<String> {
            builtin
                .iter()
                .map(|s| s.to_string())
                .chain(extra.iter().cloned())
                .collect()
        }

        Self {
            marker_element: config.marker_element.clone(),
            tm_limit: config.tm_limit,
            solvent_names: merged(&SOLVENT_NAMES, &config.extra_solvents),
            raw_materials: merged(&RAW_MATERIALS, &config.extra_raw_materials),
            apparatus: merged(&APPARATUS, &config.extra_apparatus),
            other: merged(&OTHER, &config.extra_other),
        }
    }

    /// First letter of the marker element, used for loose abbreviation checks
    pub fn marker_initial(&self) -> &str {
        match self.marker_element.chars().next() {
            Some(c) => &self.marker_element[..c.len_utf8()],
            None => "",
        }
    }
}

impl Default for ChemProfile {
    fn default() -> Self {
        Self::from_config(&ProfileConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = ChemProfile::default();
        assert_eq!(profile.marker_element, "Na");
        assert_eq!(profile.marker_initial(), "N");
        assert!(profile.apparatus.iter().any(|a| a == "XRD"));
    }

    #[test]
    fn test_extra_vocabulary_is_appended() {
        let config = ProfileConfig {
            marker_element: "Li".to_string(),
            extra_apparatus: vec!["NMR".to_string()],
            ..ProfileConfig::default()
        };
        let profile = ChemProfile::from_config(&config);
        assert_eq!(profile.marker_element, "Li");
        assert_eq!(profile.apparatus.last().map(String::as_str), Some("NMR"));
        assert_eq!(profile.apparatus.len(), APPARATUS.len() + 1);
    }
}
