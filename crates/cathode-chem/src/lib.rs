//! Cathode Chem - Chemical formula engine
//!
//! This crate turns formula-like strings from battery papers into
//! structured compositions:
//! - Parsing with phase tags, oxygen non-stoichiometry, nested groups and
//!   symbolic variables
//! - Normalization to a canonical, IUPAC-ordered form
//! - Classification into a closed entity vocabulary
//! - Expansion of templated formulas into concrete variants
//!
//! All operations go through [`ChemEngine`], which memoizes them in a
//! content-addressed [`FormulaCache`].

pub mod brackets;
pub mod cache;
pub mod classify;
pub mod elements;
mod engine;
pub mod expand;
pub mod expr;
pub mod formula;
mod normalize;
mod patterns;
pub mod profile;

pub use brackets::{bracket_level, end_parentheses, match_group, search_group, GroupMatch};
pub use cache::{
    CacheOp, CacheStats, CacheStatsReport, CachedValue, FormulaCache, MokaFormulaCache, NoCache,
};
pub use classify::{is_word, word_shape, CompoundFormula, EntityTag};
pub use engine::ChemEngine;
pub use expand::format_amount;
pub use expr::{Expr, ExprError};
pub use formula::{Composition, DeficiencySign, OxygenDeficiency, VariableValues};
pub use profile::ChemProfile;

#[cfg(test)]
pub(crate) fn test_engine() -> ChemEngine {
    use std::sync::Arc;

    ChemEngine::new(ChemProfile::default(), Arc::new(NoCache)).unwrap()
}
