//! Config-driven extractor definitions.
//!
//! [`ExtractorDefinition`] is deserialized from the TOML files in
//! `packages/attributes/extractors/` and turned into a live
//! [`AttributeExtractor`] with [`ExtractorDefinition::build`].

use serde::Deserialize;

use crate::{
    AttributeExtractor, CountryExtractor, EmbeddedColumnsExtractor, ExtractContext, ExtractError,
};

/// A complete extractor definition.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorDefinition {
    /// Unique identifier (e.g., `"sweden"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Extraction strategy.
    pub extractor: ExtractorConfig,
}

/// How attributes are extracted.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorConfig {
    /// Country totals: area from a per-country-code table of yearly
    /// figures, population from the country's own timeline file.
    Country {
        /// Area table, relative to the raw directory.
        area_file: String,
        /// Column of the area table holding the country code.
        code_column: String,
        /// Column of the country timeline holding the population.
        population_column: String,
        /// First year column tried.
        newest_year: u16,
        /// Last year column tried.
        oldest_year: u16,
    },
    /// Sub-regions of one country whose timeline files carry population and
    /// area columns.
    EmbeddedColumns {
        /// Country key the extractor applies to.
        country: String,
        /// Column holding the population.
        population_column: String,
        /// Column holding the area in square kilometres.
        area_column: String,
    },
}

impl ExtractorDefinition {
    /// Instantiates the extractor, loading any shared lookup tables.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if a lookup table cannot be read.
    pub fn build(&self, ctx: &ExtractContext) -> Result<Box<dyn AttributeExtractor>, ExtractError> {
        Ok(match &self.extractor {
            ExtractorConfig::Country {
                area_file,
                code_column,
                population_column,
                newest_year,
                oldest_year,
            } => Box::new(CountryExtractor::load(
                &self.id,
                &ctx.raw_dir.join(area_file),
                code_column,
                (*oldest_year..=*newest_year).rev(),
                population_column,
            )?),
            ExtractorConfig::EmbeddedColumns {
                country,
                population_column,
                area_column,
            } => Box::new(EmbeddedColumnsExtractor::new(
                &self.id,
                country,
                population_column,
                area_column,
            )),
        })
    }
}

/// Parses an extractor definition from TOML.
///
/// # Errors
///
/// Returns the TOML error message if the definition is malformed.
pub fn parse_extractor_toml(toml_str: &str) -> Result<ExtractorDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}
