#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Static region attributes: population and land area.
//!
//! Attribute extractors turn the upstream metadata document plus auxiliary
//! raw files into [`AttributeRow`]s. Which extractors exist is configured by
//! TOML definitions embedded at compile time (see [`registry`]).
//! [`build_attribute_table`] runs them all and assembles the global
//! [`AttributeTable`] that the clusterer consumes.

pub mod country;
pub mod definition;
pub mod embedded;
pub mod registry;

use std::path::{Path, PathBuf};

use similarity_region_models::{
    AttributeRow, AttributeTable, RegionRow,
    metadata::{CountryMetadata, MetadataIndex},
};

pub use country::CountryExtractor;
pub use definition::{ExtractorConfig, ExtractorDefinition, parse_extractor_toml};
pub use embedded::EmbeddedColumnsExtractor;
pub use registry::{all_extractors, build_extractors};

/// Errors that can occur while extracting attributes.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is missing from a file.
    #[error("Column '{column}' not found in {file}")]
    MissingColumn {
        /// Column name.
        column: String,
        /// File that was read.
        file: String,
    },

    /// A file has a header but no data rows.
    #[error("No data rows in {file}")]
    Empty {
        /// File that was read.
        file: String,
    },

    /// A cell could not be parsed as a number.
    #[error("Invalid value '{value}' in column '{column}' of {file}")]
    InvalidValue {
        /// The offending cell.
        value: String,
        /// Column name.
        column: String,
        /// File that was read.
        file: String,
    },
}

/// Where extractors find their input files.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    /// Root of the upstream data repository; metadata `file` entries are
    /// relative to it.
    pub data_dir: PathBuf,
    /// Directory of auxiliary raw tables (e.g. area by country).
    pub raw_dir: PathBuf,
}

impl ExtractContext {
    /// Creates a new context.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, raw_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            raw_dir: raw_dir.into(),
        }
    }

    /// Resolves a metadata `file` entry.
    #[must_use]
    pub fn data_file(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }
}

/// Produces attribute rows for the regions of one country.
pub trait AttributeExtractor: Send + Sync {
    /// Identifier of this extractor, used in logs.
    fn id(&self) -> &str;

    /// Whether this extractor handles `country_key`.
    fn applies_to(&self, country_key: &str) -> bool;

    /// Extracts the rows this extractor contributes for one country.
    ///
    /// Regions lacking a value are left out rather than failing the whole
    /// country.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if an input file cannot be read or parsed.
    fn extract(
        &self,
        country_key: &str,
        country: &CountryMetadata,
        ctx: &ExtractContext,
    ) -> Result<Vec<AttributeRow>, ExtractError>;
}

/// Runs every applicable extractor over every country and assembles the
/// attribute table (density derived, no clusters or days yet).
///
/// A failing extractor is logged and skipped for that country only; rows
/// with a key already in the table are dropped with a warning.
#[must_use]
pub fn build_attribute_table(
    metadata: &MetadataIndex,
    extractors: &[Box<dyn AttributeExtractor>],
    ctx: &ExtractContext,
) -> AttributeTable {
    let mut table = AttributeTable::new();

    for (country_key, country) in metadata.countries() {
        for extractor in extractors.iter().filter(|e| e.applies_to(country_key)) {
            log::debug!("[{country_key}] running extractor '{}'", extractor.id());
            let rows = match extractor.extract(country_key, country, ctx) {
                Ok(rows) => rows,
                Err(e) => {
                    log::warn!(
                        "[{country_key}] extractor '{}' failed: {e}",
                        extractor.id()
                    );
                    continue;
                }
            };
            for row in rows {
                if let Err(e) = table.insert(RegionRow::from(row)) {
                    log::warn!("[{country_key}] {e}");
                }
            }
        }
    }

    log::info!("Built attribute table with {} regions", table.len());
    table
}

/// Reads the header and first data row of a CSV file.
pub(crate) fn read_first_row(
    path: &Path,
) -> Result<(csv::StringRecord, csv::StringRecord), ExtractError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let row = reader
        .records()
        .next()
        .ok_or_else(|| ExtractError::Empty {
            file: path.display().to_string(),
        })??;
    Ok((headers, row))
}

/// Finds a column by name.
pub(crate) fn column_index(
    headers: &csv::StringRecord,
    column: &str,
    path: &Path,
) -> Result<usize, ExtractError> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| ExtractError::MissingColumn {
            column: column.to_string(),
            file: path.display().to_string(),
        })
}

/// Parses a numeric cell. Empty cells are `Ok(None)`.
pub(crate) fn parse_number(
    value: &str,
    column: &str,
    path: &Path,
) -> Result<Option<f64>, ExtractError> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => Ok(Some(n)),
        _ => Err(ExtractError::InvalidValue {
            value: value.to_string(),
            column: column.to_string(),
            file: path.display().to_string(),
        }),
    }
}

/// Converts a parsed population figure to a head count.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn population_count(value: f64) -> u64 {
    value.round() as u64
}
