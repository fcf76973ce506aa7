//! Upstream region metadata document (`metadata.json`).
//!
//! The data repository publishes one JSON object keyed by country. Each
//! entry names the timeline file for the country and, optionally, a map of
//! sub-regions with their own files. Column semantics (which columns hold
//! dates and counts, whether counts are incremental) can be declared at
//! either level.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::RegionKey;

/// How the columns of a raw timeline file should be read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSemantics {
    /// Column holding the observation date.
    #[serde(default = "default_date_column")]
    pub date_column: String,
    /// Column holding case counts.
    #[serde(default = "default_cases_column")]
    pub cases_column: String,
    /// Column holding death counts.
    #[serde(default = "default_deaths_column")]
    pub deaths_column: String,
    /// `true` when counts are incremental (per day) instead of cumulative.
    #[serde(default)]
    pub daily: bool,
    /// `true` when dates are written `dd/mm/yyyy`.
    #[serde(default)]
    pub day_first: bool,
    /// Column used to restrict rows to a single place.
    #[serde(default)]
    pub filter_column: Option<String>,
    /// Value `filter_column` must equal for a row to be kept.
    #[serde(default)]
    pub filter_value: Option<String>,
}

impl Default for ColumnSemantics {
    fn default() -> Self {
        Self {
            date_column: default_date_column(),
            cases_column: default_cases_column(),
            deaths_column: default_deaths_column(),
            daily: false,
            day_first: false,
            filter_column: None,
            filter_value: None,
        }
    }
}

fn default_date_column() -> String {
    "date".to_string()
}

fn default_cases_column() -> String {
    "cases".to_string()
}

fn default_deaths_column() -> String {
    "deaths".to_string()
}

/// Metadata for one sub-region of a country.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionMetadata {
    /// Timeline file, relative to the data repository root.
    pub file: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: Option<String>,
    /// Key of the enclosing region, for nested places.
    #[serde(default)]
    pub parent: Option<String>,
    /// Kind of place (`state`, `city`, `county`, ...).
    #[serde(default)]
    pub place_type: Option<String>,
    /// Column semantics of `file`.
    #[serde(flatten)]
    pub columns: ColumnSemantics,
}

/// Metadata for one country.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryMetadata {
    /// Timeline file, relative to the data repository root.
    pub file: String,
    /// ISO 3166 alpha-3 code, used to look up the country's area.
    #[serde(default)]
    pub country_territory_code: Option<String>,
    /// Sub-regions keyed by their short key.
    #[serde(default)]
    pub regions: BTreeMap<String, RegionMetadata>,
    /// Column semantics of `file`.
    #[serde(flatten)]
    pub columns: ColumnSemantics,
}

/// Where a region's raw timeline lives and how to read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDescriptor<'a> {
    /// Timeline file, relative to the data repository root.
    pub file: &'a str,
    /// Column semantics of `file`.
    pub columns: &'a ColumnSemantics,
}

/// The whole metadata document, keyed by country.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct MetadataIndex {
    countries: BTreeMap<String, CountryMetadata>,
}

impl MetadataIndex {
    /// Parses the raw JSON document.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the document is malformed.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Countries in key order.
    pub fn countries(&self) -> impl Iterator<Item = (&str, &CountryMetadata)> {
        self.countries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Metadata for a single country.
    #[must_use]
    pub fn country(&self, key: &str) -> Option<&CountryMetadata> {
        self.countries.get(key)
    }

    /// Resolves a dotted key to its timeline file and column semantics.
    #[must_use]
    pub fn resolve(&self, key: &RegionKey) -> Option<SourceDescriptor<'_>> {
        let country = self.countries.get(key.country())?;
        match key.region() {
            None => Some(SourceDescriptor {
                file: &country.file,
                columns: &country.columns,
            }),
            Some(region) => {
                let region = country.regions.get(region)?;
                Some(SourceDescriptor {
                    file: &region.file,
                    columns: &region.columns,
                })
            }
        }
    }
}
