//! Sub-region attributes carried inside the timeline files themselves.

use similarity_region_models::{AttributeRow, RegionKey, metadata::CountryMetadata};

use crate::{
    AttributeExtractor, ExtractContext, ExtractError, column_index, parse_number,
    population_count, read_first_row,
};

/// Extracts population and area for each sub-region of one country from
/// the first row of the sub-region's timeline file.
#[derive(Debug, Clone)]
pub struct EmbeddedColumnsExtractor {
    id: String,
    country: String,
    population_column: String,
    area_column: String,
}

impl EmbeddedColumnsExtractor {
    /// Creates a new extractor for `country`.
    #[must_use]
    pub fn new(id: &str, country: &str, population_column: &str, area_column: &str) -> Self {
        Self {
            id: id.to_string(),
            country: country.to_string(),
            population_column: population_column.to_string(),
            area_column: area_column.to_string(),
        }
    }
}

impl AttributeExtractor for EmbeddedColumnsExtractor {
    fn id(&self) -> &str {
        &self.id
    }

    fn applies_to(&self, country_key: &str) -> bool {
        country_key == self.country
    }

    fn extract(
        &self,
        country_key: &str,
        country: &CountryMetadata,
        ctx: &ExtractContext,
    ) -> Result<Vec<AttributeRow>, ExtractError> {
        let mut rows = Vec::with_capacity(country.regions.len());

        for (region_key, region) in &country.regions {
            let path = ctx.data_file(&region.file);
            let (headers, row) = read_first_row(&path)?;
            let pop_idx = column_index(&headers, &self.population_column, &path)?;
            let area_idx = column_index(&headers, &self.area_column, &path)?;

            let population = parse_number(
                row.get(pop_idx).unwrap_or_default(),
                &self.population_column,
                &path,
            )?;
            let area_km = parse_number(
                row.get(area_idx).unwrap_or_default(),
                &self.area_column,
                &path,
            )?;

            let key = RegionKey::subregion(country_key, region_key);
            let (Some(population), Some(area_km)) = (population, area_km) else {
                log::debug!("[{key}] missing population or area, skipping");
                continue;
            };
            rows.push(AttributeRow::new(key, population_count(population), area_km));
        }

        Ok(rows)
    }
}
