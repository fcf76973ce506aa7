//! Country-level attributes.

use std::{collections::BTreeMap, path::Path};

use similarity_region_models::{AttributeRow, RegionKey, metadata::CountryMetadata};

use crate::{
    AttributeExtractor, ExtractContext, ExtractError, column_index, parse_number,
    population_count, read_first_row,
};

/// Extracts population and area for every country.
///
/// Area comes from a table with one row per country code and one column per
/// year; the most recent year with a value wins. Population is read from
/// the first row of the country's timeline file.
#[derive(Debug, Clone)]
pub struct CountryExtractor {
    id: String,
    area_by_code: BTreeMap<String, f64>,
    population_column: String,
}

impl CountryExtractor {
    /// Builds the extractor from an already loaded area lookup.
    #[must_use]
    pub fn new(
        id: &str,
        area_by_code: BTreeMap<String, f64>,
        population_column: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            area_by_code,
            population_column: population_column.to_string(),
        }
    }

    /// Loads the area table at `area_file`, trying the `years` columns in
    /// order for each country code.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if the table cannot be read, lacks the code
    /// column, or holds a non-numeric area.
    pub fn load(
        id: &str,
        area_file: &Path,
        code_column: &str,
        years: impl Iterator<Item = u16>,
        population_column: &str,
    ) -> Result<Self, ExtractError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(area_file)?;
        let headers = reader.headers()?.clone();
        let code_idx = column_index(&headers, code_column, area_file)?;
        let year_columns: Vec<(String, usize)> = years
            .filter_map(|year| {
                let name = year.to_string();
                let idx = headers.iter().position(|h| h.trim() == name)?;
                Some((name, idx))
            })
            .collect();

        let mut area_by_code = BTreeMap::new();
        for record in reader.records() {
            let record = record?;
            let Some(code) = record.get(code_idx).map(str::trim).filter(|c| !c.is_empty())
            else {
                continue;
            };
            for (name, idx) in &year_columns {
                let cell = record.get(*idx).unwrap_or_default();
                if let Some(area) = parse_number(cell, name, area_file)? {
                    area_by_code.insert(code.to_string(), area);
                    break;
                }
            }
        }

        log::debug!(
            "[{id}] loaded area for {} country codes from {}",
            area_by_code.len(),
            area_file.display()
        );
        Ok(Self::new(id, area_by_code, population_column))
    }

    /// Area recorded for a country code.
    #[must_use]
    pub fn area(&self, code: &str) -> Option<f64> {
        self.area_by_code.get(code).copied()
    }
}

impl AttributeExtractor for CountryExtractor {
    fn id(&self) -> &str {
        &self.id
    }

    fn applies_to(&self, _country_key: &str) -> bool {
        true
    }

    fn extract(
        &self,
        country_key: &str,
        country: &CountryMetadata,
        ctx: &ExtractContext,
    ) -> Result<Vec<AttributeRow>, ExtractError> {
        let Some(area_km) = country
            .country_territory_code
            .as_deref()
            .and_then(|code| self.area(code))
        else {
            log::debug!("[{country_key}] no area known, skipping");
            return Ok(Vec::new());
        };

        let path = ctx.data_file(&country.file);
        let (headers, row) = read_first_row(&path)?;
        let idx = column_index(&headers, &self.population_column, &path)?;
        let cell = row.get(idx).unwrap_or_default();
        let Some(population) = parse_number(cell, &self.population_column, &path)? else {
            log::debug!("[{country_key}] no population known, skipping");
            return Ok(Vec::new());
        };

        Ok(vec![AttributeRow::new(
            RegionKey::new(country_key),
            population_count(population),
            area_km,
        )])
    }
}

#[cfg(test)]
mod tests {
    use similarity_region_models::metadata::MetadataIndex;

    use super::*;
    use crate::test_support::{scratch_dir, write};

    const AREA: &str = "\
Country Name,Country Code,2017,2018,2019
Sweden,SWE,407280,407284,
Norway,NOR,365000,,
Atlantis,ATL,,,
";

    fn extractor(dir: &Path) -> CountryExtractor {
        CountryExtractor::load(
            "countries",
            &dir.join("raw/area_by_country.csv"),
            "Country Code",
            (1960..=2019).rev(),
            "popData2018",
        )
        .unwrap()
    }

    #[test]
    fn picks_most_recent_year_with_a_value() {
        let dir = scratch_dir();
        write(&dir, "raw/area_by_country.csv", AREA);
        let ex = extractor(&dir);
        assert_eq!(ex.area("SWE"), Some(407_284.0));
        assert_eq!(ex.area("NOR"), Some(365_000.0));
        assert_eq!(ex.area("ATL"), None);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn reads_population_from_first_row() {
        let dir = scratch_dir();
        write(&dir, "raw/area_by_country.csv", AREA);
        write(
            &dir,
            "data/sweden.csv",
            "dateRep,cases,deaths,popData2018\n20/04/2020,10,1,10183175\n19/04/2020,5,0,10183175\n",
        );
        write(&dir, "data/atlantis.csv", "dateRep,popData2018\n20/04/2020,100\n");
        write(&dir, "data/norway.csv", "dateRep,popData2018\n20/04/2020,\n");

        let metadata = MetadataIndex::from_json_slice(
            br#"{
                "Sweden": {"file": "data/sweden.csv", "countryTerritoryCode": "SWE"},
                "Atlantis": {"file": "data/atlantis.csv", "countryTerritoryCode": "ATL"},
                "Norway": {"file": "data/norway.csv", "countryTerritoryCode": "NOR"},
                "Nowhere": {"file": "data/nowhere.csv"}
            }"#,
        )
        .unwrap();
        let ex = extractor(&dir);
        let ctx = ExtractContext::new(&dir, dir.join("raw"));

        let rows = ex
            .extract("Sweden", metadata.country("Sweden").unwrap(), &ctx)
            .unwrap();
        assert_eq!(
            rows,
            [AttributeRow::new("Sweden".into(), 10_183_175, 407_284.0)]
        );

        for key in ["Atlantis", "Norway", "Nowhere"] {
            let rows = ex
                .extract(key, metadata.country(key).unwrap(), &ctx)
                .unwrap();
            assert!(rows.is_empty(), "{key}");
        }
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_area_table_is_an_error() {
        let dir = scratch_dir();
        let err = CountryExtractor::load(
            "countries",
            &dir.join("raw/nope.csv"),
            "Country Code",
            (1960..=2019).rev(),
            "popData2018",
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::Csv(_)));
        std::fs::remove_dir_all(dir).ok();
    }
}
