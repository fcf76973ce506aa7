//! Extractor registry: loads all extractor definitions from embedded TOML.
//!
//! Each `.toml` file in `packages/attributes/extractors/` is baked into the
//! binary at compile time via [`include_str!`]. Adding a country with its
//! own sub-region attributes means creating a TOML file and adding it to
//! the list below.

use crate::{
    AttributeExtractor, ExtractContext,
    definition::{ExtractorDefinition, parse_extractor_toml},
};

/// TOML configs embedded at compile time.
const EXTRACTOR_TOMLS: &[(&str, &str)] = &[
    ("countries", include_str!("../extractors/countries.toml")),
    ("sweden", include_str!("../extractors/sweden.toml")),
];

/// Total number of configured extractors (used in tests).
#[cfg(test)]
const EXPECTED_EXTRACTOR_COUNT: usize = 2;

/// Returns all configured extractor definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_extractors() -> Vec<ExtractorDefinition> {
    EXTRACTOR_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_extractor_toml(toml)
                .unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Instantiates `definitions`, logging and leaving out any that fail to
/// load their lookup tables.
#[must_use]
pub fn build_extractors(
    definitions: &[ExtractorDefinition],
    ctx: &ExtractContext,
) -> Vec<Box<dyn AttributeExtractor>> {
    definitions
        .iter()
        .filter_map(|def| match def.build(ctx) {
            Ok(extractor) => Some(extractor),
            Err(e) => {
                log::warn!("Extractor '{}' unavailable: {e}", def.id);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ExtractorConfig;

    #[test]
    fn loads_all_extractors() {
        let extractors = all_extractors();
        assert_eq!(
            extractors.len(),
            EXPECTED_EXTRACTOR_COUNT,
            "Expected {EXPECTED_EXTRACTOR_COUNT} extractors, found {}. \
             Update EXPECTED_EXTRACTOR_COUNT after adding/removing extractors.",
            extractors.len()
        );
    }

    #[test]
    fn extractor_ids_are_unique() {
        let extractors = all_extractors();
        let mut ids: Vec<&str> = extractors.iter().map(|e| e.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), EXPECTED_EXTRACTOR_COUNT);
    }

    #[test]
    fn year_ranges_are_ordered() {
        for def in &all_extractors() {
            assert!(!def.name.is_empty(), "extractor {} has empty name", def.id);
            if let ExtractorConfig::Country {
                newest_year,
                oldest_year,
                ..
            } = def.extractor
            {
                assert!(oldest_year <= newest_year, "extractor {}", def.id);
            }
        }
    }

    #[test]
    fn missing_lookup_table_drops_only_that_extractor() {
        let dir = std::env::temp_dir().join(format!(
            "similarity-attributes-{}",
            uuid::Uuid::new_v4()
        ));
        let ctx = ExtractContext::new(&dir, dir.join("raw"));
        let built = build_extractors(&all_extractors(), &ctx);
        let ids: Vec<&str> = built.iter().map(|e| e.id()).collect();
        assert_eq!(ids, ["sweden"]);
    }
}
