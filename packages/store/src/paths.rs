#![allow(clippy::module_name_repetitions)]
//! Canonical file paths inside the output directory.

use std::path::{Path, PathBuf};

use similarity_region_models::RegionKey;

/// Resolves artifact paths relative to one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    output_dir: PathBuf,
}

impl ArtifactPaths {
    /// Creates paths rooted at `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// The output directory itself.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns the global attribute + cluster table.
    #[must_use]
    pub fn regions_csv(&self) -> PathBuf {
        self.output_dir.join("regions.csv")
    }

    /// Returns the directory of per-region neighbor tables.
    #[must_use]
    pub fn by_key_dir(&self) -> PathBuf {
        self.output_dir.join("by_key")
    }

    /// Returns the neighbor table of one region.
    ///
    /// Path separators in the key are replaced so a key can never escape
    /// `by_key/`.
    #[must_use]
    pub fn region_csv(&self, key: &RegionKey) -> PathBuf {
        let name: String = key
            .as_str()
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        let name = if name.starts_with('.') {
            format!("_{name}")
        } else {
            name
        };
        self.by_key_dir().join(format!("{name}.csv"))
    }

    /// Returns the file holding the last-seen metadata hash.
    #[must_use]
    pub fn metadata_hash(&self) -> PathBuf {
        self.output_dir.join(".metadata.sha256")
    }

    /// Returns the default batch-mode output.
    #[must_use]
    pub fn pairs_csv(&self) -> PathBuf {
        self.output_dir.join("pairs.csv")
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
