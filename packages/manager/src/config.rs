//! Service configuration.
//!
//! Loaded from an optional TOML file named by `SIMILARITY_CONFIG`, with every
//! field defaulted, then selectively overridden from the environment.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use similarity_attributes::ExtractContext;
use similarity_distance::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LENGTH_LAG, DEFAULT_TOP_K, DEFAULT_WINDOW_DAYS, DistanceParams,
};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::ManagerError;

/// Which oracle decides whether a per-region file is fresh.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FreshnessMode {
    /// Time of the last commit touching the file in the output working copy.
    Git,
    /// File system modification time.
    #[default]
    Mtime,
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Root of the upstream data repository.
    pub data_dir: PathBuf,
    /// Where artifacts are written; may be a git working copy.
    pub output_dir: PathBuf,
    /// Metadata document, relative to `data_dir`.
    pub metadata_file: PathBuf,
    /// Auxiliary raw tables (area by country).
    pub raw_dir: PathBuf,
    /// Trailing distance window in days; `0` compares the whole overlap.
    pub window_days: usize,
    /// Neighbors kept per distance feature.
    pub top_k: usize,
    /// How much shorter a candidate timeline may be than the focal one.
    pub max_length_lag: usize,
    /// Focal regions per batch-mode chunk.
    pub chunk_size: usize,
    /// Size of the background worker pool.
    pub workers: usize,
    /// How long a table request waits for the bootstrap job.
    pub bootstrap_wait_secs: u64,
    /// Age after which a per-region file is recomputed.
    pub region_freshness_secs: u64,
    /// Cadence of the upstream sync and metadata check.
    pub source_refresh_secs: u64,
    /// Control loop tick.
    pub poll_interval_secs: u64,
    /// Freshness oracle for per-region files.
    pub freshness: FreshnessMode,
    /// Shell command run inside `output_dir` after artifacts change.
    pub publish_command: Option<String>,
    /// Whether to `git pull` the data repository on the refresh cadence.
    pub sync_data_repository: bool,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("inf-covid19-data"),
            output_dir: PathBuf::from("inf-covid19-similarity-data"),
            metadata_file: PathBuf::from("data/metadata.json"),
            raw_dir: PathBuf::from("raw"),
            window_days: DEFAULT_WINDOW_DAYS,
            top_k: DEFAULT_TOP_K,
            max_length_lag: DEFAULT_MAX_LENGTH_LAG,
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 4,
            bootstrap_wait_secs: 5,
            region_freshness_secs: 24 * 60 * 60,
            source_refresh_secs: 2 * 60 * 60,
            poll_interval_secs: 5,
            freshness: FreshnessMode::Mtime,
            publish_command: None,
            sync_data_repository: false,
        }
    }
}

impl SimilarityConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] if the config file cannot be read or parsed,
    /// or an override or resulting value is invalid.
    pub fn load() -> Result<Self, ManagerError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Loads the configuration using `env` to look up variables.
    ///
    /// # Errors
    ///
    /// See [`SimilarityConfig::load`].
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ManagerError> {
        let mut config = match env("SIMILARITY_CONFIG") {
            Some(path) => {
                log::info!("Loading configuration from {path}");
                Self::from_toml_str(&std::fs::read_to_string(&path)?)?
            }
            None => Self::default(),
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Toml`] if the document is malformed.
    pub fn from_toml_str(s: &str) -> Result<Self, ManagerError> {
        Ok(toml::de::from_str(s)?)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ManagerError> {
        if let Some(window) = env("SIMILARITY_TIME_WINDOW") {
            self.window_days = parse_env("SIMILARITY_TIME_WINDOW", &window)?;
        }
        if let Some(workers) = env("SIMILARITY_WORKERS") {
            self.workers = parse_env("SIMILARITY_WORKERS", &workers)?;
        }
        if let Some(dir) = env("SIMILARITY_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env("SIMILARITY_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ManagerError> {
        let zero = if self.workers == 0 {
            Some("workers")
        } else if self.chunk_size == 0 {
            Some("chunk_size")
        } else if self.poll_interval_secs == 0 {
            Some("poll_interval_secs")
        } else {
            None
        };
        zero.map_or(Ok(()), |name| {
            Err(ManagerError::Config {
                message: format!("{name} must be greater than zero"),
            })
        })
    }

    /// Full path of the metadata document.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(&self.metadata_file)
    }

    /// The output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Distance engine parameters.
    #[must_use]
    pub const fn distance_params(&self) -> DistanceParams {
        DistanceParams {
            window_days: self.window_days,
            max_length_lag: self.max_length_lag,
            chunk_size: self.chunk_size,
        }
    }

    /// Input locations for attribute extractors.
    #[must_use]
    pub fn extract_context(&self) -> ExtractContext {
        ExtractContext::new(&self.data_dir, &self.raw_dir)
    }

    /// Bounded wait of the table read path.
    #[must_use]
    pub const fn bootstrap_wait(&self) -> Duration {
        Duration::from_secs(self.bootstrap_wait_secs)
    }

    /// Freshness window of per-region files.
    #[must_use]
    pub const fn region_freshness(&self) -> Duration {
        Duration::from_secs(self.region_freshness_secs)
    }

    /// Upstream refresh cadence.
    #[must_use]
    pub const fn source_refresh(&self) -> Duration {
        Duration::from_secs(self.source_refresh_secs)
    }

    /// Control loop tick.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ManagerError> {
    value.trim().parse().map_err(|_| ManagerError::Config {
        message: format!("{name} has invalid value '{value}'"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = SimilarityConfig::load_with(env_of(&[])).unwrap();
        assert_eq!(config, SimilarityConfig::default());
        assert_eq!(
            config.metadata_path(),
            Path::new("inf-covid19-data/data/metadata.json")
        );
        assert_eq!(config.distance_params(), DistanceParams::default());
        assert_eq!(config.top_k, 100);
        assert_eq!(config.region_freshness(), Duration::from_secs(86_400));
        assert_eq!(config.source_refresh(), Duration::from_secs(7_200));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SimilarityConfig::from_toml_str(
            r#"
            window_days = 14
            freshness = "git"
            publish_command = "./commit-and-push.sh"
            "#,
        )
        .unwrap();
        assert_eq!(config.window_days, 14);
        assert_eq!(config.freshness, FreshnessMode::Git);
        assert_eq!(config.publish_command.as_deref(), Some("./commit-and-push.sh"));
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn env_overrides() {
        let config = SimilarityConfig::load_with(env_of(&[
            ("SIMILARITY_TIME_WINDOW", "0"),
            ("SIMILARITY_WORKERS", "2"),
            ("SIMILARITY_DATA_DIR", "/data"),
            ("SIMILARITY_OUTPUT_DIR", "/out"),
        ]))
        .unwrap();
        assert_eq!(config.window_days, 0);
        assert_eq!(config.workers, 2);
        assert_eq!(config.metadata_path(), Path::new("/data/data/metadata.json"));
        assert_eq!(config.output_dir(), Path::new("/out"));
    }

    #[test]
    fn rejects_invalid_values() {
        let err = SimilarityConfig::load_with(env_of(&[("SIMILARITY_TIME_WINDOW", "ten")]))
            .unwrap_err();
        assert!(matches!(err, ManagerError::Config { .. }));

        let err = SimilarityConfig::load_with(env_of(&[("SIMILARITY_WORKERS", "0")])).unwrap_err();
        assert!(err.to_string().contains("workers"));

        assert!(matches!(
            SimilarityConfig::from_toml_str("window_days = \"x\""),
            Err(ManagerError::Toml(_))
        ));
    }

    #[test]
    fn reads_config_file() {
        let dir = std::env::temp_dir().join(format!("similarity-manager-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("similarity.toml");
        std::fs::write(&file, "top_k = 5\nworkers = 8\n").unwrap();

        let path = file.display().to_string();
        let config = SimilarityConfig::load_with(env_of(&[
            ("SIMILARITY_CONFIG", path.as_str()),
            ("SIMILARITY_WORKERS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.workers, 3);
        std::fs::remove_dir_all(dir).ok();
    }
}
