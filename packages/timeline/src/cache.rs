//! Lazy, per-key timeline cache backed by the data repository.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use similarity_region_models::{MetadataIndex, RegionKey};

use crate::normalize::normalize;
use crate::{Timeline, TimelineError, TimelineSource, reader};

/// Reads and normalizes a region's timeline file.
#[derive(Debug, Clone)]
pub struct TimelineLoader {
    data_dir: PathBuf,
    metadata: Arc<MetadataIndex>,
}

impl TimelineLoader {
    /// Creates a loader resolving files relative to `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, metadata: Arc<MetadataIndex>) -> Self {
        Self {
            data_dir: data_dir.into(),
            metadata,
        }
    }

    /// Root of the data repository.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The metadata document keys are resolved against.
    #[must_use]
    pub fn metadata(&self) -> &MetadataIndex {
        &self.metadata
    }

    /// Builds the timeline for `key` from disk.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineError`] if the key is unknown, the file cannot be
    /// read, or a row is malformed.
    pub fn load(&self, key: &RegionKey, population: Option<u64>) -> Result<Timeline, TimelineError> {
        let source = self
            .metadata
            .resolve(key)
            .ok_or_else(|| TimelineError::UnknownKey {
                key: key.to_string(),
            })?;
        let observations = reader::read_file(&self.data_dir.join(source.file), source.columns)?;
        Ok(normalize(observations, source.columns.daily, population))
    }
}

/// Timelines built on first access and kept for the cache's lifetime.
///
/// A timeline that fails to build is logged and cached as empty, so a broken
/// file is read once rather than once per comparison.
#[derive(Debug)]
pub struct TimelineCache {
    loader: TimelineLoader,
    entries: Mutex<BTreeMap<RegionKey, Arc<Timeline>>>,
}

impl TimelineCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(loader: TimelineLoader) -> Self {
        Self {
            loader,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// The loader backing this cache.
    #[must_use]
    pub const fn loader(&self) -> &TimelineLoader {
        &self.loader
    }

    /// Number of cached timelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if nothing has been loaded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<RegionKey, Arc<Timeline>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimelineSource for TimelineCache {
    fn timeline(&self, key: &RegionKey, population: Option<u64>) -> Arc<Timeline> {
        if let Some(timeline) = self.entries().get(key) {
            return Arc::clone(timeline);
        }

        // Loaded outside the lock so workers can build different keys in
        // parallel. The first insert wins if two workers race on one key.
        let timeline = match self.loader.load(key, population) {
            Ok(timeline) => timeline,
            Err(e) => {
                log::warn!("[{key}] unable to build timeline: {e}");
                Timeline::empty()
            }
        };

        Arc::clone(
            self.entries()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(timeline)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("similarity-timeline-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("data")).unwrap();
        dir
    }

    fn metadata() -> Arc<MetadataIndex> {
        let json = r#"{
            "Aland": { "file": "data/aland.csv" },
            "Broken": { "file": "data/broken.csv" },
            "Missing": { "file": "data/missing.csv" }
        }"#;
        Arc::new(MetadataIndex::from_json_slice(json.as_bytes()).unwrap())
    }

    #[test]
    fn loads_once_and_serves_from_memory() {
        let dir = scratch_dir();
        let file = dir.join("data/aland.csv");
        std::fs::write(&file, "date,cases,deaths\n2020-03-01,1,0\n2020-03-03,4,1\n").unwrap();

        let cache = TimelineCache::new(TimelineLoader::new(&dir, metadata()));
        let first = cache.timeline(&"Aland".into(), Some(30_000));
        assert_eq!(first.len(), 3);
        assert!(first.has_per_100k());

        std::fs::remove_file(&file).unwrap();
        let second = cache.timeline(&"Aland".into(), Some(30_000));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn failures_become_empty_timelines() {
        let dir = scratch_dir();
        std::fs::write(dir.join("data/broken.csv"), "day,count\n1,2\n").unwrap();

        let cache = TimelineCache::new(TimelineLoader::new(&dir, metadata()));
        assert!(cache.timeline(&"Broken".into(), None).is_empty());
        assert!(cache.timeline(&"Missing".into(), None).is_empty());
        assert!(cache.timeline(&"Atlantis".into(), None).is_empty());
        assert_eq!(cache.len(), 3);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn loader_reports_unknown_keys() {
        let loader = TimelineLoader::new("/nonexistent", metadata());
        assert!(matches!(
            loader.load(&"Atlantis".into(), None),
            Err(TimelineError::UnknownKey { .. })
        ));
    }
}
