#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Compute/cache manager for region similarity.
//!
//! The [`Manager`] owns the loaded global table and the status of every
//! background job. Requests are answered from what is already on disk or in
//! memory; anything stale is recomputed on a fixed-size [`WorkerPool`] and
//! picked up on a later request or control-loop tick.
//!
//! All job bookkeeping happens under one mutex, so "is a job running for this
//! key? if not, launch one" is a single atomic step. Workers only report back
//! through their [`TaskHandle`](pool::TaskHandle).

pub mod config;
pub mod job;
pub mod jobs;
pub mod pool;

use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Instant, SystemTime},
};

use futures::{FutureExt as _, future::BoxFuture};
use similarity_attributes::{ExtractorDefinition, all_extractors};
use similarity_cluster::ClusterError;
use similarity_distance::{ChunkJob, DistanceError, compute_all_pairs_with};
use similarity_region_models::{RegionKey, TableError};
use similarity_store::{
    ArtifactPaths, CommandPublisher, DataSync, FileMtime, GitCommitTime, GitSync, LastModified,
    NoopPublisher, NoopSync, Publisher, StoreError, is_fresh, metadata_hash, write_pairs,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

pub use config::{FreshnessMode, SimilarityConfig};
pub use job::{Job, JobStatus};
pub use jobs::Snapshot;
pub use pool::{TaskHandle, WorkerPool};

/// Errors surfaced by the manager.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    Config {
        /// What is wrong.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A background job failed.
    #[error(transparent)]
    Job(#[from] JobError),

    /// Distance computation failed.
    #[error(transparent)]
    Distance(#[from] DistanceError),

    /// Artifact persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The global table could not be loaded.
    #[error("Region table not ready: {message}")]
    NotReady {
        /// Why the table is unavailable.
        message: String,
    },
}

/// Failure of one background job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The job panicked.
    #[error("Job panicked: {message}")]
    Panicked {
        /// The panic payload.
        message: String,
    },

    /// The job was dropped before it reported a result.
    #[error("Job was cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The metadata document is malformed.
    #[error("Invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Clustering failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// The attribute table rejected an update.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Distance computation failed.
    #[error(transparent)]
    Distance(#[from] DistanceError),

    /// Artifact persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    /// The artifact's bytes.
    Ready {
        /// CSV contents.
        body: Arc<[u8]>,
        /// Whether the artifact is confirmed fresh and may be cached
        /// downstream.
        cacheable: bool,
    },
    /// Still being computed; ask again later.
    NotReady,
    /// The key is not a tracked region.
    NotFound,
}

/// Point-in-time view of the manager's jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStatus {
    /// Whether the global table is loaded.
    pub ready: bool,
    /// Status of the global table job.
    pub global: JobStatus,
    /// Status of every per-region job launched so far.
    pub processes: BTreeMap<RegionKey, JobStatus>,
}

/// External collaborators of the manager.
#[derive(Clone)]
pub struct Collaborators {
    /// Attribute extractor definitions.
    pub extractors: Arc<[ExtractorDefinition]>,
    /// Freshness oracle for per-region files.
    pub freshness: Arc<dyn LastModified>,
    /// Publishes the output directory after a write.
    pub publisher: Arc<dyn Publisher>,
    /// Refreshes the upstream data repository.
    pub data_sync: Arc<dyn DataSync>,
}

impl Collaborators {
    /// The production collaborators described by `config`.
    #[must_use]
    pub fn from_config(config: &SimilarityConfig) -> Self {
        let freshness: Arc<dyn LastModified> = match config.freshness {
            FreshnessMode::Git => Arc::new(GitCommitTime::new(config.output_dir())),
            FreshnessMode::Mtime => Arc::new(FileMtime),
        };
        let publisher: Arc<dyn Publisher> = match &config.publish_command {
            Some(command) => Arc::new(CommandPublisher::new(config.output_dir(), command)),
            None => Arc::new(NoopPublisher),
        };
        let data_sync: Arc<dyn DataSync> = if config.sync_data_repository {
            Arc::new(GitSync::new(&config.data_dir))
        } else {
            Arc::new(NoopSync)
        };

        Self {
            extractors: Arc::from(all_extractors()),
            freshness,
            publisher,
            data_sync,
        }
    }
}

struct ManagerState {
    snapshot: Option<Arc<Snapshot>>,
    global: Job<Snapshot>,
    regions: BTreeMap<RegionKey, Job<()>>,
    last_refresh: Instant,
}

/// Serves similarity artifacts and keeps them fresh.
pub struct Manager {
    config: Arc<SimilarityConfig>,
    paths: ArtifactPaths,
    collaborators: Collaborators,
    pool: WorkerPool,
    state: Mutex<ManagerState>,
}

impl Manager {
    /// Creates a manager with nothing loaded and no jobs running.
    #[must_use]
    pub fn new(config: SimilarityConfig, collaborators: Collaborators) -> Self {
        let paths = ArtifactPaths::new(config.output_dir());
        let pool = WorkerPool::new(config.workers);
        Self {
            config: Arc::new(config),
            paths,
            collaborators,
            pool,
            state: Mutex::new(ManagerState {
                snapshot: None,
                global: Job::new(),
                regions: BTreeMap::new(),
                last_refresh: Instant::now(),
            }),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Artifact locations.
    #[must_use]
    pub const fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Harvests finished jobs into their statuses.
    pub fn poll(&self) {
        Self::harvest(&mut self.lock());
    }

    fn harvest(state: &mut ManagerState) {
        match state.global.harvest() {
            Some(Ok(snapshot)) => {
                log::info!(
                    "Region table loaded: {} regions (metadata {})",
                    snapshot.table.len(),
                    snapshot.metadata_hash
                );
                state.snapshot = Some(Arc::new(snapshot));
            }
            Some(Err(e)) => log::error!("Region table job failed: {e}"),
            None => {}
        }

        for (key, job) in &mut state.regions {
            match job.harvest() {
                Some(Ok(())) => log::debug!("[{key}] neighbor job done"),
                Some(Err(e)) => log::error!("[{key}] neighbor job failed: {e}"),
                None => {}
            }
        }
    }

    fn ensure_global(&self, state: &mut ManagerState) {
        if state.global.is_running() {
            return;
        }
        log::info!("Launching region table job");
        let config = Arc::clone(&self.config);
        let extractors = Arc::clone(&self.collaborators.extractors);
        let publisher = Arc::clone(&self.collaborators.publisher);
        state.global.start(self.pool.submit(move || {
            jobs::build_snapshot(&config, &extractors, publisher.as_ref())
        }));
    }

    fn ensure_region(&self, state: &mut ManagerState, key: &RegionKey) {
        let Some(snapshot) = state.snapshot.clone() else {
            self.ensure_global(state);
            return;
        };
        let job = state.regions.entry(key.clone()).or_default();
        if job.is_running() {
            log::debug!("[{key}] neighbor job already running");
            return;
        }

        log::info!("[{key}] launching neighbor job");
        let key = key.clone();
        let path = self.paths.region_csv(&key);
        let params = self.config.distance_params();
        let top_k = self.config.top_k;
        let publisher = Arc::clone(&self.collaborators.publisher);
        job.start(self.pool.submit(move || {
            jobs::compute_region(&snapshot, &key, &params, top_k, &path, publisher.as_ref())
        }));
    }

    /// Launches the bootstrap job if no table is loaded. Returns a future
    /// resolving when the in-flight global job finishes.
    fn launch_global(&self) -> Option<impl Future<Output = ()> + Send + use<>> {
        let mut state = self.lock();
        Self::harvest(&mut state);
        if state.snapshot.is_none() {
            self.ensure_global(&mut state);
        }
        state.global.finished()
    }

    fn current_regions(&self) -> Option<Served> {
        let mut state = self.lock();
        Self::harvest(&mut state);
        let cacheable = !state.global.is_running();
        state.snapshot.as_ref().map(|snapshot| Served::Ready {
            body: Arc::clone(&snapshot.regions_csv),
            cacheable,
        })
    }

    /// Returns the global table.
    ///
    /// When nothing is loaded yet the bootstrap job is started (or joined)
    /// and awaited for at most `bootstrap_wait`. The response is cacheable
    /// only while no rebuild is running.
    pub async fn get_regions(&self) -> Served {
        if let Some(served) = self.current_regions() {
            return served;
        }
        if let Some(pending) = self.launch_global()
            && tokio::time::timeout(self.config.bootstrap_wait(), pending)
                .await
                .is_err()
        {
            log::debug!("Region table not ready after {:?}", self.config.bootstrap_wait());
        }
        self.current_regions().unwrap_or(Served::NotReady)
    }

    /// Resolves a region key against the loaded table.
    fn lookup(&self, key: &RegionKey) -> Result<(), Served> {
        let mut state = self.lock();
        Self::harvest(&mut state);
        if state.snapshot.is_none() {
            self.ensure_global(&mut state);
            return Err(Served::NotReady);
        }
        let known = state
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.table.get(key).is_some());
        if known {
            Ok(())
        } else {
            Err(Served::NotFound)
        }
    }

    async fn is_region_fresh(&self, path: &Path) -> bool {
        let oracle = Arc::clone(&self.collaborators.freshness);
        let max_age = self.config.region_freshness();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            is_fresh(oracle.as_ref(), &path, max_age, SystemTime::now())
        })
        .await
        .unwrap_or_else(|e| {
            log::warn!("Freshness check failed: {e}");
            false
        })
    }

    fn region_running(&self, key: &RegionKey) -> bool {
        self.lock().regions.get(key).is_some_and(Job::is_running)
    }

    /// Returns the neighbor table of `key`.
    ///
    /// A fresh file on disk is served directly. Otherwise a recompute is
    /// launched (unless one is already running for the key) and the
    /// response is [`Served::NotReady`].
    pub async fn get_region(&self, key: &RegionKey) -> Served {
        if let Err(served) = self.lookup(key) {
            return served;
        }

        let path = self.paths.region_csv(key);
        if self.is_region_fresh(&path).await {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    return Served::Ready {
                        body: Arc::from(bytes),
                        cacheable: !self.region_running(key),
                    };
                }
                Err(e) => log::warn!("[{key}] unable to read {}: {e}", path.display()),
            }
        }

        let mut state = self.lock();
        self.ensure_region(&mut state, key);
        Served::NotReady
    }

    /// Current job statuses.
    #[must_use]
    pub fn status(&self) -> ManagerStatus {
        let mut state = self.lock();
        Self::harvest(&mut state);
        ManagerStatus {
            ready: state.snapshot.is_some(),
            global: state.global.status(),
            processes: state
                .regions
                .iter()
                .map(|(key, job)| (key.clone(), job.status()))
                .collect(),
        }
    }

    fn refresh_due(&self) -> bool {
        let mut state = self.lock();
        if state.last_refresh.elapsed() < self.config.source_refresh() {
            return false;
        }
        state.last_refresh = Instant::now();
        true
    }

    async fn current_metadata_hash(&self) -> Option<String> {
        let path = self.config.metadata_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(metadata_hash(&bytes)),
            Err(e) => {
                log::warn!("Unable to read {}: {e}", path.display());
                None
            }
        }
    }

    /// One control-loop step.
    ///
    /// Harvests finished jobs. On the source refresh cadence, also syncs the
    /// data repository and relaunches the global job if the metadata hash
    /// changed, the persisted table is missing or no table is loaded.
    pub async fn tick(&self) {
        self.poll();
        if !self.refresh_due() {
            return;
        }

        let data_sync = Arc::clone(&self.collaborators.data_sync);
        match tokio::task::spawn_blocking(move || data_sync.sync()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Data repository sync failed: {e}"),
            Err(e) => log::warn!("Data repository sync did not complete: {e}"),
        }

        let hash = self.current_metadata_hash().await;
        let table_path = self.paths.regions_csv();
        let missing = !tokio::fs::try_exists(&table_path).await.unwrap_or(false);
        let mut state = self.lock();
        let changed = match (&state.snapshot, hash) {
            (None, _) => true,
            (Some(snapshot), Some(hash)) => snapshot.metadata_hash != hash,
            (Some(_), None) => false,
        };
        if changed {
            log::info!("Source metadata changed");
            self.ensure_global(&mut state);
        } else if missing {
            log::info!("{} is missing", table_path.display());
            self.ensure_global(&mut state);
        }
    }

    /// Starts the bootstrap job and the control loop.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        {
            let mut state = self.lock();
            self.ensure_global(&mut state);
        }
        self.spawn_control_loop()
    }

    /// Spawns the periodic control loop. It runs until the runtime shuts
    /// down or the handle is aborted.
    pub fn spawn_control_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                manager.tick().await;
            }
        })
    }

    /// Waits for every in-flight job, then harvests them.
    pub async fn drain(&self) {
        let pending: Vec<BoxFuture<'static, ()>> = {
            let state = self.lock();
            state
                .global
                .finished()
                .map(|finished| finished.boxed())
                .into_iter()
                .chain(
                    state
                        .regions
                        .values()
                        .filter_map(|job| job.finished().map(|finished| finished.boxed())),
                )
                .collect()
        };
        futures::future::join_all(pending).await;
        self.poll();
    }

    async fn wait_for_snapshot(&self) -> Result<Arc<Snapshot>, ManagerError> {
        if let Some(pending) = self.launch_global() {
            pending.await;
        }
        let mut state = self.lock();
        Self::harvest(&mut state);
        state.snapshot.clone().ok_or_else(|| ManagerError::NotReady {
            message: state
                .global
                .error()
                .unwrap_or("region table job did not finish")
                .to_string(),
        })
    }

    /// Computes every eligible region pair and writes them to `output`.
    ///
    /// Waits for the global table without a time bound. Chunks run on the
    /// worker pool alongside any other jobs. Returns the number of pairs
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] if the table cannot be loaded, a worker
    /// fails, or the output cannot be written.
    pub async fn compute_pairs(&self, output: &Path) -> Result<usize, ManagerError> {
        let snapshot = self.wait_for_snapshot().await?;
        log::info!("Computing pairs over {} regions", snapshot.table.len());

        let pool = self.pool.clone();
        let records = compute_all_pairs_with(
            Arc::clone(&snapshot.table),
            Arc::clone(&snapshot.timelines),
            self.config.distance_params(),
            self.pool.size(),
            move |chunk: ChunkJob| {
                let handle = pool.submit(move || Ok(chunk()));
                async move {
                    handle.finished().await;
                    handle
                        .try_take()
                        .unwrap_or(Err(JobError::Cancelled))
                        .map_err(|e| DistanceError::Worker {
                            message: e.to_string(),
                        })
                }
            },
        )
        .await?;

        let count = records.len();
        let output: PathBuf = output.to_path_buf();
        tokio::task::spawn_blocking(move || write_pairs(&output, &records))
            .await
            .map_err(|e| JobError::Panicked {
                message: e.to_string(),
            })??;
        log::info!("Wrote {count} pairs");
        Ok(count)
    }
}
