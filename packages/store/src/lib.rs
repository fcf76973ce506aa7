#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! On-disk state of the similarity service.
//!
//! Everything the service computes is persisted as delimited text tables in
//! the output directory, which doubles as a git working copy that can be
//! published. This crate owns:
//!
//! * canonical artifact paths ([`paths`])
//! * reading and atomically writing the tables ([`tables`])
//! * the metadata content hash used to detect upstream changes ([`hash`])
//! * freshness oracles ([`freshness`])
//! * publishing results and syncing the upstream data repository
//!   ([`repository`])

pub mod freshness;
pub mod hash;
pub mod paths;
pub mod repository;
pub mod tables;

use similarity_region_models::TableError;

pub use freshness::{FileMtime, GitCommitTime, LastModified, is_fresh};
pub use hash::{metadata_hash, read_stored_hash, write_stored_hash};
pub use paths::ArtifactPaths;
pub use repository::{CommandPublisher, DataSync, GitSync, NoopPublisher, NoopSync, Publisher};
pub use tables::{
    NeighborRow, PairRow, read_neighbors, read_regions, write_atomic, write_neighbors,
    write_pairs, write_regions,
};

/// Errors that can occur while reading or writing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A persisted global table is inconsistent.
    #[error("Invalid region table: {0}")]
    Table(#[from] TableError),

    /// An external command failed to run or exited unsuccessfully.
    #[error("Command '{command}' failed: {message}")]
    Command {
        /// The command line.
        command: String,
        /// What went wrong.
        message: String,
    },
}
