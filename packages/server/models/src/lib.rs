#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API response types for the region similarity server.
//!
//! Tables are served as CSV straight from the output directory; only the
//! health document is JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// State of one background job as reported by the API.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApiProcessState {
    /// Still running.
    InProgress,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

/// `GET /api/v1` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the region table is loaded.
    pub health: bool,
    /// State of the region table job, if it was ever launched.
    pub regions: Option<ApiProcessState>,
    /// Per-region job states, keyed by region key.
    pub processes: BTreeMap<String, ApiProcessState>,
}
