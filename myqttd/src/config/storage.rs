// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;

/// `[storage]` section: defaults inherited by every `[[domains]]` entry that
/// does not override them (spec.md §4.2, §4.7).
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Storage {
    /// Root directory new domains are created under when a domain entry
    /// does not specify its own `storage` path.
    ///
    /// Default is "/var/lib/myqttd".
    #[serde(default = "Storage::default_root_dir")]
    root_dir: PathBuf,

    /// Number of shard buckets `myqtt-storage` hashes client ids across.
    ///
    /// Default is 16.
    #[serde(default = "Storage::default_hash_buckets")]
    hash_buckets: u32,

    /// Default per-client queued-message byte quota, applied to domains
    /// that do not set `storage_quota_limit` in their `[domain_settings.*]`.
    ///
    /// Default is 16 MiB.
    #[serde(default = "Storage::default_quota_limit")]
    quota_limit: u64,
}

impl Storage {
    #[must_use]
    pub fn default_root_dir() -> PathBuf {
        PathBuf::from("/var/lib/myqttd")
    }

    #[must_use]
    pub const fn default_hash_buckets() -> u32 {
        16
    }

    #[must_use]
    pub const fn default_quota_limit() -> u64 {
        16 * 1024 * 1024
    }

    #[must_use]
    pub fn root_dir(&self) -> &PathBuf {
        &self.root_dir
    }

    #[must_use]
    pub const fn hash_buckets(&self) -> u32 {
        self.hash_buckets
    }

    #[must_use]
    pub const fn quota_limit(&self) -> u64 {
        self.quota_limit
    }

    /// Validate storage config.
    ///
    /// # Errors
    ///
    /// Never returns an error; kept for symmetry with the other sections'
    /// `validate()` so `Config::validate` can call all of them uniformly.
    pub const fn validate(&self) -> Result<(), Error> {
        Ok(())
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            root_dir: Self::default_root_dir(),
            hash_buckets: Self::default_hash_buckets(),
            quota_limit: Self::default_quota_limit(),
        }
    }
}
