// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory a domain's storage tree is rooted at.
    ///
    /// Default is "/var/lib/myqtt/storage".
    #[serde(default = "StorageConfig::default_root")]
    root: PathBuf,

    /// Number of hash buckets `retained/` and `<client_id>/subs/` are split
    /// into, to avoid unbounded directory fan-out.
    ///
    /// Default is 4096.
    #[serde(default = "StorageConfig::default_hash_buckets")]
    hash_buckets: u32,

    /// Soft cap, in bytes, on the total size of a single client's queued
    /// message files. `None` disables quota accounting.
    ///
    /// Default is None.
    #[serde(default = "StorageConfig::default_quota_bytes")]
    quota_bytes: Option<u64>,

    /// Soft cap on the number of queued/in-flight messages a single client
    /// may have stored at once. `None` disables the check.
    ///
    /// Default is None.
    #[serde(default = "StorageConfig::default_message_count_limit")]
    message_count_limit: Option<u32>,
}

impl StorageConfig {
    #[must_use]
    pub fn new(root: PathBuf, hash_buckets: u32, quota_bytes: Option<u64>) -> Self {
        Self {
            root,
            hash_buckets,
            quota_bytes,
            message_count_limit: Self::default_message_count_limit(),
        }
    }

    /// Same as [`StorageConfig::new`] but also sets the per-client message
    /// count cap (spec.md §6 `storage-messages-limit`).
    #[must_use]
    pub fn with_message_count_limit(mut self, limit: Option<u32>) -> Self {
        self.message_count_limit = limit;
        self
    }

    #[must_use]
    pub fn default_root() -> PathBuf {
        PathBuf::from("/var/lib/myqtt/storage")
    }

    #[must_use]
    pub const fn default_hash_buckets() -> u32 {
        4096
    }

    #[must_use]
    pub const fn default_quota_bytes() -> Option<u64> {
        None
    }

    #[must_use]
    pub const fn default_message_count_limit() -> Option<u32> {
        None
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    #[must_use]
    pub const fn hash_buckets(&self) -> u32 {
        self.hash_buckets
    }

    #[must_use]
    pub const fn quota_bytes(&self) -> Option<u64> {
        self.quota_bytes
    }

    #[must_use]
    pub const fn message_count_limit(&self) -> Option<u32> {
        self.message_count_limit
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            hash_buckets: Self::default_hash_buckets(),
            quota_bytes: Self::default_quota_bytes(),
            message_count_limit: Self::default_message_count_limit(),
        }
    }
}
