// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use myqtt_codec::QoS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[general]` section: broker-wide tunables that are not specific to any
/// one listener or domain. Privilege dropping, pid files and signal
/// handling are out of scope (spec.md §1) and are not modeled here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct General {
    /// Time interval to send `$SYS` messages, in seconds. 0 disables them.
    ///
    /// Default is 3.
    #[serde(default = "General::default_sys_interval")]
    sys_interval: u32,

    /// Initial worker thread count for the tokio runtime, overridable by
    /// the `MYQTT_THREADS` environment variable (spec.md §6).
    ///
    /// Default is 5.
    #[serde(default = "General::default_worker_threads")]
    worker_threads: usize,

    /// Maximum accepted PUBLISH application-payload size in bytes. 0 means
    /// unlimited. Enforced by the codec's size-limit predicate (spec.md
    /// §4.1) before a PUBLISH body is fully read.
    ///
    /// Default is 64 KiB.
    #[serde(default = "General::default_message_size_limit")]
    message_size_limit: u32,

    /// Clients may request any keep-alive up to this many seconds.
    ///
    /// Default is 65535.
    #[serde(default = "General::default_maximum_keep_alive")]
    maximum_keep_alive: u32,

    /// Highest QoS a PUBLISH from a client is accepted at; higher values
    /// are rejected with a protocol error and the connection is closed.
    ///
    /// Stored as a raw `u8` since `myqtt_codec::QoS` does not implement
    /// `serde::{Serialize, Deserialize}`. Default is `QoS::ExactOnce` (2).
    #[serde(default = "General::default_maximum_qos_raw")]
    maximum_qos: u8,
}

impl General {
    #[must_use]
    pub const fn default_sys_interval() -> u32 {
        3
    }

    #[must_use]
    pub const fn default_worker_threads() -> usize {
        5
    }

    #[must_use]
    pub const fn default_message_size_limit() -> u32 {
        64 * 1024
    }

    #[must_use]
    pub const fn default_maximum_keep_alive() -> u32 {
        65535
    }

    #[must_use]
    pub const fn default_maximum_qos_raw() -> u8 {
        QoS::ExactOnce as u8
    }

    #[must_use]
    pub const fn sys_interval(&self) -> Duration {
        Duration::from_secs(self.sys_interval as u64)
    }

    #[must_use]
    pub const fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    #[must_use]
    pub const fn message_size_limit(&self) -> u32 {
        self.message_size_limit
    }

    #[must_use]
    pub const fn maximum_keep_alive(&self) -> u32 {
        self.maximum_keep_alive
    }

    #[must_use]
    pub fn maximum_qos(&self) -> QoS {
        QoS::try_from(self.maximum_qos).unwrap_or(QoS::ExactOnce)
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            sys_interval: Self::default_sys_interval(),
            worker_threads: Self::default_worker_threads(),
            message_size_limit: Self::default_message_size_limit(),
            maximum_qos: Self::default_maximum_qos_raw(),
            maximum_keep_alive: Self::default_maximum_keep_alive(),
        }
    }
}
