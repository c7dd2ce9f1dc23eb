// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use myqtt_codec::{PacketId, QoS};
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::StorageConfig;
use crate::error::Error;
use crate::queue::{self, MessageHandle, QueuedMessage};
use crate::retained::RetainedStore;
use crate::subscriptions::{self, PersistedSubscription};
use crate::{pkgid, RetainedMessage};

/// Everything recovered from disk by [`Storage::load`]: persisted
/// subscriptions for every offline client, used to rebuild the domain's
/// subscription router tables before any connection is accepted.
#[derive(Debug, Clone, Default)]
pub struct LoadedState {
    pub subscriptions: Vec<PersistedSubscription>,
}

/// A domain's on-disk storage tree: queued/in-flight messages, persisted
/// subscriptions, retained messages and packet-id locks, rooted at
/// [`StorageConfig::root`].
pub struct Storage {
    root: std::path::PathBuf,
    hash_buckets: u32,
    quota_bytes: Option<u64>,
    message_count_limit: Option<u32>,
    retained: RetainedStore,
    quota_used: Mutex<HashMap<String, u64>>,
    message_count: Mutex<HashMap<String, u32>>,
    loaded: AtomicBool,
}

impl Storage {
    /// Create the storage root (and `retained/`) directory if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be created.
    pub fn open(config: &StorageConfig) -> Result<Self, Error> {
        fs::create_dir_all(config.root())?;
        fs::create_dir_all(config.root().join("retained"))?;
        Ok(Self {
            root: config.root().to_path_buf(),
            hash_buckets: config.hash_buckets(),
            quota_bytes: config.quota_bytes(),
            message_count_limit: config.message_count_limit(),
            retained: RetainedStore::new(config.root().to_path_buf(), config.hash_buckets()),
            quota_used: Mutex::new(HashMap::new()),
            message_count: Mutex::new(HashMap::new()),
            loaded: AtomicBool::new(false),
        })
    }

    /// Scan `root` once, rebuilding the retained-message index and
    /// returning every persisted subscription found for offline clients.
    /// A second call is a no-op returning an empty [`LoadedState`]: the
    /// contract is "called exactly once per domain".
    ///
    /// # Errors
    ///
    /// Returns an error if the storage tree cannot be read.
    pub fn load(&self) -> Result<LoadedState, Error> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return Ok(LoadedState::default());
        }
        self.retained.load()?;
        let subscriptions = subscriptions::scan_all(&self.root)?;
        log::info!(
            "storage load: root={}, subscriptions={}",
            self.root.display(),
            subscriptions.len()
        );
        Ok(LoadedState { subscriptions })
    }

    /// Persist a QoS 1/2 PUBLISH payload for later redelivery, accounting
    /// its size against `client_id`'s quota.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn store_message(
        &self,
        client_id: &str,
        packet_id: PacketId,
        qos: QoS,
        payload: &[u8],
    ) -> Result<MessageHandle, Error> {
        let handle = queue::store(&self.root, client_id, packet_id, qos, payload)?;
        log::debug!("store_message: client_id={client_id}, packet_id={packet_id}, size={}", handle.size());
        let mut used = self.quota_used.lock().unwrap_or_else(|e| e.into_inner());
        *used.entry(client_id.to_string()).or_insert(0) += handle.size() as u64;
        drop(used);
        let mut count = self.message_count.lock().unwrap_or_else(|e| e.into_inner());
        *count.entry(client_id.to_string()).or_insert(0) += 1;
        Ok(handle)
    }

    /// Unlink a stored message and release its quota contribution.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure (a missing file is not an error).
    pub fn release_message(&self, client_id: &str, handle: &MessageHandle) -> Result<(), Error> {
        queue::release(handle)?;
        let mut used = self.quota_used.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(total) = used.get_mut(client_id) {
            *total = total.saturating_sub(handle.size() as u64);
        }
        drop(used);
        let mut count = self.message_count.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(total) = count.get_mut(client_id) {
            *total = total.saturating_sub(1);
        }
        Ok(())
    }

    /// Recover every queued message for a reconnecting `clean_session=false`
    /// client, oldest first. Callers resubmit each through the delivery
    /// engine and call [`Storage::release_message`] once redelivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the client's message directory cannot be read.
    pub fn flush_queued(&self, client_id: &str) -> Result<Vec<QueuedMessage>, Error> {
        queue::flush(&self.root, client_id)
    }

    /// Current bytes of queued-message storage attributed to `client_id`.
    #[must_use]
    pub fn quota_used(&self, client_id: &str) -> u64 {
        let used = self.quota_used.lock().unwrap_or_else(|e| e.into_inner());
        used.get(client_id).copied().unwrap_or(0)
    }

    /// `true` if storing `additional_bytes` more for `client_id` would
    /// exceed the configured quota. Always `false` when no quota is
    /// configured.
    #[must_use]
    pub fn would_exceed_quota(&self, client_id: &str, additional_bytes: u64) -> bool {
        match self.quota_bytes {
            Some(limit) => self.quota_used(client_id) + additional_bytes > limit,
            None => false,
        }
    }

    /// Current count of queued/in-flight messages attributed to `client_id`.
    #[must_use]
    pub fn message_count(&self, client_id: &str) -> u32 {
        let count = self.message_count.lock().unwrap_or_else(|e| e.into_inner());
        count.get(client_id).copied().unwrap_or(0)
    }

    /// `true` if storing one more message of `additional_bytes` for
    /// `client_id` would exceed either the configured byte quota or message
    /// count limit (spec.md §4.5 "on-store hook" / §6
    /// `storage-quota-limit` / `storage-messages-limit`).
    #[must_use]
    pub fn would_reject_store(&self, client_id: &str, additional_bytes: u64) -> bool {
        if self.would_exceed_quota(client_id, additional_bytes) {
            return true;
        }
        match self.message_count_limit {
            Some(limit) => self.message_count(client_id) >= limit,
            None => false,
        }
    }

    /// Claim a packet id for a client, to deduplicate QoS 2 first-occurrence
    /// delivery. See [`pkgid::lock`].
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn lock_packet_id(&self, client_id: &str, packet_id: PacketId) -> Result<bool, Error> {
        pkgid::lock(&self.root, client_id, packet_id)
    }

    /// Release a packet id previously claimed with [`Storage::lock_packet_id`].
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure (already-released is not an error).
    pub fn unlock_packet_id(&self, client_id: &str, packet_id: PacketId) -> Result<(), Error> {
        pkgid::unlock(&self.root, client_id, packet_id)
    }

    /// Persist `(client_id, filter) -> qos`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn record_subscription(
        &self,
        client_id: &str,
        filter: &str,
        qos: QoS,
    ) -> Result<(), Error> {
        subscriptions::record(&self.root, client_id, filter, qos, self.hash_buckets)
    }

    /// Remove a persisted subscription. Missing entries are idempotent
    /// success.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn remove_subscription(&self, client_id: &str, filter: &str) -> Result<(), Error> {
        subscriptions::remove(&self.root, client_id, filter, self.hash_buckets)
    }

    /// Retained messages whose topic satisfies `matches`, typically a
    /// subscription filter's match predicate.
    #[must_use]
    pub fn retained_matching(&self, matches: impl Fn(&str) -> bool) -> Vec<RetainedMessage> {
        self.retained.matching(matches)
    }

    /// Replace (or delete, if `payload` is empty) the retained message for
    /// `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn upsert_retained(&self, topic: &str, qos: QoS, payload: &[u8]) -> Result<(), Error> {
        self.retained.upsert(topic, qos, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::Storage;
    use crate::config::StorageConfig;
    use myqtt_codec::{PacketId, QoS};

    fn config_for(dir: &tempfile::TempDir) -> StorageConfig {
        StorageConfig::new(dir.path().to_path_buf(), 16, None)
    }

    #[test]
    fn test_store_and_release_tracks_quota() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&config_for(&dir)).unwrap();
        let handle = storage
            .store_message("c1", PacketId::new(1), QoS::AtLeastOnce, b"hello")
            .unwrap();
        assert_eq!(storage.quota_used("c1"), 5);
        storage.release_message("c1", &handle).unwrap();
        assert_eq!(storage.quota_used("c1"), 0);
    }

    #[test]
    fn test_load_is_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&config_for(&dir)).unwrap();
        storage
            .record_subscription("c1", "a/b", QoS::AtMostOnce)
            .unwrap();
        let first = storage.load().unwrap();
        assert_eq!(first.subscriptions.len(), 1);
        let second = storage.load().unwrap();
        assert!(second.subscriptions.is_empty());
    }

    #[test]
    fn test_quota_limit() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(dir.path().to_path_buf(), 16, Some(10));
        let storage = Storage::open(&config).unwrap();
        storage
            .store_message("c1", PacketId::new(1), QoS::AtLeastOnce, b"12345")
            .unwrap();
        assert!(!storage.would_exceed_quota("c1", 4));
        assert!(storage.would_exceed_quota("c1", 6));
    }

    #[test]
    fn test_message_count_limit_rejects_store_and_release_frees_it() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(dir.path().to_path_buf(), 16, None).with_message_count_limit(Some(1));
        let storage = Storage::open(&config).unwrap();
        let handle = storage
            .store_message("c1", PacketId::new(1), QoS::AtLeastOnce, b"x")
            .unwrap();
        assert_eq!(storage.message_count("c1"), 1);
        assert!(storage.would_reject_store("c1", 1));

        storage.release_message("c1", &handle).unwrap();
        assert_eq!(storage.message_count("c1"), 0);
        assert!(!storage.would_reject_store("c1", 1));
    }
}
