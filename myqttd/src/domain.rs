// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! A domain is one tenant of the broker: its own storage tree, subscription
//! router and connection limits, resolved independently for every accepted
//! connection (spec.md §4.7). The teacher broker has no equivalent of this
//! module, being single-tenant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use myqtt_codec::SubTopic;
use myqtt_storage::{Storage, StorageConfig};
use tokio::sync::mpsc;

use crate::auth::FileAuth;
use crate::config::{DomainDecl, DomainSettings};
use crate::error::Error;
use crate::router::Router;
use crate::session::ToSession;

/// One tenant: a storage tree, subscription router, and the settings/users
/// database governing who may connect and what they may do.
pub struct Domain {
    name: String,
    storage: Storage,
    router: Mutex<Router>,
    settings: DomainSettings,
    users: Option<FileAuth>,
    clients: Mutex<HashMap<String, mpsc::Sender<ToSession>>>,
    connections: AtomicI64,
}

impl Domain {
    /// Open (creating if necessary) the storage tree for `decl` and load its
    /// persisted subscriptions into a fresh [`Router`].
    ///
    /// # Errors
    ///
    /// Returns an error if the storage tree cannot be opened, or the users
    /// database (if configured) cannot be read.
    pub fn open(
        decl: &DomainDecl,
        settings: DomainSettings,
        hash_buckets: u32,
        quota_bytes: Option<u64>,
    ) -> Result<Self, Error> {
        let storage_quota = if settings.storage_quota_limit() > 0 {
            Some(settings.storage_quota_limit() as u64)
        } else {
            quota_bytes
        };
        let message_count_limit = if settings.storage_messages_limit() > 0 {
            u32::try_from(settings.storage_messages_limit()).ok()
        } else {
            None
        };
        let config = StorageConfig::new(decl.storage().clone(), hash_buckets, storage_quota)
            .with_message_count_limit(message_count_limit);
        let storage = Storage::open(&config)?;
        let loaded = storage.load()?;

        let mut router = Router::new();
        for sub in loaded.subscriptions {
            // Offline subscribers register with no live sender; delivery
            // falls back to queuing through storage until they reconnect.
            if let Ok(filter) = SubTopic::new(&sub.filter) {
                router.subscribe_offline(&sub.client_id, filter, sub.qos);
            }
        }

        let users = match decl.users_db() {
            Some(path) => Some(FileAuth::load(path)?),
            None => None,
        };

        Ok(Self {
            name: decl.name().to_string(),
            storage,
            router: Mutex::new(router),
            settings,
            users,
            clients: Mutex::new(HashMap::new()),
            connections: AtomicI64::new(0),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub const fn settings(&self) -> &DomainSettings {
        &self.settings
    }

    pub fn router(&self) -> std::sync::MutexGuard<'_, Router> {
        self.router.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Authenticate `username`/`password` (anonymous if `username` is
    /// `None`) against this domain's policy and users database.
    #[must_use]
    pub fn authenticate(&self, username: Option<&str>, password: &[u8]) -> bool {
        match username {
            None => !self.settings.require_auth(),
            Some(username) => match &self.users {
                Some(users) => users.check(username, password),
                None => !self.settings.require_auth(),
            },
        }
    }

    /// `true` if this domain has a users database that recognizes
    /// `username` with a matching `password` — used by domain dispatch
    /// (spec.md §4.7 step 2) to pick a domain by credentials before any
    /// per-domain policy (`require_auth`, anonymous fallback) is applied.
    #[must_use]
    pub fn recognizes_credentials(&self, username: &str, password: &[u8]) -> bool {
        self.users.as_ref().is_some_and(|users| users.check(username, password))
    }

    /// `true` if `client_id` is acceptable given `restrict_ids`.
    #[must_use]
    pub fn accepts_client_id(&self, username: Option<&str>, client_id: &str) -> bool {
        if !self.settings.restrict_ids() {
            return true;
        }
        match &self.users {
            Some(users) => username.is_some_and(|u| users.contains(u)) || users.contains(client_id),
            None => true,
        }
    }

    /// Register `client_id`'s live delivery channel, evicting and returning
    /// any previous connection under the same id (MQTT-3.1.4-2).
    pub fn register_client(
        &self,
        client_id: &str,
        sender: mpsc::Sender<ToSession>,
    ) -> Option<mpsc::Sender<ToSession>> {
        let mut clients = self.clients.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = clients.insert(client_id.to_string(), sender);
        if previous.is_none() {
            self.connections.fetch_add(1, Ordering::Relaxed);
        }
        previous
    }

    pub fn unregister_client(&self, client_id: &str) {
        let mut clients = self.clients.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if clients.remove(client_id).is_some() {
            self.connections.fetch_sub(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn client_sender(&self, client_id: &str) -> Option<mpsc::Sender<ToSession>> {
        let clients = self.clients.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clients.get(client_id).cloned()
    }

    /// `true` if admitting one more connection would exceed `conn_limit`.
    #[must_use]
    pub fn at_connection_limit(&self) -> bool {
        let limit = self.settings.conn_limit();
        limit > 0 && self.connections.load(Ordering::Relaxed) >= limit
    }

    /// Currently live (registered, not merely configured) connection count,
    /// reported on the `$SYS/broker/<domain>/clients/connected` topic by
    /// [`crate::sys`].
    #[must_use]
    pub fn connection_count(&self) -> i64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Resolve the PUBLISH application-payload size ceiling this domain
    /// enforces: its own `[domain_settings].message_size_limit` if set,
    /// else `general_default` (spec.md §4.1, §6). `0` means unlimited.
    #[must_use]
    pub fn message_size_limit(&self, general_default: u32) -> u32 {
        let configured = self.settings.message_size_limit();
        if configured > 0 {
            u32::try_from(configured).unwrap_or(u32::MAX)
        } else {
            general_default
        }
    }
}
